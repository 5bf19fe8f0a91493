// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt;
use std::time::{Duration, Instant};

use crate::core::{PriorityLevel, RegionEpoch, RegionInfo};
use crate::error::Error;
use crate::operator::{OpInfluence, OpKind, OpStep};

/// Wait budget for operators that only move leadership.
const FAST_OPERATOR_WAIT: Duration = Duration::from_secs(10);
/// Wait budget for operators that move data.
const SLOW_OPERATOR_WAIT: Duration = Duration::from_secs(10 * 60);
/// Floor on assumed data move speed, in size units per second.
const MIN_MOVE_SPEED: u64 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpStatus {
    Created,
    Started,
    Success,
    Cancelled,
    Timeout,
    Replaced,
    Expired,
}

impl OpStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OpStatus::Created | OpStatus::Started)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OpStatus::Created => "created",
            OpStatus::Started => "started",
            OpStatus::Success => "success",
            OpStatus::Cancelled => "cancelled",
            OpStatus::Timeout => "timeout",
            OpStatus::Replaced => "replaced",
            OpStatus::Expired => "expired",
        }
    }
}

/// Result of polling an operator against a region snapshot.
#[derive(Debug)]
pub enum OperatorPoll {
    /// All steps finished.
    Finished,
    /// The current step is no longer safe; the operator must be
    /// cancelled.
    Unsafe(Error),
    /// The step at this index is still in flight.
    Pending(usize),
}

/// An ordered plan of steps for one region. Owned by the operator
/// controller from admission until a terminal state.
#[derive(Clone, Debug)]
pub struct Operator {
    desc: String,
    region_id: u64,
    region_epoch: RegionEpoch,
    kind: OpKind,
    steps: Vec<OpStep>,
    current_step: usize,
    priority: PriorityLevel,
    approximate_size: u64,
    create_time: Instant,
    start_time: Option<Instant>,
    finish_time: Option<Instant>,
    status: OpStatus,
}

impl Operator {
    pub fn new(
        desc: &str,
        region_id: u64,
        region_epoch: RegionEpoch,
        kind: OpKind,
        approximate_size: u64,
        steps: Vec<OpStep>,
    ) -> Operator {
        Operator {
            desc: desc.to_owned(),
            region_id,
            region_epoch,
            kind,
            steps,
            current_step: 0,
            priority: PriorityLevel::Normal,
            approximate_size,
            create_time: Instant::now(),
            start_time: None,
            finish_time: None,
            status: OpStatus::Created,
        }
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn region_id(&self) -> u64 {
        self.region_id
    }

    pub fn region_epoch(&self) -> &RegionEpoch {
        &self.region_epoch
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn steps(&self) -> &[OpStep] {
        &self.steps
    }

    pub fn status(&self) -> OpStatus {
        self.status
    }

    pub fn priority(&self) -> PriorityLevel {
        self.priority
    }

    pub fn set_priority(&mut self, priority: PriorityLevel) {
        self.priority = priority;
    }

    pub fn elapsed(&self) -> Duration {
        match self.start_time {
            Some(t) => t.elapsed(),
            None => self.create_time.elapsed(),
        }
    }

    pub fn running_duration(&self) -> Duration {
        match (self.start_time, self.finish_time) {
            (Some(s), Some(f)) => f.duration_since(s),
            (Some(s), None) => s.elapsed(),
            _ => Duration::from_secs(0),
        }
    }

    pub fn current_step(&self) -> Option<&OpStep> {
        self.steps.get(self.current_step)
    }

    pub fn start(&mut self) -> bool {
        if self.status != OpStatus::Created {
            return false;
        }
        self.status = OpStatus::Started;
        self.start_time = Some(Instant::now());
        true
    }

    /// Drives the plan against a fresh region snapshot: the current step
    /// is safety-checked, then advanced past every step the snapshot
    /// already shows finished.
    pub fn poll(&mut self, region: &RegionInfo) -> OperatorPoll {
        while self.current_step < self.steps.len() {
            let step = &self.steps[self.current_step];
            if let Err(e) = step.check_safety(region) {
                return OperatorPoll::Unsafe(e);
            }
            if step.is_finish(region) {
                self.current_step += 1;
            } else {
                return OperatorPoll::Pending(self.current_step);
            }
        }
        OperatorPoll::Finished
    }

    pub fn mark(&mut self, status: OpStatus) {
        debug_assert!(status.is_terminal());
        if !self.status.is_terminal() {
            self.status = status;
            self.finish_time = Some(Instant::now());
        }
    }

    /// The run-time budget: a base by operator weight, stretched for
    /// regions too large to move within it.
    pub fn max_run_time(&self) -> Duration {
        let base = if self
            .steps
            .iter()
            .all(|s| matches!(s, OpStep::TransferLeader(_)))
        {
            FAST_OPERATOR_WAIT
        } else {
            SLOW_OPERATOR_WAIT
        };
        let move_time = Duration::from_secs(self.approximate_size / MIN_MOVE_SPEED.max(1));
        base.max(move_time)
    }

    pub fn is_timeout(&self) -> bool {
        match self.start_time {
            Some(t) if !self.status.is_terminal() => t.elapsed() > self.max_run_time(),
            _ => false,
        }
    }

    /// Applies the influence of every not-yet-finished step.
    pub fn unfinished_influence(&self, infl: &mut OpInfluence, region: &RegionInfo) {
        for step in &self.steps[self.current_step.min(self.steps.len())..] {
            step.influence(infl, region);
        }
    }

    /// Applies the influence of the whole plan, as used at admission.
    pub fn total_influence(&self, infl: &mut OpInfluence, region: &RegionInfo) {
        for step in &self.steps {
            step.influence(infl, region);
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (kind:{}, region:{}(conf_ver:{} version:{}), steps:[",
            self.desc,
            self.kind,
            self.region_id,
            self.region_epoch.conf_ver,
            self.region_epoch.version
        )?;
        for (i, step) in self.steps.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", step)?;
        }
        write!(f, "])")
    }
}
