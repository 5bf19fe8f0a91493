// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

//! The checker pipeline: placement and repair checkers that inspect one
//! region at a time and emit at most one operator (a pair for merges).

mod joint_state;
mod learner;
mod merge;
mod priority;
mod replica;
mod replica_strategy;
mod rule;
mod split;

pub use self::joint_state::JointStateChecker;
pub use self::learner::LearnerChecker;
pub use self::merge::MergeChecker;
pub use self::priority::{PriorityInspector, DEFAULT_PRIORITY_QUEUE_INTERVAL};
pub use self::replica::ReplicaChecker;
pub use self::replica_strategy::ReplicaStrategy;
pub use self::rule::RuleChecker;
pub use self::split::SplitChecker;

use std::sync::{Arc, Mutex};

use crate::cluster::Cluster;
use crate::core::RegionInfo;
use crate::metrics::OPERATOR_LIMIT_COUNTER_VEC;
use crate::operator::{OpKind, Operator, OperatorController};
use crate::util::cache::FifoCache;

/// Capacity of the list of regions parked for a re-check.
pub const DEFAULT_WAITING_LIST_SIZE: usize = 1000;

/// Runs the checker pipeline in its fixed order. First match wins; the
/// priority inspector only annotates.
pub struct CheckerController {
    cluster: Arc<dyn Cluster>,
    op_controller: Arc<OperatorController>,
    learner_checker: LearnerChecker,
    replica_checker: ReplicaChecker,
    rule_checker: RuleChecker,
    split_checker: SplitChecker,
    merge_checker: MergeChecker,
    joint_state_checker: JointStateChecker,
    priority_inspector: PriorityInspector,
    region_waiting_list: Arc<Mutex<FifoCache>>,
}

impl CheckerController {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        op_controller: Arc<OperatorController>,
    ) -> CheckerController {
        let region_waiting_list =
            Arc::new(Mutex::new(FifoCache::new(DEFAULT_WAITING_LIST_SIZE)));
        CheckerController {
            learner_checker: LearnerChecker::new(),
            replica_checker: ReplicaChecker::new(
                Arc::clone(&cluster),
                Arc::clone(&region_waiting_list),
            ),
            rule_checker: RuleChecker::new(
                Arc::clone(&cluster),
                Arc::clone(&region_waiting_list),
            ),
            split_checker: SplitChecker::new(Arc::clone(&cluster)),
            merge_checker: MergeChecker::new(Arc::clone(&cluster)),
            joint_state_checker: JointStateChecker::new(),
            priority_inspector: PriorityInspector::new(Arc::clone(&cluster)),
            region_waiting_list,
            cluster,
            op_controller,
        }
    }

    /// Checks one region and returns the operators to admit, if any.
    pub fn check_region(&self, region: &RegionInfo) -> Vec<Operator> {
        let cfg = self.cluster.get_opts();

        if let Some(op) = self.joint_state_checker.check(region) {
            return vec![op];
        }

        if let Some(op) = self.split_checker.check(region) {
            return vec![op];
        }

        if cfg.enable_placement_rules {
            let fit = self.priority_inspector.inspect(region);
            if let Some(op) = self.rule_checker.check_with_fit(region, &fit) {
                if self.op_controller.operator_count(OpKind::REPLICA)
                    < cfg.replica_schedule_limit
                {
                    return vec![op];
                }
                OPERATOR_LIMIT_COUNTER_VEC
                    .with_label_values(&[
                        self.rule_checker.get_type(),
                        OpKind::flag_name(OpKind::REPLICA),
                    ])
                    .inc();
                self.region_waiting_list.lock().unwrap().put(region.get_id());
            }
        } else {
            if let Some(op) = self.learner_checker.check(region) {
                return vec![op];
            }
            if let Some(op) = self.replica_checker.check(region) {
                if self.op_controller.operator_count(OpKind::REPLICA)
                    < cfg.replica_schedule_limit
                {
                    return vec![op];
                }
                OPERATOR_LIMIT_COUNTER_VEC
                    .with_label_values(&[
                        self.replica_checker.get_type(),
                        OpKind::flag_name(OpKind::REPLICA),
                    ])
                    .inc();
                self.region_waiting_list.lock().unwrap().put(region.get_id());
            }
        }

        if self.op_controller.operator_count(OpKind::MERGE) < cfg.merge_schedule_limit {
            if let Some(ops) = self.merge_checker.check(region) {
                // The pair must be admitted together.
                return ops;
            }
        } else {
            OPERATOR_LIMIT_COUNTER_VEC
                .with_label_values(&[
                    self.merge_checker.get_type(),
                    OpKind::flag_name(OpKind::MERGE),
                ])
                .inc();
        }
        Vec::new()
    }

    pub fn get_waiting_regions(&self) -> Vec<u64> {
        self.region_waiting_list.lock().unwrap().elems()
    }

    pub fn add_waiting_region(&self, region_id: u64) {
        self.region_waiting_list.lock().unwrap().put(region_id);
    }

    pub fn remove_waiting_region(&self, region_id: u64) {
        self.region_waiting_list.lock().unwrap().remove(region_id);
    }

    pub fn get_priority_regions(&self) -> Vec<u64> {
        self.priority_inspector.get_priority_regions()
    }

    pub fn remove_priority_region(&self, region_id: u64) {
        self.priority_inspector.remove_priority_region(region_id);
    }
}
