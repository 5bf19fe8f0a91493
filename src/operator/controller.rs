// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::cluster::Cluster;
use crate::core::{PriorityLevel, RegionInfo};
use crate::metrics::{
    OPERATOR_COUNTER_VEC, OPERATOR_DURATION_HISTOGRAM_VEC, OPERATOR_LIMIT_COUNTER_VEC,
    STORE_LIMIT_COUNTER_VEC,
};
use crate::operator::{
    OpInfluence, OpKind, OpStatus, Operator, OperatorPoll, RegionHeartbeatResponse, StoreLimit,
    StoreLimitType,
};

const WAITING_QUEUE_CAPACITY: usize = 512;

/// The transport half that delivers the current step of an operator to
/// the region leader.
pub trait HeartbeatStream: Send + Sync {
    fn send(&self, resp: RegionHeartbeatResponse);
}

/// Discards every response; used by tests and dry runs.
pub struct NullHeartbeatStream;

impl HeartbeatStream for NullHeartbeatStream {
    fn send(&self, _resp: RegionHeartbeatResponse) {}
}

struct Inner {
    /// At most one running operator per region.
    operators: HashMap<u64, Operator>,
    /// Admission-pending batches; merge pairs stay together.
    waiting: VecDeque<Vec<Operator>>,
    store_limits: HashMap<(u64, StoreLimitType), StoreLimit>,
}

/// Owns every operator from admission to a terminal state: budget
/// checks, deduplication, step dispatch on heartbeats and the periodic
/// push loop.
pub struct OperatorController {
    cluster: Arc<dyn Cluster>,
    hb_stream: Box<dyn HeartbeatStream>,
    inner: Mutex<Inner>,
}

impl OperatorController {
    pub fn new(cluster: Arc<dyn Cluster>, hb_stream: Box<dyn HeartbeatStream>) -> OperatorController {
        OperatorController {
            cluster,
            hb_stream,
            inner: Mutex::new(Inner {
                operators: HashMap::new(),
                waiting: VecDeque::new(),
                store_limits: HashMap::new(),
            }),
        }
    }

    /// Enqueues operators for admission and promotes as many waiting
    /// batches as budgets allow. Operators produced together (merge
    /// pairs) are handed in together and admitted atomically. Returns
    /// the number of operators accepted into the queue.
    pub fn add_waiting_operator(&self, ops: Vec<Operator>) -> usize {
        if ops.is_empty() {
            return 0;
        }
        let mut inner = self.inner.lock().unwrap();

        let mut batch = Vec::with_capacity(ops.len());
        for op in ops {
            if !self.check_operator_valid(&inner, &op) {
                OPERATOR_COUNTER_VEC
                    .with_label_values(&[&op.kind().to_string(), "reject"])
                    .inc();
                // A merge pair with an invalid half is dropped whole.
                if op.kind().contains(OpKind::MERGE) {
                    return 0;
                }
                continue;
            }
            batch.push(op);
        }
        if batch.is_empty() {
            return 0;
        }
        let added = batch.len();
        if inner.waiting.len() >= WAITING_QUEUE_CAPACITY {
            for op in &batch {
                OPERATOR_COUNTER_VEC
                    .with_label_values(&[&op.kind().to_string(), "exceed-wait"])
                    .inc();
            }
            return 0;
        }
        if batch[0].priority() == PriorityLevel::High {
            inner.waiting.push_front(batch);
        } else {
            inner.waiting.push_back(batch);
        }
        self.promote_waiting(&mut inner);
        added
    }

    /// Validity checks that do not depend on budgets: the region must
    /// exist, the epoch must match, and a running operator may only be
    /// displaced by a strictly higher priority.
    fn check_operator_valid(&self, inner: &Inner, op: &Operator) -> bool {
        if op.status() != OpStatus::Created {
            return false;
        }
        let region = match self.cluster.get_region(op.region_id()) {
            Some(r) => r,
            None => {
                debug!("add operator failed, region not found"; "region-id" => op.region_id());
                return false;
            }
        };
        if region.get_epoch() != op.region_epoch() {
            debug!("add operator failed, epoch changed"; "region-id" => op.region_id());
            return false;
        }
        if let Some(existing) = inner.operators.get(&op.region_id()) {
            if !existing.status().is_terminal() && existing.priority() >= op.priority() {
                debug!("add operator failed, already has one";
                    "region-id" => op.region_id(), "running" => existing.desc());
                return false;
            }
        }
        true
    }

    /// Promotes waiting batches in order until one is blocked by a kind
    /// cap or a store budget.
    fn promote_waiting(&self, inner: &mut Inner) {
        loop {
            let batch = match inner.waiting.pop_front() {
                Some(b) => b,
                None => break,
            };
            if self.batch_admittable(inner, &batch) {
                for op in batch {
                    self.run_operator(inner, op);
                }
            } else {
                inner.waiting.push_front(batch);
                break;
            }
        }
    }

    fn batch_admittable(&self, inner: &mut Inner, batch: &[Operator]) -> bool {
        let cfg = self.cluster.get_opts();
        let caps = [
            (OpKind::LEADER, cfg.leader_schedule_limit),
            (OpKind::REGION, cfg.region_schedule_limit),
            (OpKind::REPLICA, cfg.replica_schedule_limit),
            (OpKind::MERGE, cfg.merge_schedule_limit),
            (OpKind::HOT_REGION, cfg.hot_region_schedule_limit),
        ];
        for (flag, cap) in caps {
            let incoming = batch.iter().filter(|op| op.kind().contains(flag)).count() as u64;
            if incoming == 0 {
                continue;
            }
            let current = inner
                .operators
                .values()
                .filter(|op| !op.status().is_terminal() && op.kind().contains(flag))
                .count() as u64;
            if current + incoming > cap {
                for op in batch {
                    OPERATOR_LIMIT_COUNTER_VEC
                        .with_label_values(&[&op.desc().to_string(), OpKind::flag_name(flag)])
                        .inc();
                }
                return false;
            }
        }

        for op in batch {
            // A batch member may target a region that acquired an
            // operator since it was queued.
            if let Some(existing) = inner.operators.get(&op.region_id()) {
                if !existing.status().is_terminal() && existing.priority() >= op.priority() {
                    return false;
                }
            }
        }

        !self.exceed_store_limit(inner, batch)
    }

    /// Whether any store budget cannot absorb the aggregate step cost of
    /// the batch.
    fn exceed_store_limit(&self, inner: &mut Inner, batch: &[Operator]) -> bool {
        let mut infl = OpInfluence::new();
        for op in batch {
            if op.kind().contains(OpKind::ADMIN) {
                continue;
            }
            if let Some(region) = self.cluster.get_region(op.region_id()) {
                op.total_influence(&mut infl, &region);
            }
        }
        let cfg = self.cluster.get_opts();
        for (&store_id, store_infl) in infl.stores() {
            for limit_type in [StoreLimitType::AddPeer, StoreLimitType::RemovePeer] {
                let cost = store_infl.get_step_cost(limit_type);
                if cost <= 0 {
                    continue;
                }
                let rate = match limit_type {
                    StoreLimitType::AddPeer => cfg.store_limit_rate(store_id).add_peer,
                    StoreLimitType::RemovePeer => cfg.store_limit_rate(store_id).remove_peer,
                };
                let limit = inner
                    .store_limits
                    .entry((store_id, limit_type))
                    .or_insert_with(|| StoreLimit::new(rate));
                if !limit.available() {
                    STORE_LIMIT_COUNTER_VEC
                        .with_label_values(&[&store_id.to_string(), limit_type.as_str()])
                        .inc();
                    return true;
                }
            }
        }
        false
    }

    fn run_operator(&self, inner: &mut Inner, mut op: Operator) {
        let region = match self.cluster.get_region(op.region_id()) {
            Some(r) => r,
            None => return,
        };

        // Displace a lower-priority operator if one is still running.
        if let Some(existing) = inner.operators.get_mut(&op.region_id()) {
            if !existing.status().is_terminal() {
                existing.mark(OpStatus::Replaced);
                Self::observe_terminal(existing);
            }
        }

        op.start();
        let mut infl = OpInfluence::new();
        op.total_influence(&mut infl, &region);
        let cfg = self.cluster.get_opts();
        for (&store_id, store_infl) in infl.stores() {
            for limit_type in [StoreLimitType::AddPeer, StoreLimitType::RemovePeer] {
                let cost = store_infl.get_step_cost(limit_type);
                if cost <= 0 {
                    continue;
                }
                let rate = match limit_type {
                    StoreLimitType::AddPeer => cfg.store_limit_rate(store_id).add_peer,
                    StoreLimitType::RemovePeer => cfg.store_limit_rate(store_id).remove_peer,
                };
                inner
                    .store_limits
                    .entry((store_id, limit_type))
                    .or_insert_with(|| StoreLimit::new(rate))
                    .take(cost);
            }
        }

        OPERATOR_COUNTER_VEC
            .with_label_values(&[&op.kind().to_string(), "start"])
            .inc();
        info!("operator started";
            "region-id" => op.region_id(),
            "operator" => %op,
        );
        self.send_current_step(&op, &region);
        inner.operators.insert(op.region_id(), op);
    }

    /// Drives the operator of `region` one poll forward. Called for
    /// every region heartbeat.
    pub fn dispatch(&self, region: &RegionInfo) {
        let mut inner = self.inner.lock().unwrap();
        let finished = {
            let op = match inner.operators.get_mut(&region.get_id()) {
                Some(op) => op,
                None => return,
            };
            match op.poll(region) {
                OperatorPoll::Finished => {
                    op.mark(OpStatus::Success);
                    info!("operator finished";
                        "region-id" => op.region_id(), "operator" => %op);
                    Self::observe_terminal(op);
                    true
                }
                OperatorPoll::Unsafe(e) => {
                    op.mark(OpStatus::Cancelled);
                    info!("operator cancelled, step no longer safe";
                        "region-id" => op.region_id(), "err" => %e);
                    Self::observe_terminal(op);
                    true
                }
                OperatorPoll::Pending(_) => {
                    self.send_current_step(op, region);
                    false
                }
            }
        };
        if finished {
            inner.operators.remove(&region.get_id());
            self.promote_waiting(&mut inner);
        }
    }

    /// Re-pushes pending steps and reaps timed out operators. Driven by
    /// the coordinator's push worker.
    pub fn push_operators(&self) {
        let mut inner = self.inner.lock().unwrap();
        let mut finished = Vec::new();
        for (&region_id, op) in inner.operators.iter_mut() {
            if op.is_timeout() {
                op.mark(OpStatus::Timeout);
                info!("operator timeout"; "region-id" => region_id, "operator" => %op);
                Self::observe_terminal(op);
                finished.push(region_id);
                continue;
            }
            if let Some(region) = self.cluster.get_region(region_id) {
                self.send_current_step(op, &region);
            }
        }
        for region_id in finished {
            inner.operators.remove(&region_id);
        }
        self.promote_waiting(&mut inner);
    }

    /// Removes the operator of a region, marking it with `status`.
    /// Idempotent.
    pub fn remove_operator(&self, region_id: u64, status: OpStatus) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.operators.remove(&region_id) {
            Some(mut op) => {
                op.mark(status);
                Self::observe_terminal(&op);
                self.promote_waiting(&mut inner);
                true
            }
            None => false,
        }
    }

    pub fn get_operator(&self, region_id: u64) -> Option<Operator> {
        let inner = self.inner.lock().unwrap();
        inner.operators.get(&region_id).cloned()
    }

    pub fn has_operator(&self, region_id: u64) -> bool {
        self.inner.lock().unwrap().operators.contains_key(&region_id)
    }

    /// Running plus waiting operators matching the kind flag.
    pub fn operator_count(&self, flag: OpKind) -> u64 {
        let inner = self.inner.lock().unwrap();
        let running = inner
            .operators
            .values()
            .filter(|op| !op.status().is_terminal() && op.kind().contains(flag))
            .count();
        let waiting = inner
            .waiting
            .iter()
            .flatten()
            .filter(|op| op.kind().contains(flag))
            .count();
        (running + waiting) as u64
    }

    /// The influence of every unfinished step of every running operator.
    pub fn get_op_influence(&self) -> OpInfluence {
        let inner = self.inner.lock().unwrap();
        let mut infl = OpInfluence::new();
        for op in inner.operators.values() {
            if op.status().is_terminal() {
                continue;
            }
            if let Some(region) = self.cluster.get_region(op.region_id()) {
                op.unfinished_influence(&mut infl, &region);
            }
        }
        infl
    }

    /// Whether the bucket of (store, action) can absorb more work.
    pub fn store_limit_available(&self, store_id: u64, limit_type: StoreLimitType) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let rate = {
            let cfg = self.cluster.get_opts();
            match limit_type {
                StoreLimitType::AddPeer => cfg.store_limit_rate(store_id).add_peer,
                StoreLimitType::RemovePeer => cfg.store_limit_rate(store_id).remove_peer,
            }
        };
        let available = inner
            .store_limits
            .entry((store_id, limit_type))
            .or_insert_with(|| StoreLimit::new(rate))
            .available();
        if !available {
            STORE_LIMIT_COUNTER_VEC
                .with_label_values(&[&store_id.to_string(), limit_type.as_str()])
                .inc();
        }
        available
    }

    fn send_current_step(&self, op: &Operator, region: &RegionInfo) {
        if let Some(step) = op.current_step() {
            if let Some(payload) = step.payload(region) {
                self.hb_stream.send(RegionHeartbeatResponse {
                    region_id: op.region_id(),
                    payload,
                });
            }
        }
    }

    fn observe_terminal(op: &Operator) {
        OPERATOR_COUNTER_VEC
            .with_label_values(&[&op.kind().to_string(), op.status().as_str()])
            .inc();
        if op.status() == OpStatus::Success {
            OPERATOR_DURATION_HISTOGRAM_VEC
                .with_label_values(&[&op.kind().to_string()])
                .observe(op.running_duration().as_secs_f64());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterState;
    use crate::config::ScheduleConfig;
    use crate::core::{Peer, Region, RegionEpoch, StoreInfo};
    use crate::operator::{create_add_peer_operator, create_transfer_leader_operator};

    fn cluster() -> Arc<ClusterState> {
        let mut cfg = ScheduleConfig::default();
        cfg.leader_schedule_limit = 1;
        let c = Arc::new(ClusterState::new(cfg));
        for id in 1..=4 {
            c.put_store(StoreInfo::new(id, ""));
        }
        c
    }

    fn region(id: u64, stores: &[u64], leader: u64) -> RegionInfo {
        let mut r = Region::new(id, &[b'a' + id as u8 - 1], &[b'a' + id as u8]);
        r.epoch = RegionEpoch::new(1, 1);
        for (i, &s) in stores.iter().enumerate() {
            r.peers.push(Peer::new(id * 100 + i as u64, s));
        }
        let mut info = RegionInfo::new(r);
        info.leader = info.get_store_peer(leader).cloned();
        info.approximate_size = 8;
        info
    }

    fn controller(c: &Arc<ClusterState>) -> OperatorController {
        OperatorController::new(Arc::clone(c) as Arc<dyn Cluster>, Box::new(NullHeartbeatStream))
    }

    #[test]
    fn test_one_operator_per_region() {
        let c = cluster();
        c.handle_region_heartbeat(region(1, &[1, 2], 1)).unwrap();
        let ctl = controller(&c);
        let r = c.get_region(1).unwrap();

        let op1 = create_add_peer_operator("make-up", c.as_ref(), &r, Peer::new(30, 3), OpKind::REPLICA).unwrap();
        let op2 = create_add_peer_operator("make-up", c.as_ref(), &r, Peer::new(40, 4), OpKind::REPLICA).unwrap();
        assert_eq!(ctl.add_waiting_operator(vec![op1]), 1);
        assert!(ctl.has_operator(1));
        // A same-priority duplicate for the region is rejected.
        assert_eq!(ctl.add_waiting_operator(vec![op2]), 0);
        assert_eq!(ctl.operator_count(OpKind::REPLICA), 1);
    }

    #[test]
    fn test_epoch_mismatch_rejected() {
        let c = cluster();
        c.handle_region_heartbeat(region(1, &[1, 2], 1)).unwrap();
        let ctl = controller(&c);
        let r = c.get_region(1).unwrap();
        let op = create_add_peer_operator("make-up", c.as_ref(), &r, Peer::new(30, 3), OpKind::REPLICA).unwrap();

        // The region epoch moves on before admission.
        let mut newer = region(1, &[1, 2], 1);
        newer.region.epoch = RegionEpoch::new(2, 1);
        c.handle_region_heartbeat(newer).unwrap();

        assert_eq!(ctl.add_waiting_operator(vec![op]), 0);
        assert!(!ctl.has_operator(1));
    }

    #[test]
    fn test_kind_cap_parks_batch() {
        let c = cluster();
        c.handle_region_heartbeat(region(1, &[1, 2], 1)).unwrap();
        c.handle_region_heartbeat(region(2, &[1, 2], 1)).unwrap();
        let ctl = controller(&c);

        let r1 = c.get_region(1).unwrap();
        let r2 = c.get_region(2).unwrap();
        let t1 = create_transfer_leader_operator("balance-leader", c.as_ref(), &r1, 1, 2, OpKind::empty()).unwrap();
        let t2 = create_transfer_leader_operator("balance-leader", c.as_ref(), &r2, 1, 2, OpKind::empty()).unwrap();

        // leader_schedule_limit is 1: the second stays queued.
        assert_eq!(ctl.add_waiting_operator(vec![t1]), 1);
        assert_eq!(ctl.add_waiting_operator(vec![t2]), 1);
        assert!(ctl.has_operator(1));
        assert!(!ctl.has_operator(2));

        // Finishing the first promotes the queued one.
        let done = region(1, &[1, 2], 2);
        ctl.dispatch(&done);
        assert!(!ctl.has_operator(1));
        assert!(ctl.has_operator(2));
    }

    #[test]
    fn test_dispatch_finishes_operator() {
        let c = cluster();
        c.handle_region_heartbeat(region(1, &[1, 2], 1)).unwrap();
        let ctl = controller(&c);
        let r = c.get_region(1).unwrap();
        let op = create_add_peer_operator("make-up", c.as_ref(), &r, Peer::new(30, 3), OpKind::REPLICA).unwrap();
        ctl.add_waiting_operator(vec![op]);

        // Learner appears, then is promoted: the operator completes.
        let mut with_learner = region(1, &[1, 2], 1);
        with_learner.region.peers.push(Peer::new_learner(30, 3));
        ctl.dispatch(&with_learner);
        assert!(ctl.has_operator(1));

        let mut promoted = region(1, &[1, 2], 1);
        promoted.region.peers.push(Peer::new(30, 3));
        ctl.dispatch(&promoted);
        assert!(!ctl.has_operator(1));
    }

    #[test]
    fn test_remove_operator_idempotent() {
        let c = cluster();
        c.handle_region_heartbeat(region(1, &[1, 2], 1)).unwrap();
        let ctl = controller(&c);
        let r = c.get_region(1).unwrap();
        let op = create_add_peer_operator("make-up", c.as_ref(), &r, Peer::new(30, 3), OpKind::REPLICA).unwrap();
        ctl.add_waiting_operator(vec![op]);
        assert!(ctl.remove_operator(1, OpStatus::Cancelled));
        assert!(!ctl.remove_operator(1, OpStatus::Cancelled));
    }

    #[test]
    fn test_store_limit_blocks_admission() {
        let mut cfg = ScheduleConfig::default();
        cfg.store_limit_default.add_peer = 1.0;
        let c = Arc::new(ClusterState::new(cfg));
        for id in 1..=4 {
            c.put_store(StoreInfo::new(id, ""));
        }
        c.handle_region_heartbeat(region(1, &[1, 2], 1)).unwrap();
        c.handle_region_heartbeat(region(2, &[1, 2], 1)).unwrap();
        let ctl = controller(&c);

        let r1 = c.get_region(1).unwrap();
        let op1 = create_add_peer_operator("make-up", c.as_ref(), &r1, Peer::new(30, 3), OpKind::REPLICA).unwrap();
        assert_eq!(ctl.add_waiting_operator(vec![op1]), 1);
        assert!(ctl.has_operator(1));

        // The add-peer bucket of store 3 is drained below zero; the next
        // operator touching it stays queued.
        let r2 = c.get_region(2).unwrap();
        let op2 = create_add_peer_operator("make-up", c.as_ref(), &r2, Peer::new(31, 3), OpKind::REPLICA).unwrap();
        assert_eq!(ctl.add_waiting_operator(vec![op2]), 1);
        assert!(!ctl.has_operator(2));
        assert!(!ctl.store_limit_available(3, StoreLimitType::AddPeer));
    }
}
