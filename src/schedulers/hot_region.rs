// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::cluster::Cluster;
use crate::core::{PeerRole, PriorityLevel, StoreInfo};
use crate::filter::{ExcludedFilter, Filter, StoreStateFilter};
use crate::metrics::SCHEDULER_COUNTER_VEC;
use crate::operator::{
    create_move_peer_operator, create_transfer_leader_operator, OpKind, Operator,
    OperatorController,
};
use crate::schedulers::utils::{
    diff_cmp, min_lp_cmp, placement_safe, slice_load_cmp, slice_lp_cmp, st_ld_byte_rate,
    st_ld_key_rate, st_ld_rank_cmp, step_rank, Influence, PendingInfluence, StoreLoad,
    StoreLoadPred,
};
use crate::schedulers::{SchedulePlan, Scheduler};
use crate::statistics::{FlowKind, HotPeerStat, REGION_HEARTBEAT_REPORT_INTERVAL};

pub const HOT_REGION_NAME: &str = "balance-hot-region-scheduler";
pub const HOT_REGION_TYPE: &str = "balance-hot-region";

/// A store participates in hot balancing only when its load deviates
/// from the cluster expectation by this factor.
const HOT_SCHEDULE_FACTOR: f64 = 1.05;
/// The rank step is this share of the expected load; differences below
/// one step are noise.
const RANK_STEP_RATIO: f64 = 0.05;
const MIN_HOT_SCHEDULE_INTERVAL: Duration = Duration::from_secs(10);

/// A peer move stays influential for a full report interval; a leader
/// transfer settles much faster.
const PEER_PENDING_ZOMBIE: Duration = Duration::from_secs(REGION_HEARTBEAT_REPORT_INTERVAL);
const LEADER_PENDING_ZOMBIE: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HotResource {
    Leader,
    Peer,
}

/// Load summary of one store for one (flow, resource) pair.
struct StoreLoadDetail {
    store: StoreInfo,
    load_pred: StoreLoadPred,
    hot_peers: Vec<HotPeerStat>,
}

/// Balances hot read and write flow across stores, moving hot peers or
/// hot leaders away from overloaded stores.
pub struct BalanceHotRegionScheduler {
    op_controller: Arc<OperatorController>,
    pending_influences: Vec<PendingInfluence>,
}

impl BalanceHotRegionScheduler {
    pub fn new(op_controller: Arc<OperatorController>) -> BalanceHotRegionScheduler {
        BalanceHotRegionScheduler {
            op_controller,
            pending_influences: Vec::new(),
        }
    }

    /// Drops influences whose operator is gone and whose zombie window
    /// lapsed, then sums the rest per store.
    fn summarize_pending(&mut self) -> HashMap<u64, Influence> {
        let op_controller = &self.op_controller;
        self.pending_influences.retain(|p| {
            op_controller.has_operator(p.region_id) || !p.is_zombie()
        });
        let mut sums: HashMap<u64, Influence> = HashMap::new();
        for p in &self.pending_influences {
            let from = sums.entry(p.from_store).or_default();
            *from = from.add(&p.origin, -1.0);
            let to = sums.entry(p.to_store).or_default();
            *to = to.add(&p.origin, 1.0);
        }
        sums
    }

    fn summary_stores_load(
        &self,
        cluster: &dyn Cluster,
        kind: FlowKind,
        resource: HotResource,
        pending: &HashMap<u64, Influence>,
    ) -> HashMap<u64, StoreLoadDetail> {
        let cfg = cluster.get_opts();
        let min_degree = cfg.hot_region_cache_hits_threshold as i32;
        let mut hot_stats = cluster.hot_region_stats(kind, min_degree);

        let stores = cluster.get_stores();
        let mut details = HashMap::with_capacity(stores.len());
        let mut total = StoreLoad::default();
        let mut up_count = 0usize;
        for store in stores {
            if !store.is_up() {
                continue;
            }
            let mut hot_peers = hot_stats.remove(&store.id).unwrap_or_default();
            if resource == HotResource::Leader {
                hot_peers.retain(|p| p.is_leader());
            }

            let (byte_rate, key_rate) = match (kind, resource) {
                // Write flow per leader is not reported at store level;
                // derive it from the hot leader peers.
                (FlowKind::Write, HotResource::Leader) => (
                    hot_peers.iter().map(|p| p.get_byte_rate()).sum(),
                    hot_peers.iter().map(|p| p.get_key_rate()).sum(),
                ),
                (FlowKind::Write, HotResource::Peer) => {
                    (store.bytes_written, store.keys_written)
                }
                (FlowKind::Read, _) => (store.bytes_read, store.keys_read),
            };

            let current = StoreLoad {
                byte_rate,
                key_rate,
                count: hot_peers.len() as f64,
            };
            total.byte_rate += current.byte_rate;
            total.key_rate += current.key_rate;
            total.count += current.count;
            up_count += 1;

            let infl = pending.get(&store.id).copied().unwrap_or_default();
            details.insert(
                store.id,
                StoreLoadDetail {
                    store,
                    load_pred: current.to_load_pred(infl),
                    hot_peers,
                },
            );
        }

        if up_count > 0 {
            let expect = StoreLoad {
                byte_rate: total.byte_rate / up_count as f64,
                key_rate: total.key_rate / up_count as f64,
                count: total.count / up_count as f64,
            };
            for detail in details.values_mut() {
                detail.load_pred.expect = expect;
            }
        }
        details
    }

    fn balance(
        &mut self,
        cluster: &dyn Cluster,
        kind: FlowKind,
        resource: HotResource,
    ) -> Option<Operator> {
        let pending = self.summarize_pending();
        let details = self.summary_stores_load(cluster, kind, resource, &pending);
        let expect = details
            .values()
            .next()
            .map(|d| d.load_pred.expect)
            .unwrap_or_default();

        // Source stores: guaranteed load above expectation.
        let mut sources: Vec<&StoreLoadDetail> = details
            .values()
            .filter(|d| d.load_pred.min().byte_rate > expect.byte_rate * HOT_SCHEDULE_FACTOR)
            .collect();
        sources.sort_by(|a, b| {
            b.load_pred
                .min()
                .byte_rate
                .partial_cmp(&a.load_pred.min().byte_rate)
                .unwrap()
        });

        let rank = step_rank((expect.byte_rate * RANK_STEP_RATIO).max(1.0));
        for src in sources {
            let mut peers = src.hot_peers.clone();
            peers.sort_by(|a, b| b.get_byte_rate().partial_cmp(&a.get_byte_rate()).unwrap());
            for stat in &peers {
                if let Some(op) =
                    self.try_one_peer(cluster, kind, resource, src, stat, &details, &rank)
                {
                    return Some(op);
                }
            }
        }
        None
    }

    fn try_one_peer(
        &mut self,
        cluster: &dyn Cluster,
        kind: FlowKind,
        resource: HotResource,
        src: &StoreLoadDetail,
        stat: &HotPeerStat,
        details: &HashMap<u64, StoreLoadDetail>,
        rank: &impl Fn(f64) -> i64,
    ) -> Option<Operator> {
        let cfg = cluster.get_opts();
        let region = cluster.get_region(stat.region_id)?;
        if !region.is_healthy() {
            return None;
        }
        match resource {
            HotResource::Leader => {
                if region.leader_store_id() != src.store.id {
                    return None;
                }
                if stat.is_need_cool_down_transfer_leader(cfg.hot_region_cache_hits_threshold) {
                    SCHEDULER_COUNTER_VEC
                        .with_label_values(&[HOT_REGION_NAME, "need-cool-down"])
                        .inc();
                    return None;
                }
            }
            HotResource::Peer => {
                region.get_store_peer(src.store.id)?;
            }
        }

        let state_filter = StoreStateFilter {
            action_scope: HOT_REGION_NAME.to_owned(),
            transfer_leader: resource == HotResource::Leader,
            move_region: resource == HotResource::Peer,
        };

        let candidate_ids: Vec<u64> = match resource {
            // A leader can only move onto an existing follower.
            HotResource::Leader => region.get_followers().iter().map(|p| p.store_id).collect(),
            HotResource::Peer => {
                let excluded = ExcludedFilter::new(
                    HOT_REGION_NAME,
                    HashSet::new(),
                    region.get_store_ids(),
                );
                details
                    .keys()
                    .copied()
                    .filter(|id| {
                        details
                            .get(id)
                            .map_or(false, |d| excluded.target(&cfg, &d.store))
                    })
                    .collect()
            }
        };

        let peer_byte_rate = stat.get_byte_rate();
        let expect = src.load_pred.expect;
        let byte_rank = st_ld_rank_cmp(st_ld_byte_rate, step_rank((expect.byte_rate * RANK_STEP_RATIO).max(1.0)));
        let key_rank = st_ld_rank_cmp(st_ld_key_rate, step_rank((expect.key_rate * RANK_STEP_RATIO).max(1.0)));
        let dst_cmp = slice_lp_cmp(vec![
            min_lp_cmp(slice_load_cmp(vec![byte_rank, key_rank])),
            diff_cmp(st_ld_rank_cmp(st_ld_byte_rate, step_rank(1.0))),
        ]);

        let mut best: Option<&StoreLoadDetail> = None;
        for id in candidate_ids {
            let dst = match details.get(&id) {
                Some(d) => d,
                None => continue,
            };
            if !state_filter.target(&cfg, &dst.store) {
                continue;
            }
            if dst.load_pred.max().byte_rate >= expect.byte_rate * HOT_SCHEDULE_FACTOR {
                continue;
            }
            // The move must not simply flip the imbalance.
            if rank(src.load_pred.min().byte_rate - peer_byte_rate)
                < rank(dst.load_pred.max().byte_rate + peer_byte_rate)
            {
                continue;
            }
            if resource == HotResource::Peer
                && !placement_safe(cluster, &region, src.store.id, dst.store.id)
            {
                continue;
            }
            best = match best {
                Some(b)
                    if dst_cmp(&b.load_pred, &dst.load_pred) != std::cmp::Ordering::Greater =>
                {
                    Some(b)
                }
                _ => Some(dst),
            };
        }
        let dst = best?;

        let infl = Influence {
            byte_rate: peer_byte_rate,
            key_rate: stat.get_key_rate(),
            count: 1.0,
        };
        let result = match resource {
            HotResource::Leader => create_transfer_leader_operator(
                match kind {
                    FlowKind::Write => "transfer-hot-write-leader",
                    FlowKind::Read => "transfer-hot-read-leader",
                },
                cluster,
                &region,
                src.store.id,
                dst.store.id,
                OpKind::HOT_REGION,
            ),
            HotResource::Peer => {
                let new_peer = cluster.alloc_peer(dst.store.id, PeerRole::Voter);
                create_move_peer_operator(
                    match kind {
                        FlowKind::Write => "move-hot-write-peer",
                        FlowKind::Read => "move-hot-read-peer",
                    },
                    cluster,
                    &region,
                    OpKind::HOT_REGION,
                    src.store.id,
                    new_peer,
                )
            }
        };
        match result {
            Ok(mut op) => {
                op.set_priority(PriorityLevel::Low);
                SCHEDULER_COUNTER_VEC
                    .with_label_values(&[HOT_REGION_NAME, "new-operator"])
                    .inc();
                let zombie = match resource {
                    HotResource::Peer => PEER_PENDING_ZOMBIE,
                    HotResource::Leader => LEADER_PENDING_ZOMBIE,
                };
                self.pending_influences.push(PendingInfluence::new(
                    stat.region_id,
                    src.store.id,
                    dst.store.id,
                    infl,
                    zombie,
                ));
                Some(op)
            }
            Err(e) => {
                debug!("fail to create hot region operator"; "err" => %e);
                None
            }
        }
    }
}

impl Scheduler for BalanceHotRegionScheduler {
    fn get_name(&self) -> &str {
        HOT_REGION_NAME
    }

    fn get_type(&self) -> &'static str {
        HOT_REGION_TYPE
    }

    fn get_min_interval(&self) -> Duration {
        MIN_HOT_SCHEDULE_INTERVAL
    }

    fn is_schedule_allowed(&self, cluster: &dyn Cluster) -> bool {
        let allowed = self.op_controller.operator_count(OpKind::HOT_REGION)
            < cluster.get_opts().hot_region_schedule_limit;
        if !allowed {
            SCHEDULER_COUNTER_VEC
                .with_label_values(&[HOT_REGION_NAME, "limit"])
                .inc();
        }
        allowed
    }

    fn schedule(
        &mut self,
        cluster: &dyn Cluster,
        _dry_run: bool,
    ) -> (Vec<Operator>, Vec<SchedulePlan>) {
        SCHEDULER_COUNTER_VEC
            .with_label_values(&[HOT_REGION_NAME, "schedule"])
            .inc();

        let op = if rand::thread_rng().gen_bool(0.5) {
            // Write flow: try moving a peer first, then its leadership.
            self.balance(cluster, FlowKind::Write, HotResource::Peer)
                .or_else(|| self.balance(cluster, FlowKind::Write, HotResource::Leader))
        } else {
            self.balance(cluster, FlowKind::Read, HotResource::Leader)
        };
        match op {
            Some(op) => (vec![op], Vec::new()),
            None => {
                SCHEDULER_COUNTER_VEC
                    .with_label_values(&[HOT_REGION_NAME, "skip"])
                    .inc();
                (Vec::new(), Vec::new())
            }
        }
    }
}
