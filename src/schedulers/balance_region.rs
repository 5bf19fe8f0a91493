// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::HashSet;
use std::sync::Arc;

use crate::cluster::Cluster;
use crate::core::{PeerRole, RegionInfo, ResourceKind, ScheduleKind, SchedulePolicy, StoreInfo};
use crate::filter::{ExcludedFilter, Filter, StoreStateFilter};
use crate::metrics::SCHEDULER_COUNTER_VEC;
use crate::operator::{create_move_peer_operator, OpKind, Operator, OperatorController};
use crate::schedulers::utils::{
    placement_safe, should_balance, RetryQuota, DEFAULT_RETRY_QUOTA_ATTENUATION,
    DEFAULT_RETRY_QUOTA_INITIAL, DEFAULT_RETRY_QUOTA_MIN,
};
use crate::schedulers::{SchedulePlan, Scheduler};

pub const BALANCE_REGION_NAME: &str = "balance-region-scheduler";
pub const BALANCE_REGION_TYPE: &str = "balance-region";

/// Evens out region size across stores by moving peers from the highest
/// region-scored store towards the lowest.
pub struct BalanceRegionScheduler {
    op_controller: Arc<OperatorController>,
    retry_quota: RetryQuota,
}

impl BalanceRegionScheduler {
    pub fn new(op_controller: Arc<OperatorController>) -> BalanceRegionScheduler {
        BalanceRegionScheduler {
            op_controller,
            retry_quota: RetryQuota::new(
                DEFAULT_RETRY_QUOTA_INITIAL,
                DEFAULT_RETRY_QUOTA_MIN,
                DEFAULT_RETRY_QUOTA_ATTENUATION,
            ),
        }
    }

    /// Picks a region to move off the source store: shedding pending
    /// regions first, then followers, then leaders, then learners.
    fn pick_region(&self, cluster: &dyn Cluster, source: &StoreInfo) -> Option<RegionInfo> {
        if let Some(r) = cluster.rand_pending_region(source.id) {
            SCHEDULER_COUNTER_VEC
                .with_label_values(&[BALANCE_REGION_NAME, "pending-region"])
                .inc();
            return Some(r);
        }
        cluster
            .rand_follower_region(source.id)
            .or_else(|| cluster.rand_leader_region(source.id))
            .or_else(|| cluster.rand_learner_region(source.id))
            .filter(|r| {
                if r.is_healthy() {
                    true
                } else {
                    SCHEDULER_COUNTER_VEC
                        .with_label_values(&[BALANCE_REGION_NAME, "region-unhealthy"])
                        .inc();
                    false
                }
            })
    }

    fn fully_placed(&self, cluster: &dyn Cluster, region: &RegionInfo) -> bool {
        let cfg = cluster.get_opts();
        if cfg.enable_placement_rules {
            cluster.fit_region(region).is_satisfied()
        } else {
            region.get_voters().len() == cfg.max_replicas as usize
        }
    }

    fn try_move(
        &self,
        cluster: &dyn Cluster,
        source: &StoreInfo,
        region: &RegionInfo,
        plans: &mut Vec<SchedulePlan>,
    ) -> Option<Operator> {
        let cfg = cluster.get_opts();
        let kind = ScheduleKind::new(ResourceKind::Region, SchedulePolicy::Size);
        let op_influence = self.op_controller.get_op_influence();

        let state_filter = StoreStateFilter {
            action_scope: BALANCE_REGION_NAME.to_owned(),
            transfer_leader: false,
            move_region: true,
        };
        let excluded = ExcludedFilter::new(
            BALANCE_REGION_NAME,
            HashSet::new(),
            region.get_store_ids(),
        );

        let mut candidates: Vec<StoreInfo> = cluster
            .get_stores()
            .into_iter()
            .filter(|s| state_filter.target(&cfg, s) && excluded.target(&cfg, s))
            .collect();
        candidates.sort_by(|a, b| {
            let score_a = a.region_score(
                &cfg.region_score_formula_version,
                cfg.high_space_ratio,
                cfg.low_space_ratio,
                0,
            );
            let score_b = b.region_score(
                &cfg.region_score_formula_version,
                cfg.high_space_ratio,
                cfg.low_space_ratio,
                0,
            );
            score_a.partial_cmp(&score_b).unwrap()
        });

        for target in &candidates {
            let (ok, _, _) = should_balance(
                cluster,
                source,
                target,
                region,
                kind,
                &op_influence,
                BALANCE_REGION_NAME,
            );
            if !ok {
                plans.push(SchedulePlan::new(
                    source.id,
                    target.id,
                    region.get_id(),
                    "should-balance-failed",
                ));
                continue;
            }
            if !placement_safe(cluster, region, source.id, target.id) {
                plans.push(SchedulePlan::new(
                    source.id,
                    target.id,
                    region.get_id(),
                    "placement-unsafe",
                ));
                continue;
            }
            let new_peer = cluster.alloc_peer(target.id, PeerRole::Voter);
            match create_move_peer_operator(
                "balance-region",
                cluster,
                region,
                OpKind::REGION,
                source.id,
                new_peer,
            ) {
                Ok(op) => {
                    SCHEDULER_COUNTER_VEC
                        .with_label_values(&[BALANCE_REGION_NAME, "new-operator"])
                        .inc();
                    return Some(op);
                }
                Err(e) => {
                    debug!("fail to create balance region operator"; "err" => %e);
                }
            }
        }
        None
    }
}

impl Scheduler for BalanceRegionScheduler {
    fn get_name(&self) -> &str {
        BALANCE_REGION_NAME
    }

    fn get_type(&self) -> &'static str {
        BALANCE_REGION_TYPE
    }

    fn is_schedule_allowed(&self, cluster: &dyn Cluster) -> bool {
        let allowed = self.op_controller.operator_count(OpKind::REGION)
            < cluster.get_opts().region_schedule_limit;
        if !allowed {
            SCHEDULER_COUNTER_VEC
                .with_label_values(&[BALANCE_REGION_NAME, "limit"])
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
            .with_label_values(&[BALANCE_REGION_NAME, "schedule"])
            .inc();

        let cfg = cluster.get_opts();
        let state_filter = StoreStateFilter {
            action_scope: BALANCE_REGION_NAME.to_owned(),
            transfer_leader: false,
            move_region: true,
        };
        let mut stores: Vec<StoreInfo> = cluster
            .get_stores()
            .into_iter()
            .filter(|s| s.is_up() && state_filter.source(&cfg, s))
            .collect();
        if stores.len() < 2 {
            return (Vec::new(), Vec::new());
        }
        self.retry_quota.gc(&stores);

        stores.sort_by(|a, b| {
            let score_a = a.region_score(
                &cfg.region_score_formula_version,
                cfg.high_space_ratio,
                cfg.low_space_ratio,
                0,
            );
            let score_b = b.region_score(
                &cfg.region_score_formula_version,
                cfg.high_space_ratio,
                cfg.low_space_ratio,
                0,
            );
            score_b.partial_cmp(&score_a).unwrap()
        });

        let mut plans = Vec::new();
        for source in &stores {
            let limit = self.retry_quota.get_limit(source.id);
            for _ in 0..limit {
                let region = match self.pick_region(cluster, source) {
                    Some(r) => r,
                    None => {
                        SCHEDULER_COUNTER_VEC
                            .with_label_values(&[BALANCE_REGION_NAME, "no-region"])
                            .inc();
                        break;
                    }
                };
                if !self.fully_placed(cluster, &region) {
                    SCHEDULER_COUNTER_VEC
                        .with_label_values(&[BALANCE_REGION_NAME, "region-not-replicated"])
                        .inc();
                    continue;
                }
                if let Some(op) = self.try_move(cluster, source, &region, &mut plans) {
                    self.retry_quota.reset_limit(source.id);
                    return (vec![op], plans);
                }
            }
            self.retry_quota.attenuate(source.id);
        }

        SCHEDULER_COUNTER_VEC
            .with_label_values(&[BALANCE_REGION_NAME, "no-operator"])
            .inc();
        (Vec::new(), plans)
    }
}
