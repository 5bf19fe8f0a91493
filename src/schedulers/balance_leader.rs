// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use crate::cluster::Cluster;
use crate::core::{RegionInfo, ResourceKind, ScheduleKind, StoreInfo};
use crate::filter::{Filter, StoreStateFilter};
use crate::metrics::SCHEDULER_COUNTER_VEC;
use crate::operator::{
    create_transfer_leader_operator, OpKind, Operator, OperatorController,
};
use crate::schedulers::utils::{
    should_balance, RetryQuota, DEFAULT_RETRY_QUOTA_ATTENUATION, DEFAULT_RETRY_QUOTA_INITIAL,
    DEFAULT_RETRY_QUOTA_MIN,
};
use crate::schedulers::{SchedulePlan, Scheduler};

pub const BALANCE_LEADER_NAME: &str = "balance-leader-scheduler";
pub const BALANCE_LEADER_TYPE: &str = "balance-leader";

/// Evens out leader count (or size) across stores by transferring
/// leadership, out of the highest scored store and into the lowest.
pub struct BalanceLeaderScheduler {
    op_controller: Arc<OperatorController>,
    retry_quota: RetryQuota,
}

impl BalanceLeaderScheduler {
    pub fn new(op_controller: Arc<OperatorController>) -> BalanceLeaderScheduler {
        BalanceLeaderScheduler {
            op_controller,
            retry_quota: RetryQuota::new(
                DEFAULT_RETRY_QUOTA_INITIAL,
                DEFAULT_RETRY_QUOTA_MIN,
                DEFAULT_RETRY_QUOTA_ATTENUATION,
            ),
        }
    }

    /// Transfers a leader off the overloaded store.
    fn transfer_out(
        &self,
        cluster: &dyn Cluster,
        source: &StoreInfo,
        kind: ScheduleKind,
    ) -> Option<Operator> {
        let region = cluster.rand_leader_region(source.id)?;
        if !region.is_healthy() {
            SCHEDULER_COUNTER_VEC
                .with_label_values(&[BALANCE_LEADER_NAME, "region-unhealthy"])
                .inc();
            return None;
        }
        let cfg = cluster.get_opts();
        let state_filter = StoreStateFilter {
            action_scope: BALANCE_LEADER_NAME.to_owned(),
            transfer_leader: true,
            move_region: false,
        };
        let mut targets: Vec<StoreInfo> = region
            .get_followers()
            .iter()
            .filter_map(|p| cluster.get_store(p.store_id))
            .filter(|s| state_filter.target(&cfg, s))
            .collect();
        targets.sort_by(|a, b| {
            a.leader_score(kind.policy, 0)
                .partial_cmp(&b.leader_score(kind.policy, 0))
                .unwrap()
        });
        for target in &targets {
            if let Some(op) = self.try_transfer(cluster, source, target, &region, kind) {
                return Some(op);
            }
        }
        None
    }

    /// Pulls a leader onto the underloaded store.
    fn transfer_in(
        &self,
        cluster: &dyn Cluster,
        target: &StoreInfo,
        kind: ScheduleKind,
    ) -> Option<Operator> {
        let region = cluster.rand_follower_region(target.id)?;
        if !region.is_healthy() {
            SCHEDULER_COUNTER_VEC
                .with_label_values(&[BALANCE_LEADER_NAME, "region-unhealthy"])
                .inc();
            return None;
        }
        let source = cluster.get_store(region.leader_store_id())?;
        self.try_transfer(cluster, &source, target, &region, kind)
    }

    fn try_transfer(
        &self,
        cluster: &dyn Cluster,
        source: &StoreInfo,
        target: &StoreInfo,
        region: &RegionInfo,
        kind: ScheduleKind,
    ) -> Option<Operator> {
        let op_influence = self.op_controller.get_op_influence();
        let (ok, _, _) = should_balance(
            cluster,
            source,
            target,
            region,
            kind,
            &op_influence,
            BALANCE_LEADER_NAME,
        );
        if !ok {
            SCHEDULER_COUNTER_VEC
                .with_label_values(&[BALANCE_LEADER_NAME, "skip"])
                .inc();
            return None;
        }
        match create_transfer_leader_operator(
            "balance-leader",
            cluster,
            region,
            source.id,
            target.id,
            OpKind::empty(),
        ) {
            Ok(op) => {
                SCHEDULER_COUNTER_VEC
                    .with_label_values(&[BALANCE_LEADER_NAME, "new-operator"])
                    .inc();
                Some(op)
            }
            Err(e) => {
                debug!("fail to create balance leader operator"; "err" => %e);
                None
            }
        }
    }
}

impl Scheduler for BalanceLeaderScheduler {
    fn get_name(&self) -> &str {
        BALANCE_LEADER_NAME
    }

    fn get_type(&self) -> &'static str {
        BALANCE_LEADER_TYPE
    }

    fn is_schedule_allowed(&self, cluster: &dyn Cluster) -> bool {
        let allowed = self.op_controller.operator_count(OpKind::LEADER)
            < cluster.get_opts().leader_schedule_limit;
        if !allowed {
            SCHEDULER_COUNTER_VEC
                .with_label_values(&[BALANCE_LEADER_NAME, "limit"])
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
            .with_label_values(&[BALANCE_LEADER_NAME, "schedule"])
            .inc();

        let cfg = cluster.get_opts();
        let kind = ScheduleKind::new(ResourceKind::Leader, cfg.leader_schedule_policy);
        let state_filter = StoreStateFilter {
            action_scope: BALANCE_LEADER_NAME.to_owned(),
            transfer_leader: true,
            move_region: false,
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

        // Highest scored stores shed leaders, lowest scored ones attract
        // them.
        stores.sort_by(|a, b| {
            b.leader_score(kind.policy, 0)
                .partial_cmp(&a.leader_score(kind.policy, 0))
                .unwrap()
        });

        for source in stores.iter() {
            let limit = self.retry_quota.get_limit(source.id);
            for _ in 0..limit {
                if let Some(op) = self.transfer_out(cluster, source, kind) {
                    self.retry_quota.reset_limit(source.id);
                    return (vec![op], Vec::new());
                }
            }
            self.retry_quota.attenuate(source.id);
        }

        for target in stores.iter().rev() {
            let limit = self.retry_quota.get_limit(target.id);
            for _ in 0..limit {
                if let Some(op) = self.transfer_in(cluster, target, kind) {
                    self.retry_quota.reset_limit(target.id);
                    return (vec![op], Vec::new());
                }
            }
            self.retry_quota.attenuate(target.id);
        }

        SCHEDULER_COUNTER_VEC
            .with_label_values(&[BALANCE_LEADER_NAME, "no-operator"])
            .inc();
        (Vec::new(), Vec::new())
    }
}
