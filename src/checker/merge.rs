// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use crate::cluster::Cluster;
use crate::core::RegionInfo;
use crate::metrics::CHECKER_COUNTER_VEC;
use crate::operator::{create_merge_region_operator, OpKind, Operator};

/// Merges undersized regions into an eligible neighbor, preferring the
/// smaller side. Emits the paired active+passive operators.
pub struct MergeChecker {
    cluster: Arc<dyn Cluster>,
}

impl MergeChecker {
    pub fn new(cluster: Arc<dyn Cluster>) -> MergeChecker {
        MergeChecker { cluster }
    }

    pub fn get_type(&self) -> &'static str {
        "merge-checker"
    }

    pub fn check(&self, region: &RegionInfo) -> Option<Vec<Operator>> {
        CHECKER_COUNTER_VEC
            .with_label_values(&["merge_checker", "check"])
            .inc();
        let cfg = self.cluster.get_opts();
        if !cfg.merge_enabled() {
            return None;
        }
        if self.cluster.is_recently_split(region.get_id()) {
            CHECKER_COUNTER_VEC
                .with_label_values(&["merge_checker", "recently-split"])
                .inc();
            return None;
        }
        if region.approximate_size >= cfg.max_merge_region_size
            || region.approximate_keys >= cfg.max_merge_region_keys
        {
            CHECKER_COUNTER_VEC
                .with_label_values(&["merge_checker", "no-need"])
                .inc();
            return None;
        }
        if !self.mergeable(region) {
            CHECKER_COUNTER_VEC
                .with_label_values(&["merge_checker", "unhealthy"])
                .inc();
            return None;
        }

        let (prev, next) = self.cluster.adjacent_regions(region);
        let prev = prev.filter(|t| self.allow_merge(region, t));
        let next = next.filter(|t| self.allow_merge(region, t));

        // Prefer the smaller adjacent region; ties go to the earlier one.
        let target = match (prev, next) {
            (Some(p), Some(n)) => {
                if p.approximate_size <= n.approximate_size {
                    Some(p)
                } else {
                    Some(n)
                }
            }
            (p, n) => p.or(n),
        }?;

        CHECKER_COUNTER_VEC
            .with_label_values(&["merge_checker", "new-operator"])
            .inc();
        match create_merge_region_operator(
            "merge-region",
            self.cluster.as_ref(),
            region,
            &target,
            OpKind::empty(),
        ) {
            Ok(ops) => Some(ops),
            Err(e) => {
                debug!("fail to create merge region operator"; "err" => %e);
                None
            }
        }
    }

    /// A region may merge when it is healthy, led, and fully placed.
    fn mergeable(&self, region: &RegionInfo) -> bool {
        if region.get_leader().is_none() || !region.is_healthy() {
            return false;
        }
        let cfg = self.cluster.get_opts();
        if cfg.enable_placement_rules {
            self.cluster.fit_region(region).is_satisfied()
        } else {
            region.get_voters().len() == cfg.max_replicas as usize
        }
    }

    fn allow_merge(&self, region: &RegionInfo, target: &RegionInfo) -> bool {
        if !self.mergeable(target) {
            return false;
        }
        if self.cluster.is_recently_split(target.get_id()) {
            return false;
        }
        if self.cluster.is_region_hot(region) || self.cluster.is_region_hot(target) {
            return false;
        }
        // Never merge across a label boundary.
        let labeler = self.cluster.get_region_labeler();
        labeler.get_region_labels(region) == labeler.get_region_labels(target)
    }
}
