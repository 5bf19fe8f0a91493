// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::cluster::Cluster;
use crate::core::{RegionInfo, ResourceKind, ScheduleKind, SchedulePolicy, StoreInfo};
use crate::operator::OpInfluence;

/// Used to derive the tolerant ratio from the cluster's region count.
const ADJUST_RATIO: f64 = 0.005;
const LEADER_TOLERANT_SIZE_RATIO: f64 = 5.0;
const MIN_TOLERANT_SIZE_RATIO: f64 = 1.0;

pub const DEFAULT_RETRY_QUOTA_INITIAL: usize = 10;
pub const DEFAULT_RETRY_QUOTA_MIN: usize = 1;
pub const DEFAULT_RETRY_QUOTA_ATTENUATION: usize = 2;

/// Decides whether moving `region` from `source` to `target` still
/// leaves the source scored above the target, after padding both sides
/// with the tolerant resource. Returns the verdict and both scores.
pub fn should_balance(
    cluster: &dyn Cluster,
    source: &StoreInfo,
    target: &StoreInfo,
    region: &RegionInfo,
    kind: ScheduleKind,
    op_influence: &OpInfluence,
    scheduler_name: &str,
) -> (bool, f64, f64) {
    let tolerant = get_tolerant_resource(cluster, region, kind);
    let source_influence = op_influence.resource_property(source.id, kind);
    let target_influence = op_influence.resource_property(target.id, kind);
    let source_delta = source_influence - tolerant;
    let target_delta = target_influence + tolerant;

    let cfg = cluster.get_opts();
    let (source_score, target_score) = match kind.resource {
        ResourceKind::Leader => (
            source.leader_score(kind.policy, source_delta),
            target.leader_score(kind.policy, target_delta),
        ),
        ResourceKind::Region => (
            source.region_score(
                &cfg.region_score_formula_version,
                cfg.high_space_ratio,
                cfg.low_space_ratio,
                source_delta,
            ),
            target.region_score(
                &cfg.region_score_formula_version,
                cfg.high_space_ratio,
                cfg.low_space_ratio,
                target_delta,
            ),
        ),
    };

    // The move must keep the source above the target, or it would just
    // bounce back.
    let ok = source_score > target_score;
    if !ok {
        debug!("skip balance";
            "scheduler" => scheduler_name,
            "region-id" => region.get_id(),
            "source-store" => source.id,
            "target-store" => target.id,
            "source-score" => source_score,
            "target-score" => target_score,
            "tolerant-resource" => tolerant,
        );
    }
    (ok, source_score, target_score)
}

pub fn get_tolerant_resource(
    cluster: &dyn Cluster,
    region: &RegionInfo,
    kind: ScheduleKind,
) -> i64 {
    if kind.resource == ResourceKind::Leader && kind.policy == SchedulePolicy::Count {
        let mut tolerant_size_ratio = cluster.get_opts().tolerant_size_ratio;
        if tolerant_size_ratio == 0.0 {
            tolerant_size_ratio = LEADER_TOLERANT_SIZE_RATIO;
        }
        return tolerant_size_ratio as i64;
    }

    let tolerant_size_ratio = adjust_tolerant_ratio(cluster);
    let mut region_size = region.approximate_size as i64;
    if region_size < cluster.get_average_region_size() {
        region_size = cluster.get_average_region_size();
    }
    (region_size as f64 * tolerant_size_ratio) as i64
}

fn adjust_tolerant_ratio(cluster: &dyn Cluster) -> f64 {
    let mut tolerant_size_ratio = cluster.get_opts().tolerant_size_ratio;
    if tolerant_size_ratio == 0.0 {
        let max_region_count = cluster
            .get_stores()
            .iter()
            .map(|s| cluster.get_store_region_count(s.id) as f64)
            .fold(0.0, f64::max);
        tolerant_size_ratio = (max_region_count * ADJUST_RATIO).max(MIN_TOLERANT_SIZE_RATIO);
    }
    tolerant_size_ratio
}

/// A per-store attempt budget that halves on failure and resets on
/// success, so persistently fruitless stores are tried less often.
pub struct RetryQuota {
    initial_limit: usize,
    min_limit: usize,
    attenuation: usize,
    limits: HashMap<u64, usize>,
}

impl RetryQuota {
    pub fn new(initial_limit: usize, min_limit: usize, attenuation: usize) -> RetryQuota {
        RetryQuota {
            initial_limit,
            min_limit,
            attenuation,
            limits: HashMap::new(),
        }
    }

    pub fn get_limit(&mut self, store_id: u64) -> usize {
        *self.limits.entry(store_id).or_insert(self.initial_limit)
    }

    pub fn reset_limit(&mut self, store_id: u64) {
        self.limits.insert(store_id, self.initial_limit);
    }

    pub fn attenuate(&mut self, store_id: u64) {
        let limit = self.get_limit(store_id);
        self.limits
            .insert(store_id, (limit / self.attenuation).max(self.min_limit));
    }

    pub fn gc(&mut self, keep_stores: &[StoreInfo]) {
        let keep: std::collections::HashSet<u64> = keep_stores.iter().map(|s| s.id).collect();
        self.limits.retain(|id, _| keep.contains(id));
    }
}

/// Flow influence a pending hot-region operator exerts on its stores.
#[derive(Clone, Copy, Debug, Default)]
pub struct Influence {
    pub byte_rate: f64,
    pub key_rate: f64,
    pub count: f64,
}

impl Influence {
    pub fn add(mut self, rhs: &Influence, w: f64) -> Influence {
        self.byte_rate += rhs.byte_rate * w;
        self.key_rate += rhs.key_rate * w;
        self.count += rhs.count * w;
        self
    }
}

/// A hot-region operator's influence, tracked until the operator is
/// gone and its zombie window has lapsed.
pub struct PendingInfluence {
    pub region_id: u64,
    pub from_store: u64,
    pub to_store: u64,
    pub origin: Influence,
    pub max_zombie_duration: Duration,
    pub created: Instant,
}

impl PendingInfluence {
    pub fn new(
        region_id: u64,
        from_store: u64,
        to_store: u64,
        origin: Influence,
        max_zombie_duration: Duration,
    ) -> PendingInfluence {
        PendingInfluence {
            region_id,
            from_store,
            to_store,
            origin,
            max_zombie_duration,
            created: Instant::now(),
        }
    }

    pub fn is_zombie(&self) -> bool {
        self.created.elapsed() >= self.max_zombie_duration
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StoreLoad {
    pub byte_rate: f64,
    pub key_rate: f64,
    pub count: f64,
}

impl StoreLoad {
    pub fn to_load_pred(self, infl: Influence) -> StoreLoadPred {
        let mut future = self;
        future.byte_rate += infl.byte_rate;
        future.key_rate += infl.key_rate;
        future.count += infl.count;
        StoreLoadPred {
            current: self,
            future,
            expect: StoreLoad::default(),
        }
    }
}

pub fn st_ld_byte_rate(ld: &StoreLoad) -> f64 {
    ld.byte_rate
}

pub fn st_ld_key_rate(ld: &StoreLoad) -> f64 {
    ld.key_rate
}

pub fn st_ld_count(ld: &StoreLoad) -> f64 {
    ld.count
}

pub type StoreLoadCmp = Box<dyn Fn(&StoreLoad, &StoreLoad) -> Ordering>;

pub fn neg_load_cmp(cmp: StoreLoadCmp) -> StoreLoadCmp {
    Box::new(move |ld1, ld2| cmp(ld1, ld2).reverse())
}

pub fn slice_load_cmp(cmps: Vec<StoreLoadCmp>) -> StoreLoadCmp {
    Box::new(move |ld1, ld2| {
        for cmp in &cmps {
            let r = cmp(ld1, ld2);
            if r != Ordering::Equal {
                return r;
            }
        }
        Ordering::Equal
    })
}

/// Compares one dimension after collapsing it to coarse ranks, so noise
/// below the rank step does not flip decisions.
pub fn st_ld_rank_cmp(
    dim: fn(&StoreLoad) -> f64,
    rank: impl Fn(f64) -> i64 + 'static,
) -> StoreLoadCmp {
    Box::new(move |ld1, ld2| rank(dim(ld1)).cmp(&rank(dim(ld2))))
}

pub fn step_rank(step: f64) -> impl Fn(f64) -> i64 {
    let step = if step <= 0.0 { 1.0 } else { step };
    move |value| (value / step) as i64
}

/// Current and predicted load of one store, plus the cluster
/// expectation.
#[derive(Clone, Copy, Debug, Default)]
pub struct StoreLoadPred {
    pub current: StoreLoad,
    pub future: StoreLoad,
    pub expect: StoreLoad,
}

impl StoreLoadPred {
    pub fn min(&self) -> StoreLoad {
        min_load(&self.current, &self.future)
    }

    pub fn max(&self) -> StoreLoad {
        max_load(&self.current, &self.future)
    }

    pub fn diff(&self) -> StoreLoad {
        let mx = self.max();
        let mn = self.min();
        StoreLoad {
            byte_rate: mx.byte_rate - mn.byte_rate,
            key_rate: mx.key_rate - mn.key_rate,
            count: mx.count - mn.count,
        }
    }
}

pub type StoreLPCmp = Box<dyn Fn(&StoreLoadPred, &StoreLoadPred) -> Ordering>;

pub fn slice_lp_cmp(cmps: Vec<StoreLPCmp>) -> StoreLPCmp {
    Box::new(move |lp1, lp2| {
        for cmp in &cmps {
            let r = cmp(lp1, lp2);
            if r != Ordering::Equal {
                return r;
            }
        }
        Ordering::Equal
    })
}

/// Compares by the guaranteed (minimum) load of each prediction.
pub fn min_lp_cmp(ld_cmp: StoreLoadCmp) -> StoreLPCmp {
    Box::new(move |lp1, lp2| ld_cmp(&lp1.min(), &lp2.min()))
}

/// Compares by the worst-case (maximum) load of each prediction.
pub fn max_lp_cmp(ld_cmp: StoreLoadCmp) -> StoreLPCmp {
    Box::new(move |lp1, lp2| ld_cmp(&lp1.max(), &lp2.max()))
}

/// Compares by prediction uncertainty; smaller spread is more reliable.
pub fn diff_cmp(ld_cmp: StoreLoadCmp) -> StoreLPCmp {
    Box::new(move |lp1, lp2| ld_cmp(&lp1.diff(), &lp2.diff()))
}

fn min_load(a: &StoreLoad, b: &StoreLoad) -> StoreLoad {
    StoreLoad {
        byte_rate: a.byte_rate.min(b.byte_rate),
        key_rate: a.key_rate.min(b.key_rate),
        count: a.count.min(b.count),
    }
}

fn max_load(a: &StoreLoad, b: &StoreLoad) -> StoreLoad {
    StoreLoad {
        byte_rate: a.byte_rate.max(b.byte_rate),
        key_rate: a.key_rate.max(b.key_rate),
        count: a.count.max(b.count),
    }
}

/// Whether swapping the peer on `old_store` for one on `target_store`
/// keeps the region's rule fit at least as good.
pub fn placement_safe(
    cluster: &dyn Cluster,
    region: &RegionInfo,
    old_store: u64,
    target_store: u64,
) -> bool {
    if !cluster.get_opts().enable_placement_rules {
        return true;
    }
    let before = fit_quality(cluster, region);
    let mut moved = region.clone();
    for p in moved.region.peers.iter_mut() {
        if p.store_id == old_store {
            p.store_id = target_store;
        }
    }
    let after = fit_quality(cluster, &moved);
    after >= before
}

fn fit_quality(cluster: &dyn Cluster, region: &RegionInfo) -> (i64, i64) {
    let fit = cluster.fit_region(region);
    let satisfied = fit.rule_fits.iter().filter(|rf| rf.is_satisfied()).count() as i64;
    (satisfied, -(fit.orphan_peers.len() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterState;
    use crate::config::ScheduleConfig;
    use crate::core::{Peer, Region, StoreInfo};

    #[test]
    fn test_retry_quota() {
        let mut q = RetryQuota::new(10, 1, 2);
        assert_eq!(q.get_limit(1), 10);
        q.attenuate(1);
        assert_eq!(q.get_limit(1), 5);
        for _ in 0..10 {
            q.attenuate(1);
        }
        assert_eq!(q.get_limit(1), 1);
        q.reset_limit(1);
        assert_eq!(q.get_limit(1), 10);

        q.get_limit(7);
        q.gc(&[StoreInfo::new(1, "")]);
        assert_eq!(q.limits.len(), 1);
    }

    #[test]
    fn test_load_pred_min_max_diff() {
        let current = StoreLoad {
            byte_rate: 100.0,
            key_rate: 10.0,
            count: 5.0,
        };
        let pred = current.to_load_pred(Influence {
            byte_rate: 50.0,
            key_rate: -5.0,
            count: 0.0,
        });
        assert_eq!(pred.min().byte_rate, 100.0);
        assert_eq!(pred.max().byte_rate, 150.0);
        assert_eq!(pred.min().key_rate, 5.0);
        assert_eq!(pred.diff().byte_rate, 50.0);
    }

    #[test]
    fn test_rank_cmp_collapses_noise() {
        let cmp = st_ld_rank_cmp(st_ld_byte_rate, step_rank(100.0));
        let a = StoreLoad {
            byte_rate: 110.0,
            ..Default::default()
        };
        let b = StoreLoad {
            byte_rate: 130.0,
            ..Default::default()
        };
        let c = StoreLoad {
            byte_rate: 250.0,
            ..Default::default()
        };
        assert_eq!(cmp(&a, &b), Ordering::Equal);
        assert_eq!(cmp(&a, &c), Ordering::Less);
        let neg = neg_load_cmp(st_ld_rank_cmp(st_ld_byte_rate, step_rank(100.0)));
        assert_eq!(neg(&a, &c), Ordering::Greater);
    }

    #[test]
    fn test_tolerant_resource_leader_count() {
        let cluster = ClusterState::new(ScheduleConfig::default());
        let mut r = Region::new(1, b"", b"");
        r.peers.push(Peer::new(10, 1));
        let region = RegionInfo::new(r);
        let kind = ScheduleKind::new(ResourceKind::Leader, SchedulePolicy::Count);
        // With no configured ratio the leader tolerance is the constant.
        assert_eq!(get_tolerant_resource(&cluster, &region, kind), 5);
    }
}
