// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use crate::config::ScheduleConfig;
use crate::core::{Peer, PeerRole, RegionInfo, RegionMap, StoreInfo, StoreState};
use crate::error::{Error, Result};
use crate::labeler::RegionLabeler;
use crate::metrics::REGION_LABEL_LEVEL_GAUGE_VEC;
use crate::placement::{fit_region, RegionFit, RuleManager};
use crate::statistics::{FlowKind, HotPeerCache, HotPeerStat};
use crate::util::cache::TtlCache;

/// The narrow cluster view handed to checkers and schedulers. The
/// coordinator owns the concrete state; everything downstream sees only
/// this trait.
pub trait Cluster: Send + Sync {
    fn get_opts(&self) -> ScheduleConfig;

    fn get_region(&self, region_id: u64) -> Option<RegionInfo>;
    fn get_region_by_key(&self, key: &[u8]) -> Option<RegionInfo>;
    fn scan_regions(&self, start_key: &[u8], end_key: &[u8], limit: usize) -> Vec<RegionInfo>;
    fn adjacent_regions(&self, region: &RegionInfo)
        -> (Option<RegionInfo>, Option<RegionInfo>);
    fn get_regions_count(&self) -> usize;
    fn get_average_region_size(&self) -> i64;

    fn get_stores(&self) -> Vec<StoreInfo>;
    fn get_store(&self, store_id: u64) -> Option<StoreInfo>;
    fn get_store_region_count(&self, store_id: u64) -> i64;

    fn rand_leader_region(&self, store_id: u64) -> Option<RegionInfo>;
    fn rand_follower_region(&self, store_id: u64) -> Option<RegionInfo>;
    fn rand_pending_region(&self, store_id: u64) -> Option<RegionInfo>;
    fn rand_learner_region(&self, store_id: u64) -> Option<RegionInfo>;

    fn alloc_peer(&self, store_id: u64, role: PeerRole) -> Peer;

    fn get_rule_manager(&self) -> Arc<RuleManager>;
    fn get_region_labeler(&self) -> Arc<RegionLabeler>;

    fn fit_region(&self, region: &RegionInfo) -> RegionFit {
        let rules = self
            .get_rule_manager()
            .get_rules_for_apply_region(region.get_start_key(), region.get_end_key());
        fit_region(&self.get_stores(), region, &rules)
    }

    fn is_region_hot(&self, region: &RegionInfo) -> bool;
    fn hot_region_stats(&self, kind: FlowKind, min_degree: i32)
        -> HashMap<u64, Vec<HotPeerStat>>;

    fn is_recently_split(&self, region_id: u64) -> bool;
}

/// Store statistics carried by a store heartbeat. Flow rates are per
/// second.
#[derive(Clone, Debug, Default)]
pub struct StoreStats {
    pub store_id: u64,
    pub capacity: u64,
    pub available: u64,
    pub used_size: u64,
    pub bytes_written: f64,
    pub keys_written: f64,
    pub bytes_read: f64,
    pub keys_read: f64,
    pub is_busy: bool,
}

/// The concrete cluster state: region tree, store set, hot caches and
/// placement metadata, all derived from incoming heartbeats.
pub struct ClusterState {
    config: RwLock<ScheduleConfig>,
    regions: RwLock<RegionMap>,
    stores: RwLock<HashMap<u64, StoreInfo>>,
    rule_manager: Arc<RuleManager>,
    labeler: Arc<RegionLabeler>,
    hot_write: Mutex<HotPeerCache>,
    hot_read: Mutex<HotPeerCache>,
    split_history: Mutex<TtlCache>,
    id_alloc: AtomicU64,
    prepared: AtomicBool,
}

impl ClusterState {
    pub fn new(config: ScheduleConfig) -> ClusterState {
        let rule_manager = Arc::new(RuleManager::new(
            config.max_replicas as usize,
            &config.location_labels,
        ));
        let split_ttl = config.split_merge_interval.0;
        ClusterState {
            config: RwLock::new(config),
            regions: RwLock::new(RegionMap::new()),
            stores: RwLock::new(HashMap::new()),
            rule_manager,
            labeler: Arc::new(RegionLabeler::new()),
            hot_write: Mutex::new(HotPeerCache::new(FlowKind::Write)),
            hot_read: Mutex::new(HotPeerCache::new(FlowKind::Read)),
            split_history: Mutex::new(TtlCache::new(split_ttl)),
            id_alloc: AtomicU64::new(10_000),
            prepared: AtomicBool::new(false),
        }
    }

    pub fn set_opts(&self, config: ScheduleConfig) {
        *self.config.write().unwrap() = config;
    }

    pub fn alloc_id(&self) -> u64 {
        self.id_alloc.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.load(Ordering::SeqCst)
    }

    pub fn mark_prepared(&self) {
        self.prepared.store(true, Ordering::SeqCst);
    }

    /// Registers store metadata; called on the first heartbeat of a
    /// store and on label or address changes.
    pub fn put_store(&self, store: StoreInfo) {
        self.stores.write().unwrap().insert(store.id, store);
    }

    pub fn set_store_state(&self, store_id: u64, state: StoreState) -> Result<()> {
        let mut stores = self.stores.write().unwrap();
        match stores.get_mut(&store_id) {
            Some(s) => {
                s.state = state;
                Ok(())
            }
            None => Err(Error::StoreNotFound(store_id)),
        }
    }

    pub fn handle_store_heartbeat(&self, stats: StoreStats) -> Result<()> {
        let mut stores = self.stores.write().unwrap();
        let store = stores
            .get_mut(&stats.store_id)
            .ok_or(Error::StoreNotFound(stats.store_id))?;
        store.capacity = stats.capacity;
        store.available = stats.available;
        store.used_size = stats.used_size;
        store.bytes_written = stats.bytes_written;
        store.keys_written = stats.keys_written;
        store.bytes_read = stats.bytes_read;
        store.keys_read = stats.keys_read;
        store.is_busy = stats.is_busy;
        store.last_heartbeat = Instant::now();
        Ok(())
    }

    /// Applies one region heartbeat: epoch validation, region tree
    /// update and hot cache feeding. Stale heartbeats are rejected.
    pub fn handle_region_heartbeat(&self, region: RegionInfo) -> Result<()> {
        {
            let regions = self.regions.read().unwrap();
            if let Some(origin) = regions.get(region.get_id()) {
                if region.get_epoch().is_stale_than(origin.get_epoch()) {
                    return Err(Error::EpochStale(region.get_id()));
                }
            }
            for id in regions.overlaps(region.get_start_key(), region.get_end_key()) {
                if id == region.get_id() {
                    continue;
                }
                let other = regions.get(id).unwrap();
                if other.get_epoch().version > region.get_epoch().version {
                    return Err(Error::EpochStale(region.get_id()));
                }
            }
        }

        // A version bump means the region was just split or merged;
        // remember it so the merge checker leaves it alone for a while.
        {
            let regions = self.regions.read().unwrap();
            let bumped = match regions.get(region.get_id()) {
                Some(origin) => region.get_epoch().version > origin.get_epoch().version,
                None => region.get_epoch().version > 1,
            };
            if bumped {
                self.split_history.lock().unwrap().put(region.get_id());
            }
        }

        for cache in [&self.hot_write, &self.hot_read] {
            let mut cache = cache.lock().unwrap();
            let items = cache.check_region_flow(&region);
            for item in items {
                cache.update(item);
            }
        }

        self.regions.write().unwrap().set_region(region);
        self.prepared.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn with_hot_cache<T>(&self, kind: FlowKind, f: impl FnOnce(&mut HotPeerCache) -> T) -> T {
        let cache = match kind {
            FlowKind::Write => &self.hot_write,
            FlowKind::Read => &self.hot_read,
        };
        f(&mut cache.lock().unwrap())
    }

    /// Updates the label-level isolation statistics for a scanned batch.
    pub fn update_region_label_level_stats(&self, regions: &[RegionInfo]) {
        let cfg = self.get_opts();
        if cfg.location_labels.is_empty() {
            return;
        }
        let mut counts: HashMap<String, i64> = HashMap::new();
        for region in regions {
            let level = self.region_label_isolation_level(region, &cfg.location_labels);
            *counts.entry(level).or_insert(0) += 1;
        }
        for (level, count) in counts {
            REGION_LABEL_LEVEL_GAUGE_VEC
                .with_label_values(&[&level])
                .set(count);
        }
    }

    fn region_label_isolation_level(&self, region: &RegionInfo, labels: &[String]) -> String {
        let stores = self.stores.read().unwrap();
        let peer_stores: Vec<&StoreInfo> = region
            .get_peers()
            .iter()
            .filter_map(|p| stores.get(&p.store_id))
            .collect();
        if peer_stores.is_empty() {
            return "none".to_owned();
        }
        let mut level = "none".to_owned();
        for (i, label) in labels.iter().enumerate() {
            let prefixes: Vec<Vec<Option<&str>>> = peer_stores
                .iter()
                .map(|s| labels[..=i].iter().map(|l| s.label_value(l)).collect())
                .collect();
            let mut distinct = true;
            for a in 0..prefixes.len() {
                for b in a + 1..prefixes.len() {
                    if prefixes[a] == prefixes[b] {
                        distinct = false;
                    }
                }
            }
            if distinct {
                level = label.clone();
            } else {
                break;
            }
        }
        level
    }

    fn fill_store_counts(&self, store: &mut StoreInfo) {
        let regions = self.regions.read().unwrap();
        store.region_count = regions.store_region_count(store.id);
        store.region_size = regions.store_region_size(store.id);
        store.leader_count = regions.store_leader_count(store.id);
        store.leader_size = regions.store_leader_size(store.id);
    }
}

impl Cluster for ClusterState {
    fn get_opts(&self) -> ScheduleConfig {
        self.config.read().unwrap().clone()
    }

    fn get_region(&self, region_id: u64) -> Option<RegionInfo> {
        self.regions.read().unwrap().get(region_id).cloned()
    }

    fn get_region_by_key(&self, key: &[u8]) -> Option<RegionInfo> {
        self.regions.read().unwrap().get_by_key(key).cloned()
    }

    fn scan_regions(&self, start_key: &[u8], end_key: &[u8], limit: usize) -> Vec<RegionInfo> {
        self.regions
            .read()
            .unwrap()
            .scan(start_key, end_key, limit)
            .into_iter()
            .cloned()
            .collect()
    }

    fn adjacent_regions(
        &self,
        region: &RegionInfo,
    ) -> (Option<RegionInfo>, Option<RegionInfo>) {
        let regions = self.regions.read().unwrap();
        let (prev, next) = regions.adjacent(region);
        (prev.cloned(), next.cloned())
    }

    fn get_regions_count(&self) -> usize {
        self.regions.read().unwrap().len()
    }

    fn get_average_region_size(&self) -> i64 {
        self.regions.read().unwrap().average_region_size()
    }

    fn get_stores(&self) -> Vec<StoreInfo> {
        let stores: Vec<StoreInfo> = self
            .stores
            .read()
            .unwrap()
            .values()
            .filter(|s| !s.is_tombstone())
            .cloned()
            .collect();
        stores
            .into_iter()
            .map(|mut s| {
                self.fill_store_counts(&mut s);
                s
            })
            .collect()
    }

    fn get_store(&self, store_id: u64) -> Option<StoreInfo> {
        let mut store = self.stores.read().unwrap().get(&store_id).cloned()?;
        if store.is_tombstone() {
            return None;
        }
        self.fill_store_counts(&mut store);
        Some(store)
    }

    fn get_store_region_count(&self, store_id: u64) -> i64 {
        self.regions.read().unwrap().store_region_count(store_id)
    }

    fn rand_leader_region(&self, store_id: u64) -> Option<RegionInfo> {
        self.regions.read().unwrap().rand_leader_region(store_id).cloned()
    }

    fn rand_follower_region(&self, store_id: u64) -> Option<RegionInfo> {
        self.regions
            .read()
            .unwrap()
            .rand_follower_region(store_id)
            .cloned()
    }

    fn rand_pending_region(&self, store_id: u64) -> Option<RegionInfo> {
        self.regions
            .read()
            .unwrap()
            .rand_pending_region(store_id)
            .cloned()
    }

    fn rand_learner_region(&self, store_id: u64) -> Option<RegionInfo> {
        self.regions
            .read()
            .unwrap()
            .rand_learner_region(store_id)
            .cloned()
    }

    fn alloc_peer(&self, store_id: u64, role: PeerRole) -> Peer {
        Peer {
            id: self.alloc_id(),
            store_id,
            role,
        }
    }

    fn get_rule_manager(&self) -> Arc<RuleManager> {
        Arc::clone(&self.rule_manager)
    }

    fn get_region_labeler(&self) -> Arc<RegionLabeler> {
        Arc::clone(&self.labeler)
    }

    fn is_region_hot(&self, region: &RegionInfo) -> bool {
        let threshold = self.get_opts().hot_region_cache_hits_threshold as i32;
        self.hot_write
            .lock()
            .unwrap()
            .is_region_hot(region, threshold)
            || self.hot_read.lock().unwrap().is_region_hot(region, threshold)
    }

    fn hot_region_stats(
        &self,
        kind: FlowKind,
        min_degree: i32,
    ) -> HashMap<u64, Vec<HotPeerStat>> {
        self.with_hot_cache(kind, |c| c.region_stats(min_degree))
    }

    fn is_recently_split(&self, region_id: u64) -> bool {
        self.split_history.lock().unwrap().contains(region_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Peer, Region, RegionEpoch};

    fn region(id: u64, start: &[u8], end: &[u8], epoch: (u64, u64), stores: &[u64]) -> RegionInfo {
        let mut r = Region::new(id, start, end);
        r.epoch = RegionEpoch::new(epoch.0, epoch.1);
        for (i, &s) in stores.iter().enumerate() {
            r.peers.push(Peer::new(id * 100 + i as u64, s));
        }
        let mut info = RegionInfo::new(r);
        info.leader = Some(info.get_peers()[0]);
        info.approximate_size = 10;
        info
    }

    fn cluster_with_stores(n: u64) -> ClusterState {
        let cluster = ClusterState::new(ScheduleConfig::default());
        for id in 1..=n {
            cluster.put_store(StoreInfo::new(id, &format!("127.0.0.1:{}", 20160 + id)));
        }
        cluster
    }

    #[test]
    fn test_heartbeat_updates_counts() {
        let cluster = cluster_with_stores(3);
        cluster
            .handle_region_heartbeat(region(1, b"a", b"m", (1, 1), &[1, 2, 3]))
            .unwrap();
        cluster
            .handle_region_heartbeat(region(2, b"m", b"z", (1, 1), &[1, 2]))
            .unwrap();

        assert!(cluster.is_prepared());
        let s1 = cluster.get_store(1).unwrap();
        assert_eq!(s1.region_count, 2);
        assert_eq!(s1.leader_count, 2);
        assert_eq!(s1.region_size, 20);
        let s3 = cluster.get_store(3).unwrap();
        assert_eq!(s3.region_count, 1);
        assert_eq!(s3.leader_count, 0);
    }

    #[test]
    fn test_stale_heartbeat_rejected() {
        let cluster = cluster_with_stores(3);
        cluster
            .handle_region_heartbeat(region(1, b"a", b"z", (2, 2), &[1, 2, 3]))
            .unwrap();
        let err = cluster
            .handle_region_heartbeat(region(1, b"a", b"z", (1, 2), &[1, 2]))
            .unwrap_err();
        assert!(matches!(err, Error::EpochStale(1)));
    }

    #[test]
    fn test_split_recorded() {
        let cluster = cluster_with_stores(3);
        cluster
            .handle_region_heartbeat(region(1, b"a", b"z", (1, 1), &[1]))
            .unwrap();
        assert!(!cluster.is_recently_split(1));

        // Split bumps the version of the surviving region.
        cluster
            .handle_region_heartbeat(region(1, b"a", b"m", (1, 2), &[1]))
            .unwrap();
        assert!(cluster.is_recently_split(1));
    }

    #[test]
    fn test_store_heartbeat() {
        let cluster = cluster_with_stores(1);
        let mut stats = StoreStats::default();
        stats.store_id = 1;
        stats.capacity = 100 << 30;
        stats.available = 60 << 30;
        stats.bytes_written = 42.0;
        cluster.handle_store_heartbeat(stats).unwrap();
        let s = cluster.get_store(1).unwrap();
        assert_eq!(s.capacity, 100 << 30);
        assert_eq!(s.bytes_written, 42.0);

        let err = cluster
            .handle_store_heartbeat(StoreStats {
                store_id: 9,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::StoreNotFound(9)));
    }

    #[test]
    fn test_alloc_peer() {
        let cluster = cluster_with_stores(1);
        let p1 = cluster.alloc_peer(1, PeerRole::Learner);
        let p2 = cluster.alloc_peer(1, PeerRole::Voter);
        assert!(p2.id > p1.id);
        assert!(p1.is_learner());
    }
}
