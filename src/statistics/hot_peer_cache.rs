// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::core::RegionInfo;
use crate::metrics::{HOT_CACHE_GAUGE_VEC, REGION_HEARTBEAT_INTERVAL_HISTOGRAM};
use crate::statistics::{
    DimStat, FlowKind, HotPeerStat, HotStatSource, TopN, BYTE_DIM, DIM_LEN,
    HOT_REGION_ANTI_COUNT, HOT_REGION_REPORT_MIN_INTERVAL, HOT_THRESHOLD_RATIO, KEY_DIM,
    REGION_HEARTBEAT_REPORT_INTERVAL, TOP_N,
};

const TOP_N_TTL: Duration = Duration::from_secs(3 * REGION_HEARTBEAT_REPORT_INTERVAL);

/// Per-flow-kind cache of hot peers. Write flow tracks every peer of a
/// region; read flow only the leader.
#[derive(Debug)]
pub struct HotPeerCache {
    kind: FlowKind,
    peers_of_store: HashMap<u64, TopN>,
    stores_of_region: HashMap<u64, HashSet<u64>>,
    /// Drop non-expired reports arriving faster than the minimum
    /// interval. Disabled in tests that replay dense heartbeats.
    denoising: bool,
}

impl HotPeerCache {
    pub fn new(kind: FlowKind) -> HotPeerCache {
        HotPeerCache {
            kind,
            peers_of_store: HashMap::new(),
            stores_of_region: HashMap::new(),
            denoising: true,
        }
    }

    pub fn set_denoising(&mut self, denoising: bool) {
        self.denoising = denoising;
    }

    /// Hot items per store with at least `min_hot_degree`.
    pub fn region_stats(&self, min_hot_degree: i32) -> HashMap<u64, Vec<HotPeerStat>> {
        self.peers_of_store
            .iter()
            .map(|(&store_id, peers)| {
                let stats = peers
                    .get_all()
                    .into_iter()
                    .filter(|p| p.hot_degree >= min_hot_degree)
                    .map(|p| p.snapshot())
                    .collect();
                (store_id, stats)
            })
            .collect()
    }

    /// Applies one item produced by `check_region_flow`.
    pub fn update(&mut self, item: HotPeerStat) {
        if item.is_need_delete() {
            if let Some(peers) = self.peers_of_store.get_mut(&item.store_id) {
                peers.remove(item.region_id);
            }
            if let Some(stores) = self.stores_of_region.get_mut(&item.region_id) {
                stores.remove(&item.store_id);
            }
            debug!("region heartbeat delete from cache";
                "type" => %self.kind,
                "region-id" => item.region_id,
                "store-id" => item.store_id,
            );
        } else {
            let peers = self
                .peers_of_store
                .entry(item.store_id)
                .or_insert_with(|| TopN::new(TOP_N, TOP_N_TTL));
            self.stores_of_region
                .entry(item.region_id)
                .or_default()
                .insert(item.store_id);
            debug!("region heartbeat update";
                "type" => %self.kind,
                "region-id" => item.region_id,
                "store-id" => item.store_id,
                "hot-degree" => item.hot_degree,
                "anti-count" => item.anti_count,
            );
            peers.put(item);
        }
    }

    /// Checks the flow of one region heartbeat, returning the updated
    /// items to feed back through `update`.
    pub fn check_region_flow(&mut self, region: &RegionInfo) -> Vec<HotPeerStat> {
        let bytes = self.region_bytes(region) as f64;
        let keys = self.region_keys(region) as f64;

        let interval = region.interval.secs();
        REGION_HEARTBEAT_INTERVAL_HISTOGRAM.observe(interval as f64);

        let (byte_rate, key_rate) = if interval == 0 {
            (0.0, 0.0)
        } else {
            (bytes / interval as f64, keys / interval as f64)
        };

        let peers: Vec<u64> = region.get_peers().iter().map(|p| p.store_id).collect();
        let store_ids = self.all_store_ids(region);
        let just_transfer_leader = self.just_transfer_leader(region);

        let mut tmp_item: Option<HotPeerStat> = None;
        let mut ret = Vec::new();
        for &store_id in &store_ids {
            let is_expired = self.is_region_expired(region, store_id);
            let mut old_item = self.old_hot_peer_stat(region.get_id(), store_id).cloned();
            if is_expired && old_item.is_some() {
                // The peer may have moved; keep the stats for the new
                // store to inherit.
                tmp_item = old_item.clone();
            }

            if !is_expired && self.denoising && interval < HOT_REGION_REPORT_MIN_INTERVAL {
                continue;
            }

            let thresholds = self.calc_hot_thresholds(store_id);

            let mut new_item = HotPeerStat {
                store_id,
                region_id: region.get_id(),
                kind: self.kind,
                hot_degree: 0,
                anti_count: 0,
                byte_rate,
                key_rate,
                rolling_byte_rate: None,
                rolling_key_rate: None,
                last_update_time: Instant::now(),
                need_delete: is_expired,
                is_leader: region.leader_store_id() == store_id,
                is_new: false,
                just_transfer_leader,
                interval,
                thresholds,
                peers: peers.clone(),
                last_transfer_leader_time: None,
                source: HotStatSource::Direct,
                allow_adopt: false,
            };

            if old_item.is_none() {
                let inheritable = tmp_item.as_ref().map_or(false, |t| t.anti_count > 0);
                if inheritable {
                    new_item.source = HotStatSource::Inherit;
                    old_item = tmp_item.take();
                } else {
                    // A brand new peer after adding a replica may adopt
                    // a sibling's history.
                    for &sibling in &store_ids {
                        if let Some(o) = self.old_hot_peer_stat(region.get_id(), sibling) {
                            if o.allow_adopt {
                                new_item.source = HotStatSource::Adopt;
                                old_item = Some(o.clone());
                                break;
                            }
                        }
                    }
                }
            }

            if let Some(item) = self.update_hot_peer_stat(
                new_item,
                old_item,
                bytes,
                keys,
                Duration::from_secs(interval),
            ) {
                ret.push(item);
            }
        }
        ret
    }

    pub fn is_region_hot(&self, region: &RegionInfo, hot_degree: i32) -> bool {
        match self.kind {
            FlowKind::Write => region
                .get_peers()
                .iter()
                .any(|p| self.is_peer_hot(region.get_id(), p.store_id, hot_degree)),
            FlowKind::Read => {
                self.is_peer_hot(region.get_id(), region.leader_store_id(), hot_degree)
            }
        }
    }

    pub fn collect_metrics(&self, name: &str) {
        for (&store_id, peers) in &self.peers_of_store {
            let store = store_id.to_string();
            let thresholds = self.calc_hot_thresholds(store_id);
            HOT_CACHE_GAUGE_VEC
                .with_label_values(&["total_length", &store, name])
                .set(peers.len() as f64);
            HOT_CACHE_GAUGE_VEC
                .with_label_values(&["byte-rate-threshold", &store, name])
                .set(thresholds[BYTE_DIM]);
            HOT_CACHE_GAUGE_VEC
                .with_label_values(&["key-rate-threshold", &store, name])
                .set(thresholds[KEY_DIM]);
        }
    }

    /// Drops entries whose TTL lapsed without a refresh.
    pub fn maintain(&mut self) {
        for (&store_id, peers) in self.peers_of_store.iter_mut() {
            for region_id in peers.remove_expired() {
                if let Some(stores) = self.stores_of_region.get_mut(&region_id) {
                    stores.remove(&store_id);
                }
            }
        }
    }

    pub fn calc_hot_thresholds(&self, store_id: u64) -> [f64; DIM_LEN] {
        let min_thresholds = self.kind.min_hot_thresholds();
        let topn = match self.peers_of_store.get(&store_id) {
            Some(t) if t.len() >= TOP_N => t,
            _ => return min_thresholds,
        };
        let mut ret = min_thresholds;
        for dim in 0..DIM_LEN {
            if let Some(min_rate) = topn.top_n_min_rate(dim) {
                ret[dim] = (min_rate * HOT_THRESHOLD_RATIO).max(min_thresholds[dim]);
            }
        }
        ret
    }

    fn region_bytes(&self, region: &RegionInfo) -> u64 {
        match self.kind {
            FlowKind::Write => region.bytes_written,
            FlowKind::Read => region.bytes_read,
        }
    }

    fn region_keys(&self, region: &RegionInfo) -> u64 {
        match self.kind {
            FlowKind::Write => region.keys_written,
            FlowKind::Read => region.keys_read,
        }
    }

    fn old_hot_peer_stat(&self, region_id: u64, store_id: u64) -> Option<&HotPeerStat> {
        self.peers_of_store.get(&store_id)?.get(region_id)
    }

    fn is_peer_hot(&self, region_id: u64, store_id: u64, hot_degree: i32) -> bool {
        self.old_hot_peer_stat(region_id, store_id)
            .map_or(false, |s| s.hot_degree >= hot_degree)
    }

    fn is_region_expired(&self, region: &RegionInfo, store_id: u64) -> bool {
        match self.kind {
            FlowKind::Write => region.get_store_peer(store_id).is_none(),
            FlowKind::Read => region.leader_store_id() != store_id,
        }
    }

    /// Store ids of both the cached (old) and reported (new) peers, with
    /// the old ones first so cache hits survive a moved peer.
    fn all_store_ids(&self, region: &RegionInfo) -> Vec<u64> {
        let mut seen = HashSet::new();
        let mut ret = Vec::with_capacity(region.get_peers().len());
        if let Some(ids) = self.stores_of_region.get(&region.get_id()) {
            for &store_id in ids {
                if seen.insert(store_id) {
                    ret.push(store_id);
                }
            }
        }
        for peer in region.get_peers() {
            if self.kind == FlowKind::Read && peer.store_id != region.leader_store_id() {
                continue;
            }
            if seen.insert(peer.store_id) {
                ret.push(peer.store_id);
            }
        }
        ret
    }

    /// The peer was part of the region but is no longer cached on this
    /// store.
    fn is_old_cold_peer(&self, old_item: &HotPeerStat, store_id: u64) -> bool {
        let is_old_peer = old_item.peers.iter().any(|&id| id == store_id);
        let in_cache = self
            .stores_of_region
            .get(&old_item.region_id)
            .map_or(false, |ids| ids.contains(&store_id));
        is_old_peer && !in_cache
    }

    fn just_transfer_leader(&self, region: &RegionInfo) -> bool {
        if let Some(ids) = self.stores_of_region.get(&region.get_id()) {
            for &store_id in ids {
                if let Some(old_item) = self.old_hot_peer_stat(region.get_id(), store_id) {
                    if old_item.is_leader {
                        return old_item.store_id != region.leader_store_id();
                    }
                }
            }
        }
        false
    }

    fn update_hot_peer_stat(
        &self,
        mut new_item: HotPeerStat,
        old_item: Option<HotPeerStat>,
        bytes: f64,
        keys: f64,
        interval: Duration,
    ) -> Option<HotPeerStat> {
        if new_item.need_delete {
            return Some(new_item);
        }

        let old_item = match old_item {
            Some(o) => o,
            None => {
                if interval.as_secs() == 0 {
                    return None;
                }
                let secs = interval.as_secs_f64();
                let is_hot = bytes / secs >= new_item.thresholds[BYTE_DIM]
                    || keys / secs >= new_item.thresholds[KEY_DIM];
                if !is_hot {
                    return None;
                }
                if interval.as_secs() >= REGION_HEARTBEAT_REPORT_INTERVAL {
                    new_item.hot_degree = 1;
                    new_item.anti_count = HOT_REGION_ANTI_COUNT;
                    new_item.allow_adopt = true;
                }
                new_item.is_new = true;
                new_item.rolling_byte_rate = Some(DimStat::new(BYTE_DIM));
                new_item.rolling_key_rate = Some(DimStat::new(KEY_DIM));
                new_item.add_flow(bytes, keys, interval);
                if new_item.rolling_full() {
                    new_item.clear_last_average();
                }
                return Some(new_item);
            }
        };

        if new_item.source == HotStatSource::Adopt {
            new_item.rolling_byte_rate = old_item.rolling_byte_rate.clone();
            new_item.rolling_key_rate = old_item.rolling_key_rate.clone();
            new_item.allow_adopt = false;
        } else {
            new_item.rolling_byte_rate = old_item.rolling_byte_rate.clone();
            new_item.rolling_key_rate = old_item.rolling_key_rate.clone();
            new_item.allow_adopt = old_item.allow_adopt;
        }

        if new_item.just_transfer_leader {
            // The first report after a leader transfer was accumulated by
            // the previous leader; keep degree and anti count untouched.
            new_item.hot_degree = old_item.hot_degree;
            new_item.anti_count = old_item.anti_count;
            new_item.last_transfer_leader_time = Some(Instant::now());
            return Some(new_item);
        }

        new_item.last_transfer_leader_time = old_item.last_transfer_leader_time;
        new_item.add_flow(bytes, keys, interval);

        if !new_item.rolling_full() {
            new_item.hot_degree = old_item.hot_degree;
            new_item.anti_count = old_item.anti_count;
        } else {
            if self.is_old_cold_peer(&old_item, new_item.store_id) {
                if new_item.is_full_and_hot() {
                    new_item.hot_degree = 1;
                    new_item.anti_count = HOT_REGION_ANTI_COUNT;
                    new_item.allow_adopt = true;
                } else {
                    new_item.need_delete = true;
                }
            } else if new_item.is_full_and_hot() {
                new_item.hot_degree = old_item.hot_degree + 1;
                new_item.anti_count = HOT_REGION_ANTI_COUNT;
                new_item.allow_adopt = true;
            } else {
                new_item.hot_degree = old_item.hot_degree - 1;
                new_item.anti_count = old_item.anti_count - 1;
                if new_item.anti_count <= 0 {
                    new_item.need_delete = true;
                } else {
                    new_item.allow_adopt = true;
                }
            }
            new_item.clear_last_average();
        }
        Some(new_item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Peer, Region, RegionInfo, ReportInterval};

    fn hot_region(id: u64, stores: &[u64], leader: u64, bytes: u64, keys: u64) -> RegionInfo {
        let mut region = Region::new(id, b"a", b"z");
        for (i, &s) in stores.iter().enumerate() {
            region.peers.push(Peer::new(id * 100 + i as u64, s));
        }
        let mut info = RegionInfo::new(region);
        info.leader = info.get_store_peer(leader).cloned();
        info.bytes_written = bytes * REGION_HEARTBEAT_REPORT_INTERVAL;
        info.keys_written = keys * REGION_HEARTBEAT_REPORT_INTERVAL;
        info.interval = ReportInterval::new(0, REGION_HEARTBEAT_REPORT_INTERVAL);
        info
    }

    fn tick(cache: &mut HotPeerCache, region: &RegionInfo) -> Vec<HotPeerStat> {
        let items = cache.check_region_flow(region);
        for item in items.clone() {
            cache.update(item);
        }
        items
    }

    #[test]
    fn test_hot_degree_rises_then_evicts() {
        let mut cache = HotPeerCache::new(FlowKind::Write);
        let region = hot_region(1, &[1, 2, 3], 1, 10 * 1024, 1000);

        for round in 1..=4 {
            tick(&mut cache, &region);
            for &store in &[1, 2, 3] {
                let stat = cache.old_hot_peer_stat(1, store).unwrap();
                assert_eq!(stat.hot_degree, round, "round {} store {}", round, store);
                assert_eq!(stat.anti_count, HOT_REGION_ANTI_COUNT);
            }
        }

        // Cold reports: degree falls, anti count drains, then eviction.
        let cold = hot_region(1, &[1, 2, 3], 1, 0, 0);
        tick(&mut cache, &cold);
        let stat = cache.old_hot_peer_stat(1, 1).unwrap();
        assert_eq!(stat.hot_degree, 3);
        assert_eq!(stat.anti_count, 1);

        tick(&mut cache, &cold);
        assert!(cache.old_hot_peer_stat(1, 1).is_none());
    }

    #[test]
    fn test_read_flow_only_tracks_leader() {
        let mut cache = HotPeerCache::new(FlowKind::Read);
        let mut region = hot_region(1, &[1, 2, 3], 1, 0, 0);
        region.bytes_read = 100 * 1024 * REGION_HEARTBEAT_REPORT_INTERVAL;
        region.keys_read = 1000 * REGION_HEARTBEAT_REPORT_INTERVAL;
        tick(&mut cache, &region);
        assert!(cache.old_hot_peer_stat(1, 1).is_some());
        assert!(cache.old_hot_peer_stat(1, 2).is_none());
        assert!(cache.old_hot_peer_stat(1, 3).is_none());
    }

    #[test]
    fn test_transfer_leader_keeps_degree() {
        let mut cache = HotPeerCache::new(FlowKind::Read);
        let mut region = hot_region(1, &[1, 2], 1, 0, 0);
        region.bytes_read = 100 * 1024 * REGION_HEARTBEAT_REPORT_INTERVAL;
        for _ in 0..3 {
            tick(&mut cache, &region);
        }
        let degree = cache.old_hot_peer_stat(1, 1).unwrap().hot_degree;
        assert_eq!(degree, 3);

        // Leader moves to store 2; the old entry expires and the new one
        // inherits degree and anti count.
        let mut moved = hot_region(1, &[1, 2], 2, 0, 0);
        moved.bytes_read = 100 * 1024 * REGION_HEARTBEAT_REPORT_INTERVAL;
        tick(&mut cache, &moved);
        assert!(cache.old_hot_peer_stat(1, 1).is_none());
        let stat = cache.old_hot_peer_stat(1, 2).unwrap();
        assert_eq!(stat.hot_degree, degree);
        assert!(stat.last_transfer_leader_time.is_some());
    }

    #[test]
    fn test_cold_region_not_cached() {
        let mut cache = HotPeerCache::new(FlowKind::Write);
        let region = hot_region(1, &[1, 2, 3], 1, 0, 0);
        let items = tick(&mut cache, &region);
        assert!(items.is_empty());
        assert!(cache.old_hot_peer_stat(1, 1).is_none());
    }

    #[test]
    fn test_denoising_skips_fast_reports() {
        let mut cache = HotPeerCache::new(FlowKind::Write);
        let mut region = hot_region(1, &[1], 1, 10 * 1024, 100);
        region.interval = ReportInterval::new(0, 1);
        let items = cache.check_region_flow(&region);
        assert!(items.is_empty());

        cache.set_denoising(false);
        let items = cache.check_region_flow(&region);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_thresholds_default_when_under_capacity() {
        let cache = HotPeerCache::new(FlowKind::Write);
        assert_eq!(
            cache.calc_hot_thresholds(1),
            FlowKind::Write.min_hot_thresholds()
        );
    }
}
