// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::{BTreeMap, HashMap, HashSet};

use rand::Rng;

use crate::core::RegionInfo;
use crate::util::keyutil;

/// The in-memory region set: id lookup, a key-ordered tree for range
/// scans, and per-store indexes for sampling.
///
/// Regions may temporarily overlap while splits and merges settle; an
/// insert always evicts the regions its key range overlaps.
#[derive(Debug, Default)]
pub struct RegionMap {
    regions: HashMap<u64, RegionInfo>,
    tree: BTreeMap<Vec<u8>, u64>,
    store_peers: HashMap<u64, HashSet<u64>>,
    store_leaders: HashMap<u64, HashSet<u64>>,
    total_size: u64,
}

impl RegionMap {
    pub fn new() -> RegionMap {
        RegionMap::default()
    }

    pub fn get(&self, region_id: u64) -> Option<&RegionInfo> {
        self.regions.get(&region_id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn average_region_size(&self) -> i64 {
        if self.regions.is_empty() {
            return 0;
        }
        (self.total_size / self.regions.len() as u64) as i64
    }

    /// Region ids whose key range overlaps `[start_key, end_key)`.
    pub fn overlaps(&self, start_key: &[u8], end_key: &[u8]) -> Vec<u64> {
        let mut ids = Vec::new();
        // The predecessor may reach into the range.
        if let Some((_, &id)) = self.tree.range(..start_key.to_vec()).next_back() {
            let r = &self.regions[&id];
            if keyutil::cmp_end_key(r.get_end_key(), start_key) == std::cmp::Ordering::Greater {
                ids.push(id);
            }
        }
        for (key, &id) in self.tree.range(start_key.to_vec()..) {
            if !end_key.is_empty() && key.as_slice() >= end_key {
                break;
            }
            ids.push(id);
        }
        ids
    }

    /// Inserts or refreshes a region, evicting every region it overlaps.
    pub fn set_region(&mut self, region: RegionInfo) {
        if let Some(old) = self.regions.get(&region.get_id()) {
            let start = old.get_start_key().to_vec();
            self.unlink(region.get_id(), &start);
        }
        for id in self.overlaps(region.get_start_key(), region.get_end_key()) {
            let start = self.regions[&id].get_start_key().to_vec();
            self.unlink(id, &start);
        }
        self.link(region);
    }

    pub fn remove(&mut self, region_id: u64) {
        if let Some(r) = self.regions.get(&region_id) {
            let start = r.get_start_key().to_vec();
            self.unlink(region_id, &start);
        }
    }

    fn link(&mut self, region: RegionInfo) {
        let id = region.get_id();
        self.tree.insert(region.get_start_key().to_vec(), id);
        for peer in region.get_peers() {
            self.store_peers.entry(peer.store_id).or_default().insert(id);
        }
        if let Some(leader) = region.get_leader() {
            self.store_leaders
                .entry(leader.store_id)
                .or_default()
                .insert(id);
        }
        self.total_size += region.approximate_size;
        self.regions.insert(id, region);
    }

    fn unlink(&mut self, region_id: u64, start_key: &[u8]) {
        if let Some(region) = self.regions.remove(&region_id) {
            if self.tree.get(start_key) == Some(&region_id) {
                self.tree.remove(start_key);
            }
            for peer in region.get_peers() {
                if let Some(set) = self.store_peers.get_mut(&peer.store_id) {
                    set.remove(&region_id);
                }
            }
            if let Some(leader) = region.get_leader() {
                if let Some(set) = self.store_leaders.get_mut(&leader.store_id) {
                    set.remove(&region_id);
                }
            }
            self.total_size -= region.approximate_size;
        }
    }

    /// Scans regions covering `[start_key, end_key)` in key order, up to
    /// `limit`. An empty end key means unbounded.
    pub fn scan(&self, start_key: &[u8], end_key: &[u8], limit: usize) -> Vec<&RegionInfo> {
        let mut out = Vec::new();
        if let Some((_, &id)) = self.tree.range(..start_key.to_vec()).next_back() {
            let r = &self.regions[&id];
            if keyutil::cmp_end_key(r.get_end_key(), start_key) == std::cmp::Ordering::Greater {
                out.push(r);
            }
        }
        for (key, &id) in self.tree.range(start_key.to_vec()..) {
            if out.len() >= limit {
                break;
            }
            if !end_key.is_empty() && key.as_slice() >= end_key {
                break;
            }
            out.push(&self.regions[&id]);
        }
        out
    }

    pub fn get_by_key(&self, key: &[u8]) -> Option<&RegionInfo> {
        let (_, &id) = self.tree.range(..=key.to_vec()).next_back()?;
        let r = &self.regions[&id];
        if keyutil::key_in_range(key, r.get_start_key(), r.get_end_key()) {
            Some(r)
        } else {
            None
        }
    }

    /// The regions immediately before and after `region` in key order.
    pub fn adjacent(&self, region: &RegionInfo) -> (Option<&RegionInfo>, Option<&RegionInfo>) {
        let prev = self
            .tree
            .range(..region.get_start_key().to_vec())
            .next_back()
            .map(|(_, &id)| &self.regions[&id])
            .filter(|r| {
                keyutil::cmp_end_key(r.get_end_key(), region.get_start_key())
                    == std::cmp::Ordering::Equal
            });
        let next = if region.get_end_key().is_empty() {
            None
        } else {
            self.tree
                .get(region.get_end_key())
                .map(|id| &self.regions[id])
                .filter(|r| r.get_id() != region.get_id())
        };
        (prev, next)
    }

    pub fn rand_leader_region(&self, store_id: u64) -> Option<&RegionInfo> {
        self.rand_from(self.store_leaders.get(&store_id), |_| true)
    }

    pub fn rand_follower_region(&self, store_id: u64) -> Option<&RegionInfo> {
        self.rand_from(self.store_peers.get(&store_id), |r| {
            r.leader_store_id() != 0 && r.leader_store_id() != store_id
        })
    }

    pub fn rand_pending_region(&self, store_id: u64) -> Option<&RegionInfo> {
        self.rand_from(self.store_peers.get(&store_id), |r| {
            r.has_pending_peer_on_store(store_id)
        })
    }

    pub fn rand_learner_region(&self, store_id: u64) -> Option<&RegionInfo> {
        self.rand_from(self.store_peers.get(&store_id), |r| {
            r.get_store_learner(store_id).is_some()
        })
    }

    fn rand_from<F>(&self, ids: Option<&HashSet<u64>>, pred: F) -> Option<&RegionInfo>
    where
        F: Fn(&RegionInfo) -> bool,
    {
        let ids = ids?;
        let candidates: Vec<&RegionInfo> = ids
            .iter()
            .filter_map(|id| self.regions.get(id))
            .filter(|r| pred(r))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let i = rand::thread_rng().gen_range(0..candidates.len());
        Some(candidates[i])
    }

    pub fn store_region_count(&self, store_id: u64) -> i64 {
        self.store_peers.get(&store_id).map_or(0, |s| s.len() as i64)
    }

    pub fn store_leader_count(&self, store_id: u64) -> i64 {
        self.store_leaders
            .get(&store_id)
            .map_or(0, |s| s.len() as i64)
    }

    pub fn store_region_size(&self, store_id: u64) -> i64 {
        self.store_peers.get(&store_id).map_or(0, |set| {
            set.iter()
                .filter_map(|id| self.regions.get(id))
                .map(|r| r.approximate_size as i64)
                .sum()
        })
    }

    pub fn store_leader_size(&self, store_id: u64) -> i64 {
        self.store_leaders.get(&store_id).map_or(0, |set| {
            set.iter()
                .filter_map(|id| self.regions.get(id))
                .map(|r| r.approximate_size as i64)
                .sum()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Peer, Region, RegionInfo};

    fn region(id: u64, start: &[u8], end: &[u8], stores: &[u64], leader: u64) -> RegionInfo {
        let mut r = Region::new(id, start, end);
        for (i, &s) in stores.iter().enumerate() {
            r.peers.push(Peer::new(id * 100 + i as u64, s));
        }
        let mut info = RegionInfo::new(r);
        info.leader = info.get_store_peer(leader).cloned();
        info.approximate_size = 10;
        info
    }

    #[test]
    fn test_scan_order_and_bounds() {
        let mut m = RegionMap::new();
        m.set_region(region(1, b"", b"b", &[1], 1));
        m.set_region(region(2, b"b", b"d", &[1], 1));
        m.set_region(region(3, b"d", b"", &[2], 2));

        let all = m.scan(b"", b"", 10);
        assert_eq!(all.iter().map(|r| r.get_id()).collect::<Vec<_>>(), vec![1, 2, 3]);

        // A scan starting inside region 2 includes it.
        let part = m.scan(b"c", b"", 10);
        assert_eq!(part.iter().map(|r| r.get_id()).collect::<Vec<_>>(), vec![2, 3]);

        let bounded = m.scan(b"", b"c", 10);
        assert_eq!(bounded.iter().map(|r| r.get_id()).collect::<Vec<_>>(), vec![1, 2]);

        let limited = m.scan(b"", b"", 2);
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_split_replaces_parent() {
        let mut m = RegionMap::new();
        m.set_region(region(1, b"a", b"z", &[1, 2], 1));
        assert_eq!(m.len(), 1);

        // Split: two children replace the parent.
        m.set_region(region(2, b"a", b"m", &[1, 2], 1));
        assert!(m.get(1).is_none());
        m.set_region(region(3, b"m", b"z", &[1, 2], 2));
        assert_eq!(m.len(), 2);
        assert_eq!(m.store_region_count(1), 2);
        assert_eq!(m.store_leader_count(2), 1);
    }

    #[test]
    fn test_adjacent() {
        let mut m = RegionMap::new();
        m.set_region(region(1, b"a", b"b", &[1], 1));
        m.set_region(region(2, b"b", b"c", &[1], 1));
        m.set_region(region(3, b"x", b"z", &[1], 1));

        let r2 = m.get(2).unwrap().clone();
        let (prev, next) = m.adjacent(&r2);
        assert_eq!(prev.unwrap().get_id(), 1);
        // Region 3 is not key-adjacent to region 2.
        assert!(next.is_none());
    }

    #[test]
    fn test_get_by_key() {
        let mut m = RegionMap::new();
        m.set_region(region(1, b"a", b"m", &[1], 1));
        m.set_region(region(2, b"m", b"", &[1], 1));
        assert_eq!(m.get_by_key(b"b").unwrap().get_id(), 1);
        assert_eq!(m.get_by_key(b"zz").unwrap().get_id(), 2);
        assert!(m.get_by_key(b"A").is_none());
    }

    #[test]
    fn test_rand_selection() {
        let mut m = RegionMap::new();
        m.set_region(region(1, b"a", b"b", &[1, 2], 1));
        assert_eq!(m.rand_leader_region(1).unwrap().get_id(), 1);
        assert!(m.rand_leader_region(2).is_none());
        assert_eq!(m.rand_follower_region(2).unwrap().get_id(), 1);
        assert!(m.rand_pending_region(1).is_none());
    }
}
