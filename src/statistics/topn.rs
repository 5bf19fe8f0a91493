// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::statistics::{HotPeerStat, DIM_LEN};

/// Hot peers of one store, keyed by region id, with a TTL on stale
/// entries. The boundary of the logical top-N per dimension feeds the
/// store's dynamic hot threshold.
#[derive(Debug)]
pub struct TopN {
    n: usize,
    ttl: Duration,
    items: HashMap<u64, (HotPeerStat, Instant)>,
}

impl TopN {
    pub fn new(n: usize, ttl: Duration) -> TopN {
        TopN {
            n,
            ttl,
            items: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, region_id: u64) -> Option<&HotPeerStat> {
        self.items.get(&region_id).map(|(stat, _)| stat)
    }

    pub fn put(&mut self, stat: HotPeerStat) {
        self.items.insert(stat.id(), (stat, Instant::now()));
    }

    pub fn remove(&mut self, region_id: u64) {
        self.items.remove(&region_id);
    }

    pub fn get_all(&self) -> Vec<&HotPeerStat> {
        self.items.values().map(|(stat, _)| stat).collect()
    }

    /// The smallest rate inside the top `n` items of `dim`, or `None`
    /// while the list is shorter than `n`.
    pub fn top_n_min_rate(&self, dim: usize) -> Option<f64> {
        debug_assert!(dim < DIM_LEN);
        if self.items.len() < self.n {
            return None;
        }
        let mut rates: Vec<f64> = self.items.values().map(|(s, _)| s.rate(dim)).collect();
        rates.sort_by(|a, b| b.partial_cmp(a).unwrap());
        Some(rates[self.n - 1])
    }

    /// Drops entries not refreshed within the TTL; returns their ids.
    pub fn remove_expired(&mut self) -> Vec<u64> {
        let ttl = self.ttl;
        let expired: Vec<u64> = self
            .items
            .iter()
            .filter(|(_, (_, t))| t.elapsed() >= ttl)
            .map(|(&id, _)| id)
            .collect();
        for id in &expired {
            self.items.remove(id);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::{FlowKind, HotStatSource, BYTE_DIM, KEY_DIM};

    fn stat(region_id: u64, byte_rate: f64, key_rate: f64) -> HotPeerStat {
        HotPeerStat {
            store_id: 1,
            region_id,
            kind: FlowKind::Write,
            hot_degree: 1,
            anti_count: 2,
            byte_rate,
            key_rate,
            rolling_byte_rate: None,
            rolling_key_rate: None,
            last_update_time: Instant::now(),
            need_delete: false,
            is_leader: false,
            is_new: true,
            just_transfer_leader: false,
            interval: 60,
            thresholds: [0.0, 0.0],
            peers: vec![],
            last_transfer_leader_time: None,
            source: HotStatSource::Direct,
            allow_adopt: false,
        }
    }

    #[test]
    fn test_put_get_remove() {
        let mut t = TopN::new(2, Duration::from_secs(180));
        t.put(stat(1, 100.0, 1.0));
        t.put(stat(1, 200.0, 2.0));
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(1).unwrap().byte_rate, 200.0);
        t.remove(1);
        assert!(t.get(1).is_none());
    }

    #[test]
    fn test_top_n_min_under_capacity() {
        let mut t = TopN::new(3, Duration::from_secs(180));
        t.put(stat(1, 100.0, 9.0));
        t.put(stat(2, 50.0, 7.0));
        // Fewer than n items: no boundary yet.
        assert!(t.top_n_min_rate(BYTE_DIM).is_none());

        t.put(stat(3, 75.0, 8.0));
        assert_eq!(t.top_n_min_rate(BYTE_DIM), Some(50.0));
        assert_eq!(t.top_n_min_rate(KEY_DIM), Some(7.0));
    }

    #[test]
    fn test_ttl_eviction() {
        let mut t = TopN::new(1, Duration::from_secs(0));
        t.put(stat(1, 1.0, 1.0));
        let gone = t.remove_expired();
        assert_eq!(gone, vec![1]);
        assert!(t.is_empty());
    }
}
