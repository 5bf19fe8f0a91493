// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::HashSet;

use crate::cluster::Cluster;
use crate::core::{RegionInfo, StoreInfo};
use crate::filter::{Filter, StoreStateFilter};

/// Picks stores for adding, fixing, improving and removing replicas,
/// scored by location isolation against the peers that stay.
pub struct ReplicaStrategy<'a> {
    pub checker_name: &'static str,
    pub cluster: &'a dyn Cluster,
    pub location_labels: Vec<String>,
    pub isolation_level: String,
    pub region: &'a RegionInfo,
    pub extra_filters: Vec<Box<dyn Filter>>,
}

impl<'a> ReplicaStrategy<'a> {
    /// Selects the store to place a new peer on. The second value is
    /// true when a candidate was rejected only by a temporary state, in
    /// which case the region is worth re-checking soon.
    pub fn select_store_to_add(&self, coexisting: &[StoreInfo]) -> (u64, bool) {
        self.select(coexisting, None)
    }

    /// Selects the store to replace the peer on `old_store`.
    pub fn select_store_to_fix(&self, coexisting: &[StoreInfo], old_store: u64) -> (u64, bool) {
        let remaining: Vec<StoreInfo> = coexisting
            .iter()
            .filter(|s| s.id != old_store)
            .cloned()
            .collect();
        self.select(&remaining, None)
    }

    /// Selects a store strictly better isolated than `old_store`.
    pub fn select_store_to_improve(
        &self,
        coexisting: &[StoreInfo],
        old_store: u64,
    ) -> (u64, bool) {
        let remaining: Vec<StoreInfo> = coexisting
            .iter()
            .filter(|s| s.id != old_store)
            .cloned()
            .collect();
        let old_score = coexisting
            .iter()
            .find(|s| s.id == old_store)
            .map(|s| s.distinct_score(&self.location_labels, &remaining))
            .unwrap_or(0.0);
        self.select(&remaining, Some(old_score))
    }

    /// The existing peer store whose removal hurts isolation least.
    pub fn select_store_to_remove(&self, coexisting: &[StoreInfo]) -> u64 {
        let mut best: Option<(f64, i64, u64)> = None;
        for store in coexisting {
            let others: Vec<StoreInfo> = coexisting
                .iter()
                .filter(|s| s.id != store.id)
                .cloned()
                .collect();
            let score = store.distinct_score(&self.location_labels, &others);
            // Lowest isolation first; break ties on the busiest store.
            let key = (score, -store.region_count, store.id);
            if best.map_or(true, |b| key < (b.0, b.1, b.2)) {
                best = Some(key);
            }
        }
        best.map_or(0, |(_, _, id)| id)
    }

    fn select(&self, coexisting: &[StoreInfo], min_score: Option<f64>) -> (u64, bool) {
        let cfg = self.cluster.get_opts();
        let state_filter = StoreStateFilter {
            action_scope: self.checker_name.to_owned(),
            transfer_leader: false,
            move_region: true,
        };
        let excluded: HashSet<u64> = self.region.get_store_ids();

        let mut best: Option<(f64, i64, u64)> = None;
        let mut rejected_by_temp_state = false;
        for store in self.cluster.get_stores() {
            if excluded.contains(&store.id) {
                continue;
            }
            if !self
                .extra_filters
                .iter()
                .all(|f| f.target(&cfg, &store))
            {
                continue;
            }
            if !state_filter.target(&cfg, &store) {
                if state_filter.rejected_by_temp_state(&cfg, &store) {
                    rejected_by_temp_state = true;
                }
                continue;
            }
            if !self.isolation_satisfied(&store, coexisting) {
                continue;
            }
            let score = store.distinct_score(&self.location_labels, coexisting);
            if let Some(min) = min_score {
                if score <= min {
                    continue;
                }
            }
            // Highest isolation wins; ties go to the emptiest store.
            let key = (score, -store.region_count, store.id);
            let better = match best {
                Some((bs, brc, bid)) => {
                    (key.0, key.1, std::cmp::Reverse(key.2))
                        > (bs, brc, std::cmp::Reverse(bid))
                }
                None => true,
            };
            if better {
                best = Some(key);
            }
        }
        match best {
            Some((_, _, id)) => (id, false),
            None => (0, rejected_by_temp_state),
        }
    }

    /// When an isolation level is demanded, the candidate must differ
    /// from every coexisting store at that level or above.
    fn isolation_satisfied(&self, candidate: &StoreInfo, coexisting: &[StoreInfo]) -> bool {
        if self.isolation_level.is_empty() {
            return true;
        }
        let level = match self
            .location_labels
            .iter()
            .position(|l| *l == self.isolation_level)
        {
            Some(i) => i,
            None => return true,
        };
        for other in coexisting {
            let mut isolated = false;
            for label in &self.location_labels[..=level] {
                if candidate.label_value(label) != other.label_value(label) {
                    isolated = true;
                    break;
                }
            }
            if !isolated {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterState;
    use crate::config::ScheduleConfig;
    use crate::core::{Peer, Region, StoreLabel};

    fn labeled_store(id: u64, zone: &str, host: &str) -> StoreInfo {
        let mut s = StoreInfo::new(id, "");
        s.labels = vec![StoreLabel::new("zone", zone), StoreLabel::new("host", host)];
        s
    }

    fn region_on(stores: &[u64]) -> RegionInfo {
        let mut r = Region::new(1, b"", b"");
        for (i, &s) in stores.iter().enumerate() {
            r.peers.push(Peer::new(10 + i as u64, s));
        }
        RegionInfo::new(r)
    }

    #[test]
    fn test_prefers_isolated_store() {
        let cluster = ClusterState::new(ScheduleConfig::default());
        cluster.put_store(labeled_store(1, "z1", "h1"));
        cluster.put_store(labeled_store(2, "z2", "h2"));
        cluster.put_store(labeled_store(3, "z1", "h3")); // same zone as 1
        cluster.put_store(labeled_store(4, "z3", "h4")); // new zone

        let region = region_on(&[1, 2]);
        let coexisting = vec![cluster.get_store(1).unwrap(), cluster.get_store(2).unwrap()];
        let strategy = ReplicaStrategy {
            checker_name: "replica-checker",
            cluster: &cluster,
            location_labels: vec!["zone".to_owned(), "host".to_owned()],
            isolation_level: String::new(),
            region: &region,
            extra_filters: vec![],
        };
        let (store, temp) = strategy.select_store_to_add(&coexisting);
        assert_eq!(store, 4);
        assert!(!temp);
    }

    #[test]
    fn test_temp_state_reported() {
        let cluster = ClusterState::new(ScheduleConfig::default());
        let mut s3 = labeled_store(3, "z3", "h3");
        s3.is_busy = true;
        cluster.put_store(labeled_store(1, "z1", "h1"));
        cluster.put_store(labeled_store(2, "z2", "h2"));
        cluster.put_store(s3);

        let region = region_on(&[1, 2]);
        let coexisting = vec![cluster.get_store(1).unwrap(), cluster.get_store(2).unwrap()];
        let strategy = ReplicaStrategy {
            checker_name: "replica-checker",
            cluster: &cluster,
            location_labels: vec![],
            isolation_level: String::new(),
            region: &region,
            extra_filters: vec![],
        };
        let (store, temp) = strategy.select_store_to_add(&coexisting);
        assert_eq!(store, 0);
        assert!(temp);
    }

    #[test]
    fn test_isolation_level_enforced() {
        let cluster = ClusterState::new(ScheduleConfig::default());
        cluster.put_store(labeled_store(1, "z1", "h1"));
        cluster.put_store(labeled_store(2, "z2", "h2"));
        // Only zone z1 and z2 hosts are left; isolation-level=zone
        // forbids reusing either zone.
        cluster.put_store(labeled_store(3, "z2", "h3"));

        let region = region_on(&[1, 2]);
        let coexisting = vec![cluster.get_store(1).unwrap(), cluster.get_store(2).unwrap()];
        let strategy = ReplicaStrategy {
            checker_name: "rule-checker",
            cluster: &cluster,
            location_labels: vec!["zone".to_owned(), "host".to_owned()],
            isolation_level: "zone".to_owned(),
            region: &region,
            extra_filters: vec![],
        };
        let (store, _) = strategy.select_store_to_add(&coexisting);
        assert_eq!(store, 0);
    }

    #[test]
    fn test_select_store_to_remove_picks_worst_isolated() {
        let cluster = ClusterState::new(ScheduleConfig::default());
        let region = region_on(&[1, 2, 3]);
        let strategy = ReplicaStrategy {
            checker_name: "rule-checker",
            cluster: &cluster,
            location_labels: vec!["zone".to_owned()],
            isolation_level: String::new(),
            region: &region,
            extra_filters: vec![],
        };
        let coexisting = vec![
            labeled_store(1, "z1", "h1"),
            labeled_store(2, "z1", "h2"),
            labeled_store(3, "z2", "h3"),
        ];
        let worst = strategy.select_store_to_remove(&coexisting);
        // Stores 1 and 2 share a zone; either is a fair pick, store 3
        // is not.
        assert!(worst == 1 || worst == 2);
    }
}
