// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::cluster::Cluster;
use crate::core::RegionInfo;
use crate::placement::RegionFit;

/// How long a region must stay short of replicas before it is pulled
/// ahead of the key-order patrol.
pub const DEFAULT_PRIORITY_QUEUE_INTERVAL: Duration = Duration::from_secs(5 * 60);

struct PriorityEntry {
    since: Instant,
}

/// Observes replica shortfalls; regions short for longer than the queue
/// interval are re-checked before the normal scan. Annotates only; it
/// never emits operators itself.
pub struct PriorityInspector {
    cluster: Arc<dyn Cluster>,
    queue_interval: Duration,
    entries: Mutex<HashMap<u64, PriorityEntry>>,
}

impl PriorityInspector {
    pub fn new(cluster: Arc<dyn Cluster>) -> PriorityInspector {
        PriorityInspector {
            cluster,
            queue_interval: DEFAULT_PRIORITY_QUEUE_INTERVAL,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn set_queue_interval(&mut self, interval: Duration) {
        self.queue_interval = interval;
    }

    /// Computes the region's fit and records whether it is short of
    /// replicas. The fit is returned for the rule checker to reuse.
    pub fn inspect(&self, region: &RegionInfo) -> RegionFit {
        let fit = self.cluster.fit_region(region);
        let makeup: usize = fit
            .rule_fits
            .iter()
            .map(|rf| rf.rule.count.saturating_sub(rf.peers.len()))
            .sum();
        let mut entries = self.entries.lock().unwrap();
        if makeup > 0 {
            entries
                .entry(region.get_id())
                .or_insert_with(|| PriorityEntry {
                    since: Instant::now(),
                });
        } else {
            entries.remove(&region.get_id());
        }
        fit
    }

    /// Regions whose shortfall outlived the queue interval.
    pub fn get_priority_regions(&self) -> Vec<u64> {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .filter(|(_, e)| e.since.elapsed() >= self.queue_interval)
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn remove_priority_region(&self, region_id: u64) {
        self.entries.lock().unwrap().remove(&region_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterState;
    use crate::config::ScheduleConfig;
    use crate::core::{Peer, Region, StoreInfo};

    fn region(stores: &[u64]) -> RegionInfo {
        let mut r = Region::new(1, b"", b"");
        for (i, &s) in stores.iter().enumerate() {
            r.peers.push(Peer::new(10 + i as u64, s));
        }
        let mut info = RegionInfo::new(r);
        info.leader = info.get_store_peer(stores[0]).cloned();
        info
    }

    #[test]
    fn test_shortfall_enters_and_leaves_queue() {
        let cluster = Arc::new(ClusterState::new(ScheduleConfig::default()));
        for id in 1..=3 {
            cluster.put_store(StoreInfo::new(id, ""));
        }
        let mut inspector = PriorityInspector::new(Arc::clone(&cluster) as Arc<dyn Cluster>);
        inspector.set_queue_interval(Duration::from_secs(0));

        inspector.inspect(&region(&[1, 2]));
        assert_eq!(inspector.get_priority_regions(), vec![1]);

        // Fully replicated again: the entry clears.
        inspector.inspect(&region(&[1, 2, 3]));
        assert!(inspector.get_priority_regions().is_empty());
    }
}
