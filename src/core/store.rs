// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::time::{Duration, Instant};

use crate::core::{ResourceKind, SchedulePolicy};

const MAX_SCORE: f64 = 1024.0 * 1024.0 * 1024.0;
const MIN_WEIGHT: f64 = 1e-6;
const MB: f64 = 1024.0 * 1024.0;
const GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLabel {
    pub key: String,
    pub value: String,
}

impl StoreLabel {
    pub fn new(key: &str, value: &str) -> StoreLabel {
        StoreLabel {
            key: key.to_owned(),
            value: value.to_owned(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreState {
    Up,
    Offline,
    Tombstone,
}

impl Default for StoreState {
    fn default() -> StoreState {
        StoreState::Up
    }
}

/// A physical node hosting region replicas, merged from store metadata
/// and the statistics reported by store heartbeats.
#[derive(Clone, Debug)]
pub struct StoreInfo {
    pub id: u64,
    pub address: String,
    pub labels: Vec<StoreLabel>,
    pub state: StoreState,
    /// Capacity and available space in bytes.
    pub capacity: u64,
    pub available: u64,
    pub used_size: u64,
    pub region_count: i64,
    /// Total region size on the store in size units (MiB).
    pub region_size: i64,
    pub leader_count: i64,
    pub leader_size: i64,
    /// Flow rates per second, from store heartbeats.
    pub bytes_written: f64,
    pub keys_written: f64,
    pub bytes_read: f64,
    pub keys_read: f64,
    pub is_busy: bool,
    pub last_heartbeat: Instant,
    pub region_weight: f64,
    pub leader_weight: f64,
}

impl StoreInfo {
    pub fn new(id: u64, address: &str) -> StoreInfo {
        StoreInfo {
            id,
            address: address.to_owned(),
            labels: Vec::new(),
            state: StoreState::Up,
            capacity: 0,
            available: 0,
            used_size: 0,
            region_count: 0,
            region_size: 0,
            leader_count: 0,
            leader_size: 0,
            bytes_written: 0.0,
            keys_written: 0.0,
            bytes_read: 0.0,
            keys_read: 0.0,
            is_busy: false,
            last_heartbeat: Instant::now(),
            region_weight: 1.0,
            leader_weight: 1.0,
        }
    }

    pub fn is_up(&self) -> bool {
        self.state == StoreState::Up
    }

    pub fn is_offline(&self) -> bool {
        self.state == StoreState::Offline
    }

    pub fn is_tombstone(&self) -> bool {
        self.state == StoreState::Tombstone
    }

    pub fn down_time(&self) -> Duration {
        self.last_heartbeat.elapsed()
    }

    pub fn label_value(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.key == key)
            .map(|l| l.value.as_str())
    }

    pub fn resource_count(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::Leader => self.leader_count,
            ResourceKind::Region => self.region_count,
        }
    }

    pub fn resource_size(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::Leader => self.leader_size,
            ResourceKind::Region => self.region_size,
        }
    }

    pub fn leader_score(&self, policy: SchedulePolicy, delta: i64) -> f64 {
        let base = match policy {
            SchedulePolicy::Count => self.leader_count as f64,
            SchedulePolicy::Size => self.leader_size as f64,
        };
        (base + delta as f64) / self.leader_weight.max(MIN_WEIGHT)
    }

    pub fn region_score(
        &self,
        version: &str,
        high_space_ratio: f64,
        low_space_ratio: f64,
        delta: i64,
    ) -> f64 {
        match version {
            "v1" => self.region_score_v1(high_space_ratio, low_space_ratio, delta),
            _ => self.region_score_v2(low_space_ratio, delta),
        }
    }

    /// Piecewise score: plain region size while space is ample, dominated
    /// by remaining space once the store approaches the low-space bound,
    /// with a linear transition in between.
    fn region_score_v1(&self, high_space_ratio: f64, low_space_ratio: f64, delta: i64) -> f64 {
        let available = self.available as f64 / MB;
        let used = self.used_size as f64 / MB;
        let capacity = self.capacity as f64 / MB;

        let amplification = if self.region_size == 0 || used == 0.0 {
            1.0
        } else {
            // Region size exceeds the actual disk usage because of
            // compression; amplification corrects the delta.
            self.region_size as f64 / used
        };

        let high_space_bound = (1.0 - high_space_ratio) * capacity;
        let low_space_bound = (1.0 - low_space_ratio) * capacity;
        let projected = available - delta as f64 / amplification;

        let score = if projected >= high_space_bound {
            (self.region_size + delta) as f64
        } else if projected <= low_space_bound {
            MAX_SCORE - projected
        } else {
            let x1 = (used + available - high_space_bound) * amplification;
            let y1 = x1;
            let x2 = (used + available - low_space_bound) * amplification;
            let y2 = MAX_SCORE - low_space_bound;
            let k = (y2 - y1) / (x2 - x1);
            let b = y1 - k * x1;
            k * (self.region_size + delta) as f64 + b
        };
        score / self.region_weight.max(MIN_WEIGHT)
    }

    /// Log-curve score: the weight of region size grows as available
    /// space shrinks, and remaining space takes over entirely below the
    /// knee `f`.
    fn region_score_v2(&self, low_space_ratio: f64, delta: i64) -> f64 {
        let a = (self.available as f64 / GB - delta as f64 / (GB / MB)).max(0.0);
        let c = self.capacity as f64 / GB;
        let r = (self.region_size + delta) as f64;
        let (k, m, b) = (1.0, 256.0, 1e7);
        let f = 50f64.max(c * (1.0 - low_space_ratio));

        let score = if a >= c || c < 1.0 {
            r
        } else if a > f {
            (k + m * (c.ln() - (a - f + 1.0).ln()) / (c - a + f - 1.0)) * r
        } else {
            (k + m * c.ln() / c) * r + b * (f - a) / f
        };
        score / self.region_weight.max(MIN_WEIGHT)
    }

    /// Number of location levels by which this store differs from every
    /// store in `others`. Higher means better isolated.
    pub fn distinct_score(&self, location_labels: &[String], others: &[StoreInfo]) -> f64 {
        const REPLICA_BASE_SCORE: f64 = 100.0;
        let mut score = 0.0;
        for other in others {
            if other.id == self.id {
                continue;
            }
            for (i, label) in location_labels.iter().enumerate() {
                if self.label_value(label) != other.label_value(label) {
                    score += REPLICA_BASE_SCORE.powi((location_labels.len() - i - 1) as i32);
                    break;
                }
            }
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_space(id: u64, capacity_gb: u64, available_gb: u64, region_size: i64) -> StoreInfo {
        let mut s = StoreInfo::new(id, "");
        s.capacity = capacity_gb * 1024 * 1024 * 1024;
        s.available = available_gb * 1024 * 1024 * 1024;
        s.used_size = s.capacity - s.available;
        s.region_size = region_size;
        s
    }

    #[test]
    fn test_leader_score() {
        let mut s = StoreInfo::new(1, "");
        s.leader_count = 10;
        s.leader_size = 500;
        assert_eq!(s.leader_score(SchedulePolicy::Count, 0), 10.0);
        assert_eq!(s.leader_score(SchedulePolicy::Count, -2), 8.0);
        assert_eq!(s.leader_score(SchedulePolicy::Size, 100), 600.0);
    }

    #[test]
    fn test_region_score_orders_by_size_when_space_is_ample() {
        let small = store_with_space(1, 1024, 1000, 100);
        let big = store_with_space(2, 1024, 1000, 1000);
        for v in ["v1", "v2"] {
            assert!(
                big.region_score(v, 0.7, 0.8, 0) > small.region_score(v, 0.7, 0.8, 0),
                "formula {}",
                v
            );
        }
    }

    #[test]
    fn test_region_score_low_space_dominates() {
        // Nearly full store must score far above a roomy one even with a
        // smaller region size.
        let full = store_with_space(1, 1024, 10, 100);
        let roomy = store_with_space(2, 1024, 1000, 10000);
        for v in ["v1", "v2"] {
            assert!(
                full.region_score(v, 0.7, 0.8, 0) > roomy.region_score(v, 0.7, 0.8, 0),
                "formula {}",
                v
            );
        }
    }

    #[test]
    fn test_distinct_score() {
        let labels = vec!["zone".to_owned(), "host".to_owned()];
        let mut a = StoreInfo::new(1, "");
        a.labels = vec![StoreLabel::new("zone", "z1"), StoreLabel::new("host", "h1")];
        let mut b = StoreInfo::new(2, "");
        b.labels = vec![StoreLabel::new("zone", "z1"), StoreLabel::new("host", "h2")];
        let mut c = StoreInfo::new(3, "");
        c.labels = vec![StoreLabel::new("zone", "z2"), StoreLabel::new("host", "h1")];

        let others = vec![a.clone()];
        // Same zone, different host: differs at level 1.
        assert_eq!(b.distinct_score(&labels, &others), 1.0);
        // Different zone: differs at level 0, scores higher.
        assert_eq!(c.distinct_score(&labels, &others), 100.0);
    }
}
