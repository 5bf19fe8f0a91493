// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::time::{Duration, Instant};

use movingaverage::{AvgOverTime, TimeMedian};

use crate::statistics::{
    FlowKind, DEFAULT_AOT_SIZE, DIM_LEN, KEY_DIM, REGION_HEARTBEAT_REPORT_INTERVAL,
    ROLLING_WINDOW_SIZE,
};

/// Rolling statistics for one dimension of one hot peer: a time-median
/// for the denoised rate and a short average for the instantaneous rate
/// of the last report span.
#[derive(Clone, Debug)]
pub struct DimStat {
    dim: usize,
    rolling: TimeMedian,
    last_average: AvgOverTime,
}

impl DimStat {
    pub fn new(dim: usize) -> DimStat {
        let report_interval = Duration::from_secs(REGION_HEARTBEAT_REPORT_INTERVAL);
        DimStat {
            dim,
            rolling: TimeMedian::new(DEFAULT_AOT_SIZE, ROLLING_WINDOW_SIZE, report_interval),
            last_average: AvgOverTime::new(report_interval),
        }
    }

    pub fn add(&mut self, delta: f64, interval: Duration) {
        self.last_average.add(delta, interval);
        self.rolling.add(delta, interval);
    }

    pub fn is_last_average_hot(&self, thresholds: &[f64; DIM_LEN]) -> bool {
        self.last_average.get() >= thresholds[self.dim]
    }

    pub fn is_full(&self) -> bool {
        self.last_average.is_full()
    }

    pub fn clear_last_average(&mut self) {
        self.last_average.clear();
    }

    pub fn get(&self) -> f64 {
        self.rolling.get()
    }
}

/// How a new cache item obtained its rolling history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HotStatSource {
    /// Updated against the old item of the same store.
    Direct,
    /// Carried over from the store the peer just left.
    Inherit,
    /// Copied from a sibling peer of the same region.
    Adopt,
}

/// Statistics of one hot (store, region) pair.
#[derive(Clone, Debug)]
pub struct HotPeerStat {
    pub store_id: u64,
    pub region_id: u64,
    pub kind: FlowKind,

    /// Rises on each hot heartbeat, falls on each cold one.
    pub hot_degree: i32,
    /// Noise guard for eviction; the entry is dropped when it hits zero.
    pub anti_count: i32,

    /// Instantaneous rates of the last report.
    pub byte_rate: f64,
    pub key_rate: f64,

    pub(crate) rolling_byte_rate: Option<DimStat>,
    pub(crate) rolling_key_rate: Option<DimStat>,

    pub last_update_time: Instant,

    pub(crate) need_delete: bool,
    pub(crate) is_leader: bool,
    pub(crate) is_new: bool,
    pub(crate) just_transfer_leader: bool,
    pub(crate) interval: u64,
    pub(crate) thresholds: [f64; DIM_LEN],
    pub(crate) peers: Vec<u64>,
    pub(crate) last_transfer_leader_time: Option<Instant>,
    pub(crate) source: HotStatSource,
    pub(crate) allow_adopt: bool,
}

impl HotPeerStat {
    /// Key in the per-store top-N list.
    pub fn id(&self) -> u64 {
        self.region_id
    }

    pub fn rate(&self, dim: usize) -> f64 {
        match dim {
            KEY_DIM => self.get_key_rate(),
            _ => self.get_byte_rate(),
        }
    }

    /// Denoised byte rate when rolling statistics exist.
    pub fn get_byte_rate(&self) -> f64 {
        match &self.rolling_byte_rate {
            Some(d) => d.get().round(),
            None => self.byte_rate.round(),
        }
    }

    pub fn get_key_rate(&self) -> f64 {
        match &self.rolling_key_rate {
            Some(d) => d.get().round(),
            None => self.key_rate.round(),
        }
    }

    pub fn get_thresholds(&self) -> [f64; DIM_LEN] {
        self.thresholds
    }

    pub fn is_need_delete(&self) -> bool {
        self.need_delete
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// A cooldown after transfer leader avoids ping-ponging the same hot
    /// peer between stores.
    pub fn is_need_cool_down_transfer_leader(&self, min_hot_degree: u64) -> bool {
        match self.last_transfer_leader_time {
            Some(t) => {
                t.elapsed().as_secs() < min_hot_degree * REGION_HEARTBEAT_REPORT_INTERVAL
            }
            None => false,
        }
    }

    pub(crate) fn is_full_and_hot(&self) -> bool {
        let byte_hot = self
            .rolling_byte_rate
            .as_ref()
            .map_or(false, |d| d.is_full() && d.is_last_average_hot(&self.thresholds));
        let key_hot = self
            .rolling_key_rate
            .as_ref()
            .map_or(false, |d| d.is_full() && d.is_last_average_hot(&self.thresholds));
        byte_hot || key_hot
    }

    pub(crate) fn rolling_full(&self) -> bool {
        self.rolling_key_rate.as_ref().map_or(false, |d| d.is_full())
    }

    pub(crate) fn clear_last_average(&mut self) {
        if let Some(d) = self.rolling_byte_rate.as_mut() {
            d.clear_last_average();
        }
        if let Some(d) = self.rolling_key_rate.as_mut() {
            d.clear_last_average();
        }
    }

    pub(crate) fn add_flow(&mut self, bytes: f64, keys: f64, interval: Duration) {
        if let Some(d) = self.rolling_byte_rate.as_mut() {
            d.add(bytes, interval);
        }
        if let Some(d) = self.rolling_key_rate.as_mut() {
            d.add(keys, interval);
        }
    }

    /// A flattened copy for reporting, with rolling rates folded into the
    /// plain rate fields.
    pub fn snapshot(&self) -> HotPeerStat {
        let mut ret = self.clone();
        ret.byte_rate = self.get_byte_rate();
        ret.key_rate = self.get_key_rate();
        ret.rolling_byte_rate = None;
        ret.rolling_key_rate = None;
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::BYTE_DIM;

    fn bare_stat() -> HotPeerStat {
        HotPeerStat {
            store_id: 1,
            region_id: 2,
            kind: FlowKind::Write,
            hot_degree: 0,
            anti_count: 0,
            byte_rate: 1023.4,
            key_rate: 32.6,
            rolling_byte_rate: None,
            rolling_key_rate: None,
            last_update_time: Instant::now(),
            need_delete: false,
            is_leader: false,
            is_new: false,
            just_transfer_leader: false,
            interval: 60,
            thresholds: [1024.0, 32.0],
            peers: vec![1, 2, 3],
            last_transfer_leader_time: None,
            source: HotStatSource::Direct,
            allow_adopt: false,
        }
    }

    #[test]
    fn test_rates_fall_back_to_instant() {
        let stat = bare_stat();
        assert_eq!(stat.get_byte_rate(), 1023.0);
        assert_eq!(stat.get_key_rate(), 33.0);
    }

    #[test]
    fn test_rolling_rates_take_over() {
        let mut stat = bare_stat();
        stat.rolling_byte_rate = Some(DimStat::new(BYTE_DIM));
        stat.rolling_key_rate = Some(DimStat::new(KEY_DIM));
        let interval = Duration::from_secs(REGION_HEARTBEAT_REPORT_INTERVAL);
        for _ in 0..ROLLING_WINDOW_SIZE {
            stat.add_flow(6000.0 * interval.as_secs() as f64, 100.0 * interval.as_secs() as f64, interval);
        }
        assert_eq!(stat.get_byte_rate(), 6000.0);
        assert_eq!(stat.get_key_rate(), 100.0);
    }

    #[test]
    fn test_transfer_leader_cooldown() {
        let mut stat = bare_stat();
        assert!(!stat.is_need_cool_down_transfer_leader(3));
        stat.last_transfer_leader_time = Some(Instant::now());
        assert!(stat.is_need_cool_down_transfer_leader(3));
    }
}
