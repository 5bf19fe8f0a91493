// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::time::Duration;

use crate::{AvgOverTime, MedianFilter};

/// TimeMedian feeds a median filter with averages accumulated over fixed
/// spans. It smooths both the sampling jitter (via `AvgOverTime`) and
/// short-lived spikes (via the median window).
#[derive(Clone, Debug)]
pub struct TimeMedian {
    aot: AvgOverTime,
    mf: MedianFilter,
}

impl TimeMedian {
    pub fn new(aot_size: usize, mf_size: usize, report_interval: Duration) -> TimeMedian {
        TimeMedian {
            aot: AvgOverTime::new(report_interval * aot_size as u32),
            mf: MedianFilter::new(mf_size),
        }
    }

    pub fn add(&mut self, delta: f64, interval: Duration) {
        self.aot.add(delta, interval);
        if self.aot.is_full() {
            self.mf.add(self.aot.get());
            self.aot.clear();
        }
    }

    pub fn get(&self) -> f64 {
        self.mf.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_window_rounds() {
        let report = Duration::from_secs(10);
        let mut tm = TimeMedian::new(1, 5, report);
        for _ in 0..5 {
            tm.add(100.0, report);
        }
        assert!((tm.get() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_round_does_not_update() {
        let report = Duration::from_secs(10);
        let mut tm = TimeMedian::new(1, 5, report);
        tm.add(100.0, report);
        let before = tm.get();
        // Half a round only; the median window is untouched.
        tm.add(10000.0, Duration::from_secs(5));
        assert_eq!(tm.get(), before);
    }
}
