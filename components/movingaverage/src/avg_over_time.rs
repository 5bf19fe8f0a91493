// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::VecDeque;
use std::time::Duration;

/// Maintains change rate in the last `avg_interval`.
///
/// Each sample is a `delta` accumulated over `interval`. The queue keeps
/// just enough samples to cover `avg_interval`; older ones are dropped as
/// new ones arrive.
#[derive(Clone, Debug)]
pub struct AvgOverTime {
    que: VecDeque<(f64, Duration)>,
    delta_sum: f64,
    interval_sum: Duration,
    avg_interval: Duration,
}

impl AvgOverTime {
    pub fn new(avg_interval: Duration) -> AvgOverTime {
        AvgOverTime {
            que: VecDeque::new(),
            delta_sum: 0.0,
            interval_sum: Duration::from_secs(0),
            avg_interval,
        }
    }

    /// Returns the change rate per second over the covered span.
    pub fn get(&self) -> f64 {
        if self.interval_sum.as_nanos() == 0 {
            return 0.0;
        }
        self.delta_sum / self.interval_sum.as_secs_f64()
    }

    pub fn add(&mut self, delta: f64, interval: Duration) {
        if interval.as_nanos() == 0 {
            return;
        }
        self.que.push_back((delta, interval));
        self.delta_sum += delta;
        self.interval_sum += interval;

        // Drop samples on the front that are no longer needed to cover
        // `avg_interval`.
        while let Some(&(front_delta, front_interval)) = self.que.front() {
            if self.interval_sum - front_interval < self.avg_interval {
                break;
            }
            self.que.pop_front();
            self.delta_sum -= front_delta;
            self.interval_sum -= front_interval;
        }
    }

    /// Whether the queue covers the full averaging span.
    pub fn is_full(&self) -> bool {
        self.interval_sum >= self.avg_interval
    }

    pub fn clear(&mut self) {
        self.que.clear();
        self.delta_sum = 0.0;
        self.interval_sum = Duration::from_secs(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_rate() {
        let mut aot = AvgOverTime::new(Duration::from_secs(10));
        assert!(!aot.is_full());
        assert_eq!(aot.get(), 0.0);

        aot.add(100.0, Duration::from_secs(10));
        assert!(aot.is_full());
        assert!((aot.get() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_slides() {
        let mut aot = AvgOverTime::new(Duration::from_secs(10));
        for _ in 0..10 {
            aot.add(10.0, Duration::from_secs(1));
        }
        assert!(aot.is_full());
        assert!((aot.get() - 10.0).abs() < 1e-9);

        // Push the old slow samples out with faster ones.
        for _ in 0..10 {
            aot.add(100.0, Duration::from_secs(1));
        }
        assert!((aot.get() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_clear() {
        let mut aot = AvgOverTime::new(Duration::from_secs(10));
        aot.add(100.0, Duration::from_secs(10));
        aot.clear();
        assert!(!aot.is_full());
        assert_eq!(aot.get(), 0.0);
    }

    #[test]
    fn test_zero_interval_ignored() {
        let mut aot = AvgOverTime::new(Duration::from_secs(10));
        aot.add(100.0, Duration::from_secs(0));
        assert_eq!(aot.get(), 0.0);
        assert!(!aot.is_full());
    }
}
