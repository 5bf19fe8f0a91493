// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::time::Instant;

/// Cost charged for removing a peer from a down store, instead of the
/// region size. Removal from a dead store is cheap for the cluster, so
/// it is not throttled like a real data move.
pub const SMALL_REGION_THRESHOLD: i64 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreLimitType {
    AddPeer,
    RemovePeer,
}

impl StoreLimitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreLimitType::AddPeer => "add-peer",
            StoreLimitType::RemovePeer => "remove-peer",
        }
    }
}

/// A token bucket over one action of one store, in region-size units.
/// Tokens refill at `rate` per second up to one second of burst; a debit
/// may push the balance below zero, which denies admission until the
/// bucket recovers.
#[derive(Debug)]
pub struct StoreLimit {
    rate: f64,
    tokens: f64,
    last: Instant,
}

impl StoreLimit {
    pub fn new(rate: f64) -> StoreLimit {
        StoreLimit {
            rate,
            tokens: rate,
            last: Instant::now(),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.refill();
        self.rate = rate;
        if self.tokens > rate {
            self.tokens = rate;
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + elapsed * self.rate).min(self.rate);
    }

    /// Whether the bucket can absorb one more step right now.
    pub fn available(&mut self) -> bool {
        self.refill();
        self.tokens >= 0.0
    }

    /// Debits `cost`, clamped to the bucket's one-second burst so one
    /// huge region cannot freeze a store forever.
    pub fn take(&mut self, cost: i64) {
        self.refill();
        self.tokens -= (cost as f64).min(self.rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_until_exhausted() {
        let mut l = StoreLimit::new(10.0);
        assert!(l.available());
        l.take(6);
        assert!(l.available());
        l.take(6);
        // Balance is now negative; further work is denied.
        assert!(!l.available());
    }

    #[test]
    fn test_cost_clamped_to_burst() {
        let mut l = StoreLimit::new(10.0);
        l.take(1000);
        // Clamped to one second of budget, not a thousand.
        l.take(1);
        assert!(!l.available());
    }

    #[test]
    fn test_set_rate_caps_tokens() {
        let mut l = StoreLimit::new(100.0);
        l.set_rate(1.0);
        // The balance was capped to the new one-second burst.
        l.take(1);
        l.take(1);
        assert!(!l.available());
    }
}
