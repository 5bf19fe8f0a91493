// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

//! Flow statistics over region heartbeats. The two hot-peer caches (one
//! per flow kind) decide which (store, region) pairs count as hot.

mod hot_peer;
mod hot_peer_cache;
mod topn;

pub use self::hot_peer::{DimStat, HotPeerStat, HotStatSource};
pub use self::hot_peer_cache::HotPeerCache;
pub use self::topn::TopN;

use std::fmt;

/// Dimensions tracked per hot peer.
pub const BYTE_DIM: usize = 0;
pub const KEY_DIM: usize = 1;
pub const DIM_LEN: usize = 2;

/// Capacity of the per-store hot peer list; beyond it, the top-N minimum
/// feeds the dynamic hot threshold.
pub const TOP_N: usize = 60;
pub const HOT_THRESHOLD_RATIO: f64 = 0.8;

/// Expected report interval of region heartbeats, in seconds.
pub const REGION_HEARTBEAT_REPORT_INTERVAL: u64 = 60;
/// Reports faster than this are treated as noise.
pub const HOT_REGION_REPORT_MIN_INTERVAL: u64 = 3;

pub const ROLLING_WINDOW_SIZE: usize = 5;
pub const DEFAULT_AOT_SIZE: usize = 1;
pub const HOT_REGION_ANTI_COUNT: i32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Write,
    Read,
}

impl FlowKind {
    /// Baseline hot thresholds per dimension when the top-N list cannot
    /// provide one.
    pub fn min_hot_thresholds(self) -> [f64; DIM_LEN] {
        match self {
            FlowKind::Write => [1024.0, 32.0],
            FlowKind::Read => [8.0 * 1024.0, 128.0],
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKind::Write => write!(f, "write"),
            FlowKind::Read => write!(f, "read"),
        }
    }
}
