// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

mod region;
mod region_map;
mod store;

pub use self::region::{
    Peer, PeerRole, PeerStats, Region, RegionEpoch, RegionInfo, ReportInterval,
};
pub use self::region_map::RegionMap;
pub use self::store::{StoreInfo, StoreLabel, StoreState};

/// The resource a schedule decision balances.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Leader,
    Region,
}

/// How leader balance measures a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulePolicy {
    Count,
    Size,
}

impl Default for SchedulePolicy {
    fn default() -> SchedulePolicy {
        SchedulePolicy::Count
    }
}

/// A (resource, policy) pair passed around balance decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleKind {
    pub resource: ResourceKind,
    pub policy: SchedulePolicy,
}

impl ScheduleKind {
    pub fn new(resource: ResourceKind, policy: SchedulePolicy) -> ScheduleKind {
        ScheduleKind { resource, policy }
    }
}

/// Relative urgency of an operator. Replica repairs run at high priority,
/// hot-region shuffles at low so they never starve rule fixing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PriorityLevel {
    Low,
    Normal,
    High,
}

impl Default for PriorityLevel {
    fn default() -> PriorityLevel {
        PriorityLevel::Normal
    }
}
