// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

//! Long-running policy modules. Each scheduler periodically selects a
//! source and target and emits operators; the coordinator ticks it at a
//! dynamic interval.

mod balance_leader;
mod balance_region;
mod evict_leader;
mod hot_region;
mod shuffle_hot_region;
mod shuffle_region;
pub mod utils;

pub use self::balance_leader::{BalanceLeaderScheduler, BALANCE_LEADER_NAME, BALANCE_LEADER_TYPE};
pub use self::balance_region::{BalanceRegionScheduler, BALANCE_REGION_NAME, BALANCE_REGION_TYPE};
pub use self::evict_leader::{EvictLeaderScheduler, EVICT_LEADER_NAME, EVICT_LEADER_TYPE};
pub use self::hot_region::{BalanceHotRegionScheduler, HOT_REGION_NAME, HOT_REGION_TYPE};
pub use self::shuffle_hot_region::{
    ShuffleHotRegionScheduler, SHUFFLE_HOT_REGION_NAME, SHUFFLE_HOT_REGION_TYPE,
};
pub use self::shuffle_region::{ShuffleRegionScheduler, SHUFFLE_REGION_NAME, SHUFFLE_REGION_TYPE};

use std::sync::Arc;
use std::time::Duration;

use crate::cluster::Cluster;
use crate::error::{Error, Result};
use crate::operator::{Operator, OperatorController};

/// The smallest tick interval a scheduler may ask for.
pub const MIN_SCHEDULE_INTERVAL: Duration = Duration::from_millis(10);
/// Idle backoff is capped at a few minutes.
pub const MAX_SCHEDULE_INTERVAL: Duration = Duration::from_secs(3 * 60);
const SCHEDULE_INTERVAL_GROWTH: f64 = 1.3;

/// Geometric interval growth used by the default backoff.
pub fn grow_interval(interval: Duration) -> Duration {
    let grown = interval.mul_f64(SCHEDULE_INTERVAL_GROWTH);
    grown.min(MAX_SCHEDULE_INTERVAL).max(MIN_SCHEDULE_INTERVAL)
}

/// A diagnostic record of one considered (and possibly rejected)
/// schedule decision.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchedulePlan {
    pub source: u64,
    pub target: u64,
    pub region: u64,
    pub status: String,
}

impl SchedulePlan {
    pub fn new(source: u64, target: u64, region: u64, status: &str) -> SchedulePlan {
        SchedulePlan {
            source,
            target,
            region,
            status: status.to_owned(),
        }
    }
}

pub trait Scheduler: Send {
    fn get_name(&self) -> &str;
    fn get_type(&self) -> &'static str;

    fn encode_config(&self) -> Result<Vec<u8>> {
        Ok(b"{}".to_vec())
    }

    fn get_min_interval(&self) -> Duration {
        MIN_SCHEDULE_INTERVAL
    }

    fn get_next_interval(&self, interval: Duration) -> Duration {
        grow_interval(interval)
    }

    fn prepare(&mut self, _cluster: &dyn Cluster) -> Result<()> {
        Ok(())
    }

    fn cleanup(&mut self, _cluster: &dyn Cluster) {}

    fn is_schedule_allowed(&self, cluster: &dyn Cluster) -> bool;

    fn schedule(
        &mut self,
        cluster: &dyn Cluster,
        dry_run: bool,
    ) -> (Vec<Operator>, Vec<SchedulePlan>);
}

/// How a scheduler's configuration arrives: a persisted JSON blob or
/// the argument list of a creation command.
pub enum ConfigDecoder<'a> {
    Json(&'a [u8]),
    Args(&'a [String]),
}

impl<'a> ConfigDecoder<'a> {
    pub fn none() -> ConfigDecoder<'static> {
        ConfigDecoder::Args(&[])
    }
}

/// The static scheduler registry. User schedulers register here by type
/// name; unloading is `remove_scheduler` on the coordinator.
pub fn create_scheduler(
    tp: &str,
    op_controller: Arc<OperatorController>,
    decoder: ConfigDecoder<'_>,
) -> Result<Box<dyn Scheduler>> {
    match tp {
        BALANCE_REGION_TYPE => Ok(Box::new(BalanceRegionScheduler::new(op_controller))),
        BALANCE_LEADER_TYPE => Ok(Box::new(BalanceLeaderScheduler::new(op_controller))),
        HOT_REGION_TYPE => Ok(Box::new(BalanceHotRegionScheduler::new(op_controller))),
        SHUFFLE_HOT_REGION_TYPE => Ok(Box::new(ShuffleHotRegionScheduler::new(
            op_controller,
            decoder,
        )?)),
        SHUFFLE_REGION_TYPE => Ok(Box::new(ShuffleRegionScheduler::new(op_controller, decoder)?)),
        EVICT_LEADER_TYPE => Ok(Box::new(EvictLeaderScheduler::new(op_controller, decoder)?)),
        _ => Err(Error::SchedulerNotFound(tp.to_owned())),
    }
}

/// Maps a scheduler name back to its registered type.
pub fn find_scheduler_type_by_name(name: &str) -> Option<&'static str> {
    let pairs = [
        (BALANCE_REGION_NAME, BALANCE_REGION_TYPE),
        (BALANCE_LEADER_NAME, BALANCE_LEADER_TYPE),
        (HOT_REGION_NAME, HOT_REGION_TYPE),
        (SHUFFLE_HOT_REGION_NAME, SHUFFLE_HOT_REGION_TYPE),
        (SHUFFLE_REGION_NAME, SHUFFLE_REGION_TYPE),
        (EVICT_LEADER_NAME, EVICT_LEADER_TYPE),
    ];
    pairs
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, t)| *t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_growth_capped() {
        let mut interval = MIN_SCHEDULE_INTERVAL;
        for _ in 0..100 {
            let next = grow_interval(interval);
            assert!(next >= interval);
            interval = next;
        }
        assert_eq!(interval, MAX_SCHEDULE_INTERVAL);
    }

    #[test]
    fn test_find_type_by_name() {
        assert_eq!(
            find_scheduler_type_by_name("balance-region-scheduler"),
            Some("balance-region")
        );
        assert_eq!(find_scheduler_type_by_name("nope"), None);
    }
}
