// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;

use crate::core::SchedulePolicy;
use crate::util::config::ReadableDuration;

pub const DEFAULT_MAX_REPLICAS: u64 = 3;
pub const DEFAULT_STORE_LIMIT: f64 = 15.0;

/// An entry describing a registered scheduler, as persisted in the
/// top-level schedule options.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SchedulerConfig {
    #[serde(rename = "type")]
    pub tp: String,
    pub args: Vec<String>,
    pub disable: bool,
}

impl SchedulerConfig {
    pub fn new(tp: &str) -> SchedulerConfig {
        SchedulerConfig {
            tp: tp.to_owned(),
            args: Vec::new(),
            disable: false,
        }
    }
}

/// Per-store limits on add-peer/remove-peer work, in region-size units
/// per second.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StoreLimitConfig {
    pub add_peer: f64,
    pub remove_peer: f64,
}

impl Default for StoreLimitConfig {
    fn default() -> StoreLimitConfig {
        StoreLimitConfig {
            add_peer: DEFAULT_STORE_LIMIT,
            remove_peer: DEFAULT_STORE_LIMIT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ScheduleConfig {
    pub max_replicas: u64,
    pub location_labels: Vec<String>,
    pub isolation_level: String,
    pub enable_placement_rules: bool,

    pub max_store_down_time: ReadableDuration,
    pub patrol_region_interval: ReadableDuration,

    pub leader_schedule_limit: u64,
    pub leader_schedule_policy: SchedulePolicy,
    pub region_schedule_limit: u64,
    pub replica_schedule_limit: u64,
    pub merge_schedule_limit: u64,
    pub hot_region_schedule_limit: u64,
    pub hot_region_cache_hits_threshold: u64,

    /// Regions below both thresholds are merge candidates. Zero size
    /// disables merging.
    pub max_merge_region_size: u64,
    pub max_merge_region_keys: u64,
    pub split_merge_interval: ReadableDuration,

    /// Zero means derived from the max store region count.
    pub tolerant_size_ratio: f64,
    pub low_space_ratio: f64,
    pub high_space_ratio: f64,
    pub region_score_formula_version: String,

    pub enable_remove_down_replica: bool,
    pub enable_replace_offline_replica: bool,
    pub enable_make_up_replica: bool,
    pub enable_remove_extra_replica: bool,
    pub enable_location_replacement: bool,
    pub enable_joint_consensus: bool,

    pub store_limit: HashMap<u64, StoreLimitConfig>,
    pub store_limit_default: StoreLimitConfig,

    pub schedulers: Vec<SchedulerConfig>,
}

impl Default for ScheduleConfig {
    fn default() -> ScheduleConfig {
        ScheduleConfig {
            max_replicas: DEFAULT_MAX_REPLICAS,
            location_labels: Vec::new(),
            isolation_level: String::new(),
            enable_placement_rules: true,
            max_store_down_time: ReadableDuration::minutes(30),
            patrol_region_interval: ReadableDuration::millis(100),
            leader_schedule_limit: 4,
            leader_schedule_policy: SchedulePolicy::Count,
            region_schedule_limit: 2048,
            replica_schedule_limit: 64,
            merge_schedule_limit: 8,
            hot_region_schedule_limit: 4,
            hot_region_cache_hits_threshold: 3,
            max_merge_region_size: 20,
            max_merge_region_keys: 200_000,
            split_merge_interval: ReadableDuration::hours(1),
            tolerant_size_ratio: 0.0,
            low_space_ratio: 0.8,
            high_space_ratio: 0.7,
            region_score_formula_version: "v2".to_owned(),
            enable_remove_down_replica: true,
            enable_replace_offline_replica: true,
            enable_make_up_replica: true,
            enable_remove_extra_replica: true,
            enable_location_replacement: true,
            enable_joint_consensus: true,
            store_limit: HashMap::new(),
            store_limit_default: StoreLimitConfig::default(),
            schedulers: vec![
                SchedulerConfig::new("balance-region"),
                SchedulerConfig::new("balance-leader"),
                SchedulerConfig::new("balance-hot-region"),
            ],
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_replicas == 0 {
            return Err("max-replicas must be positive".to_owned());
        }
        if self.low_space_ratio <= 0.0 || self.low_space_ratio > 1.0 {
            return Err("low-space-ratio should be in (0, 1]".to_owned());
        }
        if self.high_space_ratio < 0.0 || self.high_space_ratio >= 1.0 {
            return Err("high-space-ratio should be in [0, 1)".to_owned());
        }
        if self.high_space_ratio >= self.low_space_ratio {
            return Err("high-space-ratio should be smaller than low-space-ratio".to_owned());
        }
        match self.region_score_formula_version.as_str() {
            "v1" | "v2" => {}
            v => return Err(format!("unknown region-score-formula-version {:?}", v)),
        }
        Ok(())
    }

    pub fn store_limit_rate(&self, store_id: u64) -> StoreLimitConfig {
        self.store_limit
            .get(&store_id)
            .copied()
            .unwrap_or(self.store_limit_default)
    }

    pub fn merge_enabled(&self) -> bool {
        self.max_merge_region_size > 0
    }

    /// Appends a scheduler entry if an equal one is not present yet.
    pub fn add_scheduler_cfg(&mut self, tp: &str, args: Vec<String>) {
        for c in &self.schedulers {
            if c.tp == tp && c.args == args {
                return;
            }
        }
        self.schedulers.push(SchedulerConfig {
            tp: tp.to_owned(),
            args,
            disable: false,
        });
    }

    pub fn remove_scheduler_cfg(&mut self, tp: &str) {
        self.schedulers.retain(|c| c.tp != tp);
    }
}
