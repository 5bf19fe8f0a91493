// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::HashSet;
use std::time::Duration;

use crate::config::ScheduleConfig;
use crate::core::StoreInfo;
use crate::placement::{match_label_constraints, LabelConstraint};

/// A store not heard from for this long is treated as disconnected, a
/// temporary condition distinct from the down state.
pub const STORE_DISCONNECT_DURATION: Duration = Duration::from_secs(20 * 60);

/// Store selection filter. `source` gates moving load out of a store,
/// `target` gates moving load in.
pub trait Filter {
    fn scope(&self) -> &str;
    fn type_name(&self) -> &'static str;

    fn source(&self, _cfg: &ScheduleConfig, _store: &StoreInfo) -> bool {
        true
    }

    fn target(&self, cfg: &ScheduleConfig, store: &StoreInfo) -> bool;
}

pub fn filter_target(cfg: &ScheduleConfig, store: &StoreInfo, filters: &[Box<dyn Filter>]) -> bool {
    filters.iter().all(|f| f.target(cfg, store))
}

pub fn filter_source(cfg: &ScheduleConfig, store: &StoreInfo, filters: &[Box<dyn Filter>]) -> bool {
    filters.iter().all(|f| f.source(cfg, store))
}

/// Filters stores by their lifecycle and health state.
pub struct StoreStateFilter {
    pub action_scope: String,
    pub transfer_leader: bool,
    pub move_region: bool,
}

impl StoreStateFilter {
    pub fn new(scope: &str) -> StoreStateFilter {
        StoreStateFilter {
            action_scope: scope.to_owned(),
            transfer_leader: false,
            move_region: false,
        }
    }

    /// Whether the store is only rejected by a condition expected to
    /// clear on its own. Callers park the region for a re-check instead
    /// of giving up.
    pub fn rejected_by_temp_state(&self, _cfg: &ScheduleConfig, store: &StoreInfo) -> bool {
        if !store.is_up() {
            return false;
        }
        store.is_busy || store.down_time() >= STORE_DISCONNECT_DURATION
    }
}

impl Filter for StoreStateFilter {
    fn scope(&self) -> &str {
        &self.action_scope
    }

    fn type_name(&self) -> &'static str {
        "store-state-filter"
    }

    fn source(&self, _cfg: &ScheduleConfig, store: &StoreInfo) -> bool {
        !store.is_tombstone() && !store.is_busy
    }

    fn target(&self, _cfg: &ScheduleConfig, store: &StoreInfo) -> bool {
        if !store.is_up() || store.is_busy {
            return false;
        }
        if store.down_time() >= STORE_DISCONNECT_DURATION {
            return false;
        }
        true
    }
}

/// Excludes explicit store sets, typically the stores a region already
/// has peers on.
pub struct ExcludedFilter {
    scope: String,
    sources: HashSet<u64>,
    targets: HashSet<u64>,
}

impl ExcludedFilter {
    pub fn new(scope: &str, sources: HashSet<u64>, targets: HashSet<u64>) -> ExcludedFilter {
        ExcludedFilter {
            scope: scope.to_owned(),
            sources,
            targets,
        }
    }
}

impl Filter for ExcludedFilter {
    fn scope(&self) -> &str {
        &self.scope
    }

    fn type_name(&self) -> &'static str {
        "excluded-filter"
    }

    fn source(&self, _cfg: &ScheduleConfig, store: &StoreInfo) -> bool {
        !self.sources.contains(&store.id)
    }

    fn target(&self, _cfg: &ScheduleConfig, store: &StoreInfo) -> bool {
        !self.targets.contains(&store.id)
    }
}

/// Keeps only stores matching a rule's label constraints.
pub struct LabelConstraintFilter {
    scope: String,
    constraints: Vec<LabelConstraint>,
}

impl LabelConstraintFilter {
    pub fn new(scope: &str, constraints: Vec<LabelConstraint>) -> LabelConstraintFilter {
        LabelConstraintFilter {
            scope: scope.to_owned(),
            constraints,
        }
    }
}

impl Filter for LabelConstraintFilter {
    fn scope(&self) -> &str {
        &self.scope
    }

    fn type_name(&self) -> &'static str {
        "label-constraint-filter"
    }

    fn source(&self, _cfg: &ScheduleConfig, store: &StoreInfo) -> bool {
        match_label_constraints(store, &self.constraints)
    }

    fn target(&self, _cfg: &ScheduleConfig, store: &StoreInfo) -> bool {
        match_label_constraints(store, &self.constraints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StoreLabel, StoreState};
    use crate::placement::LabelConstraintOp;

    #[test]
    fn test_store_state_filter() {
        let cfg = ScheduleConfig::default();
        let f = StoreStateFilter::new("test");
        let mut store = StoreInfo::new(1, "");
        assert!(f.target(&cfg, &store));
        assert!(f.source(&cfg, &store));

        store.is_busy = true;
        assert!(!f.target(&cfg, &store));
        assert!(f.rejected_by_temp_state(&cfg, &store));

        store.is_busy = false;
        store.state = StoreState::Offline;
        assert!(!f.target(&cfg, &store));
        assert!(!f.rejected_by_temp_state(&cfg, &store));
    }

    #[test]
    fn test_excluded_filter() {
        let cfg = ScheduleConfig::default();
        let f = ExcludedFilter::new("test", HashSet::new(), [1, 2].into_iter().collect());
        assert!(!f.target(&cfg, &StoreInfo::new(1, "")));
        assert!(f.target(&cfg, &StoreInfo::new(3, "")));
        assert!(f.source(&cfg, &StoreInfo::new(1, "")));
    }

    #[test]
    fn test_label_constraint_filter() {
        let cfg = ScheduleConfig::default();
        let f = LabelConstraintFilter::new(
            "test",
            vec![LabelConstraint {
                key: "zone".to_owned(),
                op: LabelConstraintOp::In,
                values: vec!["west".to_owned()],
            }],
        );
        let mut east = StoreInfo::new(1, "");
        east.labels = vec![StoreLabel::new("zone", "east")];
        let mut west = StoreInfo::new(2, "");
        west.labels = vec![StoreLabel::new("zone", "west")];
        assert!(!f.target(&cfg, &east));
        assert!(f.target(&cfg, &west));
    }
}
