// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;

use crate::core::{ResourceKind, ScheduleKind, SchedulePolicy};
use crate::operator::StoreLimitType;

/// Bookkeeping delta a set of operators applies to one store.
#[derive(Clone, Debug, Default)]
pub struct StoreInfluence {
    pub region_size: i64,
    pub region_count: i64,
    pub leader_size: i64,
    pub leader_count: i64,
    pub step_cost: HashMap<StoreLimitType, i64>,
}

impl StoreInfluence {
    pub fn resource_property(&self, kind: ScheduleKind) -> i64 {
        match kind.resource {
            ResourceKind::Leader => match kind.policy {
                SchedulePolicy::Count => self.leader_count,
                SchedulePolicy::Size => self.leader_size,
            },
            ResourceKind::Region => self.region_size,
        }
    }

    pub fn adjust_step_cost(&mut self, limit_type: StoreLimitType, cost: i64) {
        *self.step_cost.entry(limit_type).or_insert(0) += cost;
    }

    pub fn get_step_cost(&self, limit_type: StoreLimitType) -> i64 {
        self.step_cost.get(&limit_type).copied().unwrap_or(0)
    }
}

/// Influence of the in-flight operators, per store.
#[derive(Clone, Debug, Default)]
pub struct OpInfluence {
    stores: HashMap<u64, StoreInfluence>,
}

impl OpInfluence {
    pub fn new() -> OpInfluence {
        OpInfluence::default()
    }

    pub fn get_store_influence(&mut self, store_id: u64) -> &mut StoreInfluence {
        self.stores.entry(store_id).or_default()
    }

    pub fn store_influence(&self, store_id: u64) -> Option<&StoreInfluence> {
        self.stores.get(&store_id)
    }

    pub fn resource_property(&self, store_id: u64, kind: ScheduleKind) -> i64 {
        self.stores
            .get(&store_id)
            .map_or(0, |s| s.resource_property(kind))
    }

    pub fn stores(&self) -> impl Iterator<Item = (&u64, &StoreInfluence)> {
        self.stores.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_property() {
        let mut infl = OpInfluence::new();
        {
            let s = infl.get_store_influence(1);
            s.leader_count = 2;
            s.leader_size = 64;
            s.region_size = 128;
        }
        let leader_count = ScheduleKind::new(ResourceKind::Leader, SchedulePolicy::Count);
        let leader_size = ScheduleKind::new(ResourceKind::Leader, SchedulePolicy::Size);
        let region = ScheduleKind::new(ResourceKind::Region, SchedulePolicy::Size);
        assert_eq!(infl.resource_property(1, leader_count), 2);
        assert_eq!(infl.resource_property(1, leader_size), 64);
        assert_eq!(infl.resource_property(1, region), 128);
        assert_eq!(infl.resource_property(9, region), 0);
    }

    #[test]
    fn test_step_cost() {
        let mut s = StoreInfluence::default();
        s.adjust_step_cost(StoreLimitType::AddPeer, 20);
        s.adjust_step_cost(StoreLimitType::AddPeer, 30);
        assert_eq!(s.get_step_cost(StoreLimitType::AddPeer), 50);
        assert_eq!(s.get_step_cost(StoreLimitType::RemovePeer), 0);
    }
}
