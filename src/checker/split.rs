// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use crate::cluster::Cluster;
use crate::core::RegionInfo;
use crate::metrics::CHECKER_COUNTER_VEC;
use crate::operator::{create_split_region_operator, CheckPolicy, OpKind, Operator};

/// Splits regions straddling a forced boundary: key ranges declared by
/// label rules, or placement-rule boundaries.
pub struct SplitChecker {
    cluster: Arc<dyn Cluster>,
}

impl SplitChecker {
    pub fn new(cluster: Arc<dyn Cluster>) -> SplitChecker {
        SplitChecker { cluster }
    }

    pub fn get_type(&self) -> &'static str {
        "split-checker"
    }

    pub fn check(&self, region: &RegionInfo) -> Option<Operator> {
        CHECKER_COUNTER_VEC
            .with_label_values(&["split_checker", "check"])
            .inc();

        let mut desc = "labeler-split-region";
        let mut keys = self
            .cluster
            .get_region_labeler()
            .get_split_keys(region.get_start_key(), region.get_end_key());
        if keys.is_empty() && self.cluster.get_opts().enable_placement_rules {
            desc = "rule-split-region";
            keys = self
                .cluster
                .get_rule_manager()
                .get_split_keys(region.get_start_key(), region.get_end_key());
        }
        if keys.is_empty() {
            return None;
        }

        CHECKER_COUNTER_VEC
            .with_label_values(&["split_checker", "new-operator"])
            .inc();
        match create_split_region_operator(desc, region, OpKind::empty(), CheckPolicy::Usekey, keys)
        {
            Ok(op) => Some(op),
            Err(e) => {
                debug!("create split region operator failed"; "err" => %e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterState;
    use crate::config::ScheduleConfig;
    use crate::core::{Peer, Region};
    use crate::labeler::{LabelRule, RegionLabel};
    use crate::operator::OpStep;

    #[test]
    fn test_label_boundary_forces_split() {
        let cluster = Arc::new(ClusterState::new(ScheduleConfig::default()));
        cluster.get_region_labeler().set_label_rule(LabelRule {
            id: "meta".to_owned(),
            labels: vec![RegionLabel {
                key: "zone".to_owned(),
                value: "meta".to_owned(),
            }],
            ranges: vec![(b"m".to_vec(), b"n".to_vec())],
        });
        let checker = SplitChecker::new(Arc::clone(&cluster) as Arc<dyn Cluster>);

        let mut r = Region::new(1, b"a", b"z");
        r.peers.push(Peer::new(10, 1));
        let region = RegionInfo::new(r);
        let op = checker.check(&region).unwrap();
        match &op.steps()[0] {
            OpStep::SplitRegion(s) => {
                assert_eq!(s.policy, CheckPolicy::Usekey);
                assert_eq!(s.split_keys, vec![b"m".to_vec(), b"n".to_vec()]);
            }
            other => panic!("unexpected step {}", other),
        }

        // A region inside the labeled range does not split.
        let mut inside = Region::new(2, b"m", b"n");
        inside.peers.push(Peer::new(11, 1));
        assert!(checker.check(&RegionInfo::new(inside)).is_none());
    }
}
