// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use crate::core::RegionInfo;
use crate::operator::{create_promote_learner_operator, Operator};

/// Promotes learners left behind by interrupted membership changes.
/// Used on the legacy path when placement rules are disabled.
pub struct LearnerChecker;

impl LearnerChecker {
    pub fn new() -> LearnerChecker {
        LearnerChecker
    }

    pub fn check(&self, region: &RegionInfo) -> Option<Operator> {
        for peer in region.get_learners() {
            if region.get_pending_learner(peer.id).is_some() {
                continue;
            }
            match create_promote_learner_operator("promote-learner", region, peer) {
                Ok(op) => return Some(op),
                Err(e) => {
                    debug!("fail to create promote learner operator"; "err" => %e);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Peer, Region};
    use crate::operator::OpStep;

    #[test]
    fn test_promotes_idle_learner() {
        let checker = LearnerChecker::new();

        let mut r = Region::new(1, b"", b"");
        r.peers = vec![Peer::new(10, 1), Peer::new_learner(11, 2)];
        let mut region = RegionInfo::new(r);
        region.leader = Some(Peer::new(10, 1));

        let op = checker.check(&region).unwrap();
        assert!(matches!(op.steps()[0], OpStep::PromoteLearner(_)));

        // A pending learner is left alone.
        region.pending_peers = vec![*region.get_peer(11).unwrap()];
        assert!(checker.check(&region).is_none());
    }
}
