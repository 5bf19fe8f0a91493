// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;

use crate::core::{Peer, RegionInfo, StoreInfo};
use crate::placement::{match_label_constraints, Rule, RuleRole};

/// Peers assigned to one rule.
#[derive(Clone, Debug)]
pub struct RuleFit {
    pub rule: Rule,
    pub peers: Vec<Peer>,
    /// Assigned peers whose current role does not yet match the rule.
    pub peers_with_different_role: Vec<Peer>,
}

impl RuleFit {
    /// Count reached and every peer in its demanded role.
    pub fn is_satisfied(&self) -> bool {
        self.peers.len() == self.rule.count && self.peers_with_different_role.is_empty()
    }
}

/// Best-effort assignment of a region's peers to the applicable rules.
#[derive(Clone, Debug, Default)]
pub struct RegionFit {
    pub rule_fits: Vec<RuleFit>,
    /// Peers matched by no rule.
    pub orphan_peers: Vec<Peer>,
}

impl RegionFit {
    pub fn is_satisfied(&self) -> bool {
        !self.rule_fits.is_empty()
            && self.rule_fits.iter().all(|rf| rf.is_satisfied())
            && self.orphan_peers.is_empty()
    }

    pub fn get_rule_fit(&self, peer_id: u64) -> Option<&RuleFit> {
        self.rule_fits
            .iter()
            .find(|rf| rf.peers.iter().any(|p| p.id == peer_id))
    }
}

fn role_matches(rule_role: RuleRole, peer: &Peer, is_leader: bool) -> bool {
    match rule_role {
        RuleRole::Learner => peer.is_learner(),
        RuleRole::Voter => peer.is_voter(),
        RuleRole::Leader => peer.is_voter() && is_leader,
        RuleRole::Follower => peer.is_voter() && !is_leader,
    }
}

/// Greedy fit: rules in priority order pick their peers among those whose
/// store satisfies the label constraints, exact role matches first.
/// Whatever remains unassigned is an orphan.
pub fn fit_region(stores: &[StoreInfo], region: &RegionInfo, rules: &[Rule]) -> RegionFit {
    let store_by_id: HashMap<u64, &StoreInfo> = stores.iter().map(|s| (s.id, s)).collect();
    let leader_id = region.get_leader().map_or(0, |p| p.id);

    let mut unassigned: Vec<Peer> = region.get_peers().to_vec();
    let mut rule_fits = Vec::with_capacity(rules.len());

    for rule in rules {
        let mut candidates: Vec<usize> = unassigned
            .iter()
            .enumerate()
            .filter(|(_, p)| match (rule.role, p.is_learner()) {
                // A learner rule never captures voters.
                (RuleRole::Learner, false) => false,
                _ => store_by_id
                    .get(&p.store_id)
                    .map_or(false, |s| match_label_constraints(s, &rule.label_constraints)),
            })
            .map(|(i, _)| i)
            .collect();

        // Exact role matches first, then stable by peer id.
        candidates.sort_by_key(|&i| {
            let p = &unassigned[i];
            let exact = role_matches(rule.role, p, p.id == leader_id);
            (!exact, p.id)
        });
        candidates.truncate(rule.count);

        let mut peers = Vec::with_capacity(candidates.len());
        // Remove back to front so indexes stay valid.
        candidates.sort_unstable_by(|a, b| b.cmp(a));
        for i in candidates {
            peers.push(unassigned.remove(i));
        }
        peers.sort_by_key(|p| p.id);

        let peers_with_different_role = peers
            .iter()
            .filter(|p| !role_matches(rule.role, p, p.id == leader_id))
            .cloned()
            .collect();
        rule_fits.push(RuleFit {
            rule: rule.clone(),
            peers,
            peers_with_different_role,
        });
    }

    RegionFit {
        rule_fits,
        orphan_peers: unassigned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Peer, Region, RegionInfo, StoreLabel};
    use crate::placement::{LabelConstraint, LabelConstraintOp, RuleManager};

    fn stores(labels: &[(u64, &str)]) -> Vec<StoreInfo> {
        labels
            .iter()
            .map(|&(id, zone)| {
                let mut s = StoreInfo::new(id, "");
                s.labels = vec![StoreLabel::new("zone", zone)];
                s
            })
            .collect()
    }

    fn region(stores: &[u64], leader: u64) -> RegionInfo {
        let mut r = Region::new(1, b"", b"");
        for (i, &s) in stores.iter().enumerate() {
            r.peers.push(Peer::new(10 + i as u64, s));
        }
        let mut info = RegionInfo::new(r);
        info.leader = info.get_store_peer(leader).cloned();
        info
    }

    #[test]
    fn test_satisfied_fit() {
        let stores = stores(&[(1, "a"), (2, "b"), (3, "c")]);
        let region = region(&[1, 2, 3], 1);
        let rules = RuleManager::new(3, &[]).get_rules();
        let fit = fit_region(&stores, &region, &rules);
        assert!(fit.is_satisfied());
        assert_eq!(fit.rule_fits[0].peers.len(), 3);
        assert!(fit.orphan_peers.is_empty());
    }

    #[test]
    fn test_under_count() {
        let stores = stores(&[(1, "a"), (2, "b"), (3, "c")]);
        let region = region(&[1, 2], 1);
        let rules = RuleManager::new(3, &[]).get_rules();
        let fit = fit_region(&stores, &region, &rules);
        assert!(!fit.is_satisfied());
        assert_eq!(fit.rule_fits[0].peers.len(), 2);
    }

    #[test]
    fn test_orphan_peer() {
        let stores = stores(&[(1, "a"), (2, "b"), (3, "c"), (4, "d")]);
        let region = region(&[1, 2, 3, 4], 1);
        let rules = RuleManager::new(3, &[]).get_rules();
        let fit = fit_region(&stores, &region, &rules);
        assert_eq!(fit.rule_fits[0].peers.len(), 3);
        assert_eq!(fit.orphan_peers.len(), 1);
        assert_eq!(fit.orphan_peers[0].store_id, 4);
    }

    #[test]
    fn test_learner_in_voter_rule_has_different_role() {
        let stores = stores(&[(1, "a"), (2, "b"), (3, "c")]);
        let mut region = region(&[1, 2, 3], 1);
        region.region.peers[2] = Peer::new_learner(12, 3);
        let rules = RuleManager::new(3, &[]).get_rules();
        let fit = fit_region(&stores, &region, &rules);
        assert_eq!(fit.rule_fits[0].peers.len(), 3);
        assert_eq!(fit.rule_fits[0].peers_with_different_role.len(), 1);
        assert!(!fit.rule_fits[0].is_satisfied());
    }

    #[test]
    fn test_leader_rule_with_constraint() {
        // Leader must live in zone west; the current leader is in east.
        let stores = stores(&[(1, "east"), (2, "west"), (3, "west")]);
        let region = region(&[1, 2, 3], 1);
        let mut leader_rule = RuleManager::new(3, &[]).get_rules()[0].clone();
        leader_rule.id = "leader-west".to_owned();
        leader_rule.role = crate::placement::RuleRole::Leader;
        leader_rule.count = 1;
        leader_rule.label_constraints = vec![LabelConstraint {
            key: "zone".to_owned(),
            op: LabelConstraintOp::In,
            values: vec!["west".to_owned()],
        }];
        let voter_rule = {
            let mut r = RuleManager::new(2, &[]).get_rules()[0].clone();
            r.index = 1;
            r
        };
        let fit = fit_region(&stores, &region, &[leader_rule, voter_rule]);
        // The west peer picked by the leader rule is not the leader yet.
        assert_eq!(fit.rule_fits[0].peers.len(), 1);
        assert_eq!(fit.rule_fits[0].peers_with_different_role.len(), 1);
    }
}
