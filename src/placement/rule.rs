// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::BTreeSet;
use std::sync::RwLock;

use crate::core::{PeerRole, StoreInfo};
use crate::util::keyutil;

/// The role a rule demands of its peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleRole {
    Leader,
    Voter,
    Follower,
    Learner,
}

impl RuleRole {
    /// The raft peer role a rule role maps to when creating a peer.
    pub fn peer_role(self) -> PeerRole {
        match self {
            RuleRole::Learner => PeerRole::Learner,
            _ => PeerRole::Voter,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LabelConstraintOp {
    In,
    NotIn,
    Exists,
    NotExists,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelConstraint {
    pub key: String,
    pub op: LabelConstraintOp,
    #[serde(default)]
    pub values: Vec<String>,
}

impl LabelConstraint {
    pub fn matches_store(&self, store: &StoreInfo) -> bool {
        let value = store.label_value(&self.key);
        match self.op {
            LabelConstraintOp::In => {
                value.map_or(false, |v| self.values.iter().any(|x| x == v))
            }
            LabelConstraintOp::NotIn => {
                value.map_or(true, |v| !self.values.iter().any(|x| x == v))
            }
            LabelConstraintOp::Exists => value.is_some(),
            LabelConstraintOp::NotExists => value.is_none(),
        }
    }
}

pub fn match_label_constraints(store: &StoreInfo, constraints: &[LabelConstraint]) -> bool {
    constraints.iter().all(|c| c.matches_store(store))
}

/// One placement rule. Rules of the same group apply in `index` order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Rule {
    pub group_id: String,
    pub id: String,
    #[serde(default)]
    pub index: i32,
    #[serde(default)]
    pub start_key: Vec<u8>,
    #[serde(default)]
    pub end_key: Vec<u8>,
    pub role: RuleRole,
    pub count: usize,
    #[serde(default)]
    pub label_constraints: Vec<LabelConstraint>,
    #[serde(default)]
    pub location_labels: Vec<String>,
    #[serde(default)]
    pub isolation_level: String,
}

impl Rule {
    pub fn key(&self) -> (String, String) {
        (self.group_id.clone(), self.id.clone())
    }

    /// Whether the rule's key range fully covers `[start_key, end_key)`.
    pub fn covers(&self, start_key: &[u8], end_key: &[u8]) -> bool {
        self.start_key.as_slice() <= start_key
            && (self.end_key.is_empty()
                || (!end_key.is_empty()
                    && keyutil::cmp_end_key(end_key, &self.end_key) != std::cmp::Ordering::Greater))
    }
}

/// Keeps the rule list sorted by (group, index, id). A default rule
/// mirroring the replica configuration is installed at construction.
#[derive(Debug)]
pub struct RuleManager {
    rules: RwLock<Vec<Rule>>,
}

impl RuleManager {
    pub fn new(max_replicas: usize, location_labels: &[String]) -> RuleManager {
        let default_rule = Rule {
            group_id: "pd".to_owned(),
            id: "default".to_owned(),
            index: 0,
            start_key: Vec::new(),
            end_key: Vec::new(),
            role: RuleRole::Voter,
            count: max_replicas,
            label_constraints: Vec::new(),
            location_labels: location_labels.to_vec(),
            isolation_level: String::new(),
        };
        RuleManager {
            rules: RwLock::new(vec![default_rule]),
        }
    }

    pub fn get_rules(&self) -> Vec<Rule> {
        self.rules.read().unwrap().clone()
    }

    pub fn set_rule(&self, rule: Rule) {
        let mut rules = self.rules.write().unwrap();
        rules.retain(|r| r.key() != rule.key());
        rules.push(rule);
        rules.sort_by(|a, b| {
            (&a.group_id, a.index, &a.id).cmp(&(&b.group_id, b.index, &b.id))
        });
    }

    pub fn delete_rule(&self, group_id: &str, id: &str) {
        self.rules
            .write()
            .unwrap()
            .retain(|r| !(r.group_id == group_id && r.id == id));
    }

    /// Rules whose range fully covers the region. A region matched by no
    /// rule spans a rule boundary and must be split first.
    pub fn get_rules_for_apply_region(&self, start_key: &[u8], end_key: &[u8]) -> Vec<Rule> {
        self.rules
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.covers(start_key, end_key))
            .cloned()
            .collect()
    }

    /// Rule boundary keys strictly inside `(start_key, end_key)`.
    pub fn get_split_keys(&self, start_key: &[u8], end_key: &[u8]) -> Vec<Vec<u8>> {
        let mut keys = BTreeSet::new();
        for rule in self.rules.read().unwrap().iter() {
            for key in [&rule.start_key, &rule.end_key] {
                if !key.is_empty()
                    && key.as_slice() > start_key
                    && (end_key.is_empty() || key.as_slice() < end_key)
                {
                    keys.insert(key.clone());
                }
            }
        }
        keys.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StoreLabel;

    fn store_with_labels(id: u64, labels: &[(&str, &str)]) -> StoreInfo {
        let mut s = StoreInfo::new(id, "");
        s.labels = labels.iter().map(|(k, v)| StoreLabel::new(k, v)).collect();
        s
    }

    #[test]
    fn test_label_constraints() {
        let store = store_with_labels(1, &[("zone", "east")]);
        let in_east = LabelConstraint {
            key: "zone".to_owned(),
            op: LabelConstraintOp::In,
            values: vec!["east".to_owned()],
        };
        let not_west = LabelConstraint {
            key: "zone".to_owned(),
            op: LabelConstraintOp::NotIn,
            values: vec!["west".to_owned()],
        };
        let has_disk = LabelConstraint {
            key: "disk".to_owned(),
            op: LabelConstraintOp::Exists,
            values: vec![],
        };
        assert!(in_east.matches_store(&store));
        assert!(not_west.matches_store(&store));
        assert!(!has_disk.matches_store(&store));
        assert!(match_label_constraints(&store, &[in_east, not_west]));
    }

    #[test]
    fn test_default_rule() {
        let m = RuleManager::new(3, &[]);
        let rules = m.get_rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].count, 3);
        assert_eq!(rules[0].role, RuleRole::Voter);
        assert!(rules[0].covers(b"a", b"z"));
        assert!(rules[0].covers(b"", b""));
    }

    #[test]
    fn test_rules_for_apply_region() {
        let m = RuleManager::new(3, &[]);
        let mut scoped = m.get_rules()[0].clone();
        scoped.id = "scoped".to_owned();
        scoped.index = 1;
        scoped.start_key = b"m".to_vec();
        scoped.end_key = b"t".to_vec();
        m.set_rule(scoped);

        // A region inside the scoped range matches both rules.
        assert_eq!(m.get_rules_for_apply_region(b"n", b"p").len(), 2);
        // A region crossing the scoped boundary only matches the default
        // rule.
        assert_eq!(m.get_rules_for_apply_region(b"a", b"p").len(), 1);
        assert_eq!(m.get_split_keys(b"", b""), vec![b"m".to_vec(), b"t".to_vec()]);
        assert_eq!(m.get_split_keys(b"m", b"t"), Vec::<Vec<u8>>::new());
    }

    #[test]
    fn test_set_rule_replaces_and_sorts() {
        let m = RuleManager::new(3, &[]);
        let mut r = m.get_rules()[0].clone();
        r.count = 5;
        m.set_rule(r);
        let rules = m.get_rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].count, 5);
    }
}
