// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::core::RegionInfo;
use crate::util::keyutil;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionLabel {
    pub key: String,
    pub value: String,
}

/// A label rule attaches labels to key ranges. Range boundaries are
/// forced split keys so regions never straddle a labeled range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LabelRule {
    pub id: String,
    pub labels: Vec<RegionLabel>,
    pub ranges: Vec<(Vec<u8>, Vec<u8>)>,
}

#[derive(Debug, Default)]
pub struct RegionLabeler {
    rules: RwLock<HashMap<String, LabelRule>>,
}

impl RegionLabeler {
    pub fn new() -> RegionLabeler {
        RegionLabeler::default()
    }

    pub fn set_label_rule(&self, rule: LabelRule) {
        self.rules.write().unwrap().insert(rule.id.clone(), rule);
    }

    pub fn delete_label_rule(&self, id: &str) {
        self.rules.write().unwrap().remove(id);
    }

    /// Labels of every rule whose ranges cover the whole region.
    pub fn get_region_labels(&self, region: &RegionInfo) -> Vec<RegionLabel> {
        let rules = self.rules.read().unwrap();
        let mut labels = Vec::new();
        for rule in rules.values() {
            let covered = rule.ranges.iter().any(|(start, end)| {
                start.as_slice() <= region.get_start_key()
                    && (end.is_empty()
                        || (!region.get_end_key().is_empty()
                            && keyutil::cmp_end_key(region.get_end_key(), end)
                                != std::cmp::Ordering::Greater))
            });
            if covered {
                labels.extend(rule.labels.iter().cloned());
            }
        }
        labels.sort_by(|a, b| (&a.key, &a.value).cmp(&(&b.key, &b.value)));
        labels
    }

    /// Range boundary keys strictly inside `(start_key, end_key)`.
    pub fn get_split_keys(&self, start_key: &[u8], end_key: &[u8]) -> Vec<Vec<u8>> {
        let rules = self.rules.read().unwrap();
        let mut keys = BTreeSet::new();
        for rule in rules.values() {
            for (start, end) in &rule.ranges {
                for key in [start, end] {
                    if !key.is_empty()
                        && key.as_slice() > start_key
                        && (end_key.is_empty() || key.as_slice() < end_key)
                    {
                        keys.insert(key.clone());
                    }
                }
            }
        }
        keys.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Region;

    fn rule(id: &str, start: &[u8], end: &[u8]) -> LabelRule {
        LabelRule {
            id: id.to_owned(),
            labels: vec![RegionLabel {
                key: "zone".to_owned(),
                value: id.to_owned(),
            }],
            ranges: vec![(start.to_vec(), end.to_vec())],
        }
    }

    #[test]
    fn test_split_keys() {
        let labeler = RegionLabeler::new();
        labeler.set_label_rule(rule("r1", b"b", b"d"));
        assert_eq!(
            labeler.get_split_keys(b"", b""),
            vec![b"b".to_vec(), b"d".to_vec()]
        );
        assert_eq!(labeler.get_split_keys(b"b", b"d"), Vec::<Vec<u8>>::new());
        assert_eq!(labeler.get_split_keys(b"a", b"c"), vec![b"b".to_vec()]);
    }

    #[test]
    fn test_region_labels() {
        let labeler = RegionLabeler::new();
        labeler.set_label_rule(rule("r1", b"b", b"d"));
        let inside = RegionInfo::new(Region::new(1, b"b", b"c"));
        let outside = RegionInfo::new(Region::new(2, b"x", b"z"));
        assert_eq!(labeler.get_region_labels(&inside).len(), 1);
        assert!(labeler.get_region_labels(&outside).is_empty());
        labeler.delete_label_rule("r1");
        assert!(labeler.get_region_labels(&inside).is_empty());
    }
}
