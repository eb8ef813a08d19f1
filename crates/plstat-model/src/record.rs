use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::leaf::{LeafValue, Value};
use crate::level::Level;
use crate::node::{Group, Node};

/// The canonical per-MOUS record.
///
/// A record is built empty, filled by merging adapter fragments in priority
/// order, and finished with a derived-statistics pass. After assembly it is
/// only mutated by selection pruning.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    pub fields: Group,
}

/// One entry of a flattened value query.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    /// The full node at the queried position.
    Node(Node),
    /// Just the leaf payload (`value_only` queries).
    Value(Value),
    /// The sub-keys of a group hit by a `value_only` query.
    Keys(Vec<String>),
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_group(fields: Group) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.fields.get_mut(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, node: impl Into<Node>) {
        self.fields.insert(key.into(), node.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Node> {
        self.fields.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// Follow a path of group keys down the tree.
    pub fn get_path(&self, path: &[&str]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.fields.get(*first)?;
        for key in rest {
            node = node.as_group()?.get(*key)?;
        }
        Some(node)
    }

    /// The MOUS uid, or the empty string when not yet merged in.
    pub fn uid(&self) -> &str {
        self.get("mous_uid")
            .and_then(Node::as_leaf)
            .and_then(|l| l.value.as_str())
            .unwrap_or("")
    }

    /// The leaf at a top-level key, if that key holds a leaf.
    pub fn leaf(&self, key: &str) -> Option<&LeafValue> {
        self.get(key).and_then(Node::as_leaf)
    }

    /// The group at a logical level.
    pub fn level_group(&self, level: Level) -> ModelResult<&Group> {
        self.get(level.as_str())
            .and_then(Node::as_group)
            .ok_or_else(|| ModelError::LevelNotFound(level.as_str().to_string()))
    }

    /// Field names available at a logical level.
    ///
    /// For `MOUS` this is the record's own top-level keys. For any other
    /// level with `include_sublevel` set, the first sub-entry is sampled as
    /// representative and only its leaf-valued keys are returned (nested
    /// groups and malformed tertiary structures are silently excluded).
    /// With `include_sublevel` unset, the sub-entry identifiers themselves
    /// are returned (e.g. target names).
    pub fn keywords(
        &self,
        level: Level,
        include_sublevel: bool,
        ignore: &[&str],
    ) -> ModelResult<Vec<String>> {
        let mut keywords: Vec<String> = match level {
            Level::Mous => self.fields.keys().cloned().collect(),
            _ => {
                let group = self.level_group(level)?;
                if include_sublevel {
                    match group.values().next().and_then(Node::as_group) {
                        Some(sub) => sub
                            .iter()
                            .filter(|(_, node)| node.is_leaf())
                            .map(|(k, _)| k.clone())
                            .collect(),
                        None => Vec::new(),
                    }
                } else {
                    group.keys().cloned().collect()
                }
            }
        };
        keywords.retain(|k| !ignore.contains(&k.as_str()));
        Ok(keywords)
    }

    /// Like [`keywords`](Self::keywords) but treats an absent level as
    /// "zero keywords" rather than an error.
    pub fn keywords_or_empty(
        &self,
        level: Level,
        include_sublevel: bool,
        ignore: &[&str],
    ) -> Vec<String> {
        self.keywords(level, include_sublevel, ignore)
            .unwrap_or_default()
    }

    /// Resolve which level a bare field name belongs to.
    ///
    /// Probes the levels in [`Level::PROBE_ORDER`]; the first level whose
    /// keyword set contains the field wins. A name present at two levels
    /// therefore resolves to the earlier one.
    pub fn level_of(&self, field: &str) -> Option<Level> {
        Level::PROBE_ORDER
            .into_iter()
            .find(|&level| {
                self.keywords_or_empty(level, true, &[])
                    .iter()
                    .any(|k| k == field)
            })
    }

    /// Flattened query for one field across the record.
    ///
    /// Returns a map keyed `uid|...` mirroring the record path of each hit.
    /// When `level` is `None` it is resolved via [`level_of`](Self::level_of);
    /// an unresolvable field yields an empty map. `subkey` narrows a
    /// group-valued hit to one of its sub-nodes (e.g. key `SPW`, subkey a
    /// spectral window number); hits without that sub-node are dropped.
    ///
    /// Output shaping beyond `value_only` — tabular flattening, list
    /// rendering, repeating hits per row — is deliberately left to
    /// presentation layers; this method always returns the flat
    /// path-keyed map.
    pub fn get_values(
        &self,
        key: &str,
        level: Option<Level>,
        subkey: Option<&str>,
        value_only: bool,
    ) -> BTreeMap<String, QueryResult> {
        let Some(level) = level.or_else(|| self.level_of(key)) else {
            return BTreeMap::new();
        };
        let uid = self.uid().to_string();
        let mut values = BTreeMap::new();
        let mut hit = |path: String, node: &Node| {
            match subkey {
                None => {
                    values.insert(path, query_node(node, value_only));
                }
                Some(sub) => {
                    if let Some(node) = node.as_group().and_then(|g| g.get(sub)) {
                        values.insert(format!("{path}|{sub}"), query_node(node, value_only));
                    }
                }
            }
        };

        if level == Level::Mous {
            if let Some(node) = self.get(key) {
                hit(format!("{uid}|{key}"), node);
            }
            return values;
        }

        let Ok(group) = self.level_group(level) else {
            return values;
        };
        // A key can name either a direct field of the level group or a field
        // of every sub-entry.
        if let Some(node) = group.get(key) {
            hit(format!("{uid}|{}|{key}", level.as_str()), node);
        } else {
            for (entity, sub) in group {
                if let Some(node) = sub.as_group().and_then(|g| g.get(key)) {
                    hit(format!("{uid}|{}|{entity}|{key}", level.as_str()), node);
                }
            }
        }
        values
    }
}

fn query_node(node: &Node, value_only: bool) -> QueryResult {
    if !value_only {
        return QueryResult::Node(node.clone());
    }
    match node {
        Node::Leaf(leaf) => QueryResult::Value(leaf.value.clone()),
        Node::Group(group) => QueryResult::Keys(group.keys().cloned().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar::Scalar;

    fn sample_record() -> Record {
        let json = r#"{
            "mous_uid": {"value": "uid://A001/X1/X2"},
            "proposal_code": {"value": "2023.1.00001.S"},
            "n_EB": {"value": 2},
            "EB": {
                "uid___A002_X1.ms": {
                    "flagdata_manual_flags": {"value": ["flag one", "flag two"]},
                    "n_manualflags": {"value": 2}
                },
                "uid___A002_X2.ms": {
                    "flagdata_manual_flags": {"value": []},
                    "n_manualflags": {"value": 0}
                }
            },
            "TARGET": {
                "NGC1333": {
                    "SPW": {
                        "16": {"makeimages_science_cube_rms": {"value": [0.001, 0.002]}}
                    },
                    "n_images": {"value": 1}
                }
            },
            "STAGE": {
                "1": {"stage_name": {"value": "hifa_importdata"}, "qa_score": {"value": 0.9}}
            }
        }"#;
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn mous_keywords_are_top_level_keys() {
        let rec = sample_record();
        let kw = rec.keywords(Level::Mous, true, &["EB", "TARGET", "STAGE"]).unwrap();
        assert!(kw.contains(&"proposal_code".to_string()));
        assert!(!kw.contains(&"EB".to_string()));
    }

    #[test]
    fn sublevel_keywords_sample_first_entry_leaves_only() {
        let rec = sample_record();
        let kw = rec.keywords(Level::Target, true, &[]).unwrap();
        // SPW is a nested group inside the sampled target and must be excluded.
        assert_eq!(kw, vec!["n_images".to_string()]);
    }

    #[test]
    fn sublevel_identifiers_without_sampling() {
        let rec = sample_record();
        let ids = rec.keywords(Level::Eb, false, &[]).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids[0].starts_with("uid___A002"));
    }

    #[test]
    fn missing_level_is_level_not_found() {
        let rec = sample_record();
        let err = rec.keywords(Level::Spw, true, &[]).unwrap_err();
        assert!(matches!(err, ModelError::LevelNotFound(_)));
        assert!(rec.keywords_or_empty(Level::Spw, true, &[]).is_empty());
    }

    #[test]
    fn level_of_probes_in_fixed_order() {
        let rec = sample_record();
        assert_eq!(rec.level_of("proposal_code"), Some(Level::Mous));
        assert_eq!(rec.level_of("n_manualflags"), Some(Level::Eb));
        assert_eq!(rec.level_of("stage_name"), Some(Level::Stage));
        assert_eq!(rec.level_of("no_such_field"), None);
    }

    #[test]
    fn get_values_at_mous_level() {
        let rec = sample_record();
        let values = rec.get_values("proposal_code", None, None, true);
        assert_eq!(values.len(), 1);
        let (key, value) = values.iter().next().unwrap();
        assert_eq!(key, "uid://A001/X1/X2|proposal_code");
        assert_eq!(
            *value,
            QueryResult::Value(Value::Scalar(Scalar::Str("2023.1.00001.S".into())))
        );
    }

    #[test]
    fn get_values_fans_out_over_entities() {
        let rec = sample_record();
        let values = rec.get_values("n_manualflags", None, None, true);
        assert_eq!(values.len(), 2);
        assert!(values
            .keys()
            .all(|k| k.starts_with("uid://A001/X1/X2|EB|uid___A002")));
    }

    #[test]
    fn get_values_unresolved_field_is_empty() {
        let rec = sample_record();
        assert!(rec.get_values("nonexistent", None, None, false).is_empty());
    }

    #[test]
    fn get_values_subkey_narrows_group_hits() {
        let rec = sample_record();
        let values = rec.get_values("SPW", Some(Level::Target), Some("16"), false);
        assert_eq!(values.len(), 1);
        let (key, value) = values.iter().next().unwrap();
        assert_eq!(key, "uid://A001/X1/X2|TARGET|NGC1333|SPW|16");
        assert!(matches!(value, QueryResult::Node(Node::Group(_))));
        // A subkey no target carries yields nothing.
        assert!(rec
            .get_values("SPW", Some(Level::Target), Some("99"), false)
            .is_empty());
    }

    #[test]
    fn get_path_descends_groups() {
        let rec = sample_record();
        let node = rec
            .get_path(&["TARGET", "NGC1333", "SPW", "16", "makeimages_science_cube_rms"])
            .unwrap();
        assert!(node.is_leaf());
        assert!(rec.get_path(&["TARGET", "missing"]).is_none());
    }

    #[test]
    fn uid_defaults_to_empty() {
        assert_eq!(Record::new().uid(), "");
        assert_eq!(sample_record().uid(), "uid://A001/X1/X2");
    }
}
