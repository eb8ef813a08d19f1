//! A set of assembled records and the operations that work across them.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, warn};

use plstat_ingest::{assemble, derive_statistics, discover_uids, RunSources};
use plstat_model::{Level, LeafValue, ModelError, Node, QueryResult, Record, Value};

use crate::error::{CollectionResult, QueryError};

/// A selection operator, parsed from its CLI spelling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Ge,
    Le,
    Contains,
}

impl FromStr for Op {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            ">=" => Ok(Self::Ge),
            "<=" => Ok(Self::Le),
            "contains" => Ok(Self::Contains),
            other => Err(QueryError::InvalidOperator(other.to_string())),
        }
    }
}

/// An in-memory set of per-MOUS records.
///
/// Batch loading is robust by design: a record that fails to assemble is
/// logged and skipped, never fatal for the collection.
#[derive(Clone, Debug, Default)]
pub struct Collection {
    pub records: Vec<Record>,
}

impl Collection {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Assemble one record per MOUS found in a directory.
    ///
    /// `index` picks which run of each MOUS to use when several are present
    /// (`0` first, `-1` last).
    pub fn from_directory(dir: &Path, index: i64) -> CollectionResult<Self> {
        let uids = discover_uids(dir)?;
        Ok(Self::new(load_uids(dir, &uids, index)))
    }

    /// Assemble records for the uids named in a list file.
    ///
    /// One uid per line; `#` comments and blank lines are skipped.
    pub fn from_uid_list(list: &Path, dir: &Path, index: i64) -> CollectionResult<Self> {
        let file = std::fs::File::open(list)?;
        let mut uids = Vec::new();
        for line in std::io::BufReader::new(file).lines() {
            let line = line?;
            let uid = line.trim();
            if uid.is_empty() || uid.starts_with('#') {
                continue;
            }
            uids.push(uid.to_string());
        }
        Ok(Self::new(load_uids(dir, &uids, index)))
    }

    /// Field names at a level, sampled from the first record.
    pub fn keywords(&self, level: Level, include_sublevel: bool, ignore: &[&str]) -> Vec<String> {
        self.records
            .first()
            .map(|r| r.keywords_or_empty(level, include_sublevel, ignore))
            .unwrap_or_default()
    }

    /// Flattened query for one field across every record.
    pub fn get_values(
        &self,
        key: &str,
        level: Option<Level>,
        subkey: Option<&str>,
        value_only: bool,
    ) -> BTreeMap<String, QueryResult> {
        let mut values = BTreeMap::new();
        for record in &self.records {
            values.extend(record.get_values(key, level, subkey, value_only));
        }
        values
    }

    /// Keep only the records (or sub-entries) matching a predicate.
    ///
    /// A MOUS-level predicate keeps or drops whole records. A predicate at
    /// any other level prunes the non-matching sub-entries in place, then
    /// refreshes the derived index fields and counts; a record whose level
    /// group is emptied out is dropped. Returns the surviving record count.
    pub fn select(
        &mut self,
        field: &str,
        op: &str,
        value: &str,
        level: Option<Level>,
    ) -> CollectionResult<usize> {
        let op = Op::from_str(op)?;
        let level = match level {
            Some(level) => level,
            None => self
                .records
                .iter()
                .find_map(|r| r.level_of(field))
                .ok_or_else(|| ModelError::UnresolvedFieldLevel(field.to_string()))?,
        };
        debug!(field, ?op, value, level = %level.as_str(), "applying selection");

        if level == Level::Mous {
            self.records
                .retain(|r| node_matches(r.get(field), op, value));
        } else {
            self.records.retain_mut(|record| {
                let Some(group) = record.get_mut(level.as_str()).and_then(Node::as_group_mut)
                else {
                    return false;
                };
                group.retain(|_, entry| {
                    let node = entry.as_group().and_then(|g| g.get(field));
                    node_matches(node, op, value)
                });
                if group.is_empty() {
                    return false;
                }
                derive_statistics(record);
                true
            });
        }
        Ok(self.records.len())
    }

    /// Write the surviving MOUS uids, one per line.
    pub fn to_uid_list<W: Write>(&self, writer: &mut W) -> CollectionResult<()> {
        for record in &self.records {
            writeln!(writer, "{}", record.uid())?;
        }
        Ok(())
    }

    pub fn uids(&self) -> Vec<&str> {
        self.records.iter().map(Record::uid).collect()
    }
}

fn load_uids(dir: &Path, uids: &[String], index: i64) -> Vec<Record> {
    let mut records = Vec::new();
    for uid in uids {
        let result = RunSources::for_uid(dir, uid, index).and_then(|s| assemble(&s));
        match result {
            Ok(record) => records.push(record),
            Err(error) => warn!(uid = %uid, error = %error, "skipping record"),
        }
    }
    records
}

/// Evaluate one predicate against a node.
///
/// `>=` and `<=` compare numerically when both the field and the argument
/// parse as floats, and fall back to string ordering otherwise. `==` and
/// `!=` compare the string form; `contains` is a substring test. A missing
/// field never matches.
fn node_matches(node: Option<&Node>, op: Op, value: &str) -> bool {
    let Some(leaf) = node.and_then(Node::as_leaf) else {
        return false;
    };
    let text = leaf_text(leaf);
    match op {
        Op::Eq => text == value,
        Op::Ne => text != value,
        Op::Contains => text.contains(value),
        Op::Ge | Op::Le => {
            let ordering = match (text.parse::<f64>(), value.parse::<f64>()) {
                (Ok(a), Ok(b)) => a.partial_cmp(&b),
                _ => Some(text.as_str().cmp(value)),
            };
            match (op, ordering) {
                (Op::Ge, Some(ord)) => ord.is_ge(),
                (Op::Le, Some(ord)) => ord.is_le(),
                _ => false,
            }
        }
    }
}

fn leaf_text(leaf: &LeafValue) -> String {
    match &leaf.value {
        Value::Scalar(s) => s.to_string(),
        Value::List(items) => items
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> Record {
        serde_json::from_str(json).unwrap()
    }

    fn sample_collection() -> Collection {
        Collection::new(vec![
            record(
                r#"{
                "mous_uid": {"value": "uid://A001/X1/X1"},
                "proposal_code": {"value": "2023.1.00001.S"},
                "n_EB": {"value": 2},
                "EB": {
                    "eb1.ms": {"n_manualflags": {"value": 3}},
                    "eb2.ms": {"n_manualflags": {"value": 0}}
                }
            }"#,
            ),
            record(
                r#"{
                "mous_uid": {"value": "uid://A001/X1/X2"},
                "proposal_code": {"value": "2024.1.00500.S"},
                "n_EB": {"value": 1},
                "EB": {
                    "eb3.ms": {"n_manualflags": {"value": 0}}
                }
            }"#,
            ),
        ])
    }

    #[test]
    fn mous_level_equality_keeps_exactly_the_match() {
        let mut coll = sample_collection();
        let n = coll
            .select("proposal_code", "==", "2023.1.00001.S", None)
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(coll.uids(), vec!["uid://A001/X1/X1"]);
    }

    #[test]
    fn numeric_comparison_on_counts() {
        let mut coll = sample_collection();
        let n = coll.select("n_EB", ">=", "2", None).unwrap();
        assert_eq!(n, 1);
        assert_eq!(coll.uids(), vec!["uid://A001/X1/X1"]);
    }

    #[test]
    fn sublevel_selection_prunes_and_recounts() {
        let mut coll = sample_collection();
        let n = coll.select("n_manualflags", ">=", "1", None).unwrap();
        // Record 2 has no EB with flags and is dropped entirely.
        assert_eq!(n, 1);
        let rec = &coll.records[0];
        let ebs = rec.keywords_or_empty(Level::Eb, false, &[]);
        assert_eq!(ebs, vec!["eb1.ms".to_string()]);
        // The derive pass refreshed the count after pruning.
        assert_eq!(*rec.get("n_EB").unwrap(), Node::Leaf(LeafValue::int(1)));
    }

    #[test]
    fn contains_is_substring_on_string_form() {
        let mut coll = sample_collection();
        let n = coll
            .select("proposal_code", "contains", "2024.", None)
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(coll.uids(), vec!["uid://A001/X1/X2"]);
    }

    #[test]
    fn unknown_operator_is_an_error() {
        let mut coll = sample_collection();
        let err = coll.select("n_EB", "=>", "1", None).unwrap_err();
        assert!(matches!(err, QueryError::InvalidOperator(_)));
    }

    #[test]
    fn unresolvable_field_is_fatal() {
        let mut coll = sample_collection();
        let err = coll.select("no_such_field", "!=", "x", None).unwrap_err();
        assert!(matches!(
            err,
            QueryError::Model(ModelError::UnresolvedFieldLevel(_))
        ));
    }

    #[test]
    fn missing_field_at_explicit_level_never_matches() {
        let mut coll = sample_collection();
        let n = coll
            .select("no_such_field", "!=", "x", Some(Level::Mous))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn get_values_spans_all_records() {
        let coll = sample_collection();
        let values = coll.get_values("proposal_code", None, None, true);
        assert_eq!(values.len(), 2);
        assert!(values.contains_key("uid://A001/X1/X1|proposal_code"));
        assert!(values.contains_key("uid://A001/X1/X2|proposal_code"));
    }

    #[test]
    fn uid_list_roundtrip() {
        let coll = sample_collection();
        let mut out = Vec::new();
        coll.to_uid_list(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "uid://A001/X1/X1\nuid://A001/X1/X2\n"
        );
    }

    #[test]
    fn from_directory_skips_broken_records() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("pipeline_stats_uid___A001_X1_X1.json"),
            r#"{"uid://A001/X1/X1": {"proposal_code": {"value": "2023.1.00001.S"}}}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("pipeline_stats_uid___A001_X1_X2.json"),
            "not json",
        )
        .unwrap();

        let coll = Collection::from_directory(dir.path(), 0).unwrap();
        assert_eq!(coll.len(), 1);
        assert_eq!(coll.uids(), vec!["uid://A001/X1/X1"]);
    }

    #[test]
    fn from_uid_list_honors_comments() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("pipeline_stats_uid___A001_X1_X1.json"),
            r#"{"uid://A001/X1/X1": {}}"#,
        )
        .unwrap();
        let list = dir.path().join("uids.txt");
        std::fs::write(&list, "# survivors\n\nuid://A001/X1/X1\n").unwrap();

        let coll = Collection::from_uid_list(&list, dir.path(), 0).unwrap();
        assert_eq!(coll.len(), 1);
    }
}
