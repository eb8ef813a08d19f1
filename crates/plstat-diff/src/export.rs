//! Flat tabular export of a diff tree.
//!
//! Each selected top-level group becomes one section: a comment line, a row
//! of field names, one row each of PL1 values, PL2 values, and deltas, then
//! a blank separator row.

use std::io::Write;

use plstat_model::{Group, LeafValue, Node, Value};

use crate::error::DiffResult;
use crate::record_diff::Diff;

/// Write selected sections of a diff as CSV.
///
/// `selection` names top-level groups of the diff (e.g. `MOUS`, `STAGE`,
/// `TARGET`); `sub` substring-filters field names within each section.
/// Unknown selection names are skipped silently (a record legitimately may
/// have no FLUX data).
pub fn export_csv<W: Write>(
    diff: &Diff,
    selection: &[String],
    sub: Option<&str>,
    writer: &mut W,
) -> DiffResult<()> {
    for name in selection {
        let Some(group) = diff.get(name).and_then(Node::as_group) else {
            continue;
        };
        let mut entries = Vec::new();
        collect_entries(group, String::new(), &mut entries);
        if let Some(sub) = sub {
            entries.retain(|(path, _)| field_name(path).contains(sub));
        }
        if name == "MOUS" {
            // The identifying field leads the section.
            if let Some(pos) = entries.iter().position(|(p, _)| p == "proposal_code") {
                let id = entries.remove(pos);
                entries.insert(0, id);
            }
        }
        if entries.is_empty() {
            continue;
        }

        writeln!(writer, "# {name}")?;
        write_row(writer, entries.iter().map(|(path, _)| path.clone()))?;
        write_row(writer, entries.iter().map(|(_, e)| leaf_text(e, "PL1")))?;
        write_row(writer, entries.iter().map(|(_, e)| leaf_text(e, "PL2")))?;
        write_row(writer, entries.iter().map(|(_, e)| leaf_text(e, "diff")))?;
        writeln!(writer)?;
    }
    Ok(())
}

fn collect_entries(group: &Group, prefix: String, out: &mut Vec<(String, Group)>) {
    for (key, node) in group {
        let Node::Group(sub) = node else { continue };
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}|{key}")
        };
        if sub.contains_key("PL1") {
            out.push((path, sub.clone()));
        } else {
            collect_entries(sub, path, out);
        }
    }
}

fn field_name(path: &str) -> &str {
    path.rsplit('|').next().unwrap_or(path)
}

fn leaf_text(entry: &Group, key: &str) -> String {
    match entry.get(key).and_then(Node::as_leaf) {
        Some(leaf) => value_text(leaf),
        None => String::new(),
    }
}

fn value_text(leaf: &LeafValue) -> String {
    match &leaf.value {
        Value::Scalar(s) => s.to_string(),
        Value::List(items) => items
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn write_row<W: Write>(writer: &mut W, cells: impl Iterator<Item = String>) -> std::io::Result<()> {
    let row = cells.map(|c| csv_field(&c)).collect::<Vec<_>>().join(",");
    writeln!(writer, "{row}")
}

fn csv_field(text: &str) -> String {
    if text.contains(',') || text.contains('"') || text.contains('\n') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DiffOptions;
    use crate::record_diff::diff_records;
    use plstat_model::Record;

    fn diff_fixture() -> Diff {
        let pl1: Record = serde_json::from_str(
            r#"{
            "proposal_code": {"value": "2023.1.00001.S"},
            "casa_version": {"value": "6.5.4"},
            "STAGE": {"1": {"stage_name": {"value": "hif_makeimages"}, "qa_score": {"value": 0.8}}}
        }"#,
        )
        .unwrap();
        let pl2: Record = serde_json::from_str(
            r#"{
            "proposal_code": {"value": "2023.1.00001.S"},
            "casa_version": {"value": "6.6.1"},
            "STAGE": {"1": {"stage_name": {"value": "hif_makeimages"}, "qa_score": {"value": 0.6}}}
        }"#,
        )
        .unwrap();
        diff_records(&pl1, &pl2, &DiffOptions::default())
    }

    #[test]
    fn section_layout() {
        let diff = diff_fixture();
        let mut out = Vec::new();
        export_csv(&diff, &["MOUS".to_string()], None, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "# MOUS");
        // proposal_code leads even though BTreeMap order would put casa first.
        assert!(lines[1].starts_with("proposal_code,"));
        assert!(lines[2].contains("2023.1.00001.S"));
        assert!(lines[3].contains("2023.1.00001.S"));
        assert!(lines[4].contains("6.5.4 -- 6.6.1"));
        // Sections end with a blank separator row.
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[5], "");
    }

    #[test]
    fn stage_section_uses_nested_paths() {
        let diff = diff_fixture();
        let mut out = Vec::new();
        export_csv(&diff, &["STAGE".to_string()], None, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("# STAGE\n"));
        assert!(text.contains("1|qa_score"));
    }

    #[test]
    fn sub_filter_narrows_fields() {
        let diff = diff_fixture();
        let mut out = Vec::new();
        export_csv(&diff, &["STAGE".to_string()], Some("qa"), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("qa_score"));
        assert!(!text.contains("stage_name"));
    }

    #[test]
    fn unknown_selection_is_skipped() {
        let diff = diff_fixture();
        let mut out = Vec::new();
        export_csv(&diff, &["FLUX".to_string()], None, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn commas_are_quoted() {
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("plain"), "plain");
    }
}
