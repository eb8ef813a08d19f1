//! Record assembly: merge adapter fragments, then derive summary statistics.
//!
//! Merge order is fixed (stats, report with timings, supplemental stats,
//! table summaries) and first writer wins, so the stats file is
//! authoritative for any field more than one source provides.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use plstat_merge::merge_into;
use plstat_model::{LeafValue, Level, Node, Record};

use crate::adapters::{load_report_file, load_stats_file, load_suppl_file, load_table_file};
use crate::discover::RunSources;
use crate::error::IngestResult;

/// Per-EB field holding the list of manually applied flag commands.
const MANUAL_FLAGS_FIELD: &str = "flagdata_manual_flags";

/// Image product types, longest names first so `cube_selfcal` is not
/// claimed by `cube`.
const IMAGE_TYPES: [&str; 6] = [
    "mfs_selfcal",
    "cube_selfcal",
    "cont_selfcal",
    "mfs",
    "cube",
    "cont",
];

/// Per-image statistics that get a per-target median across SPWs.
const MEDIAN_METRICS: [&str; 6] = ["bmaj", "bmin", "bpa", "rms", "mad", "max"];

/// Build one record from the located inputs of a run.
pub fn assemble(sources: &RunSources) -> IngestResult<Record> {
    let stats = load_stats_file(&sources.stats)?;
    let mut fields = stats.fragment;

    match &sources.report {
        Some(report) => {
            let fragment = load_report_file(report, sources.timing.as_deref())?;
            merge_into(&mut fields, &fragment);
        }
        None => debug!(stats = %sources.stats.display(), "no aggregate report"),
    }
    match &sources.suppl {
        Some(suppl) => merge_into(&mut fields, &load_suppl_file(suppl)?),
        None => debug!(stats = %sources.stats.display(), "no supplemental stats"),
    }
    for table in &sources.tables {
        merge_into(&mut fields, &load_table_file(table)?);
    }

    let mut record = Record::from_group(fields);
    derive_statistics(&mut record);
    Ok(record)
}

/// Add the derived summary fields to an assembled record.
///
/// Per EB: `n_manualflags`. Per SPW: `n_images`, rolled up to the target
/// and the record. Per target: NaN-safe medians of the per-image statistics
/// across SPWs, plus a median signal-to-noise per image type. Record level:
/// the flattened `manual_flags` list and the `eb_list` / `spw_list` /
/// `target_list` index fields with their counts.
pub fn derive_statistics(record: &mut Record) {
    derive_flag_counts(record);
    derive_image_counts(record);
    derive_target_medians(record);
    derive_index_fields(record);
}

fn derive_flag_counts(record: &mut Record) {
    let Some(eb_group) = record.get_mut("EB").and_then(Node::as_group_mut) else {
        return;
    };
    let mut all_flags = Vec::new();
    for (eb, entry) in eb_group.iter_mut() {
        let Some(entry) = entry.as_group_mut() else { continue };
        let flags: Vec<String> = entry
            .get(MANUAL_FLAGS_FIELD)
            .and_then(Node::as_leaf)
            .and_then(|l| l.value.as_list())
            .map(|items| items.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default();
        entry.insert(
            "n_manualflags".into(),
            Node::Leaf(LeafValue::int(flags.len() as i64)),
        );
        all_flags.extend(flags.into_iter().map(|flag| format!("{eb} {flag}")));
    }
    record.insert("manual_flags", LeafValue::str_list(all_flags));
}

fn derive_image_counts(record: &mut Record) {
    let Some(target_group) = record.get_mut("TARGET").and_then(Node::as_group_mut) else {
        return;
    };
    let mut record_total = 0i64;
    for entry in target_group.values_mut() {
        let Some(entry) = entry.as_group_mut() else { continue };
        let mut target_total = 0i64;
        if let Some(spw_group) = entry.get_mut("SPW").and_then(Node::as_group_mut) {
            for spw in spw_group.values_mut() {
                let Some(spw) = spw.as_group_mut() else { continue };
                let n = spw
                    .iter()
                    .filter(|(name, node)| node.is_leaf() && name.contains("rms"))
                    .count() as i64;
                spw.insert("n_images".into(), Node::Leaf(LeafValue::int(n)));
                target_total += n;
            }
        }
        entry.insert("n_images".into(), Node::Leaf(LeafValue::int(target_total)));
        record_total += target_total;
    }
    record.insert("n_images", LeafValue::int(record_total));
}

fn derive_target_medians(record: &mut Record) {
    let Some(target_group) = record.get_mut("TARGET").and_then(Node::as_group_mut) else {
        return;
    };
    for entry in target_group.values_mut() {
        let Some(entry) = entry.as_group_mut() else { continue };
        let mut samples: BTreeMap<(&str, &str), Vec<f64>> = BTreeMap::new();
        if let Some(spw_group) = entry.get("SPW").and_then(Node::as_group) {
            for spw in spw_group.values() {
                let Some(spw) = spw.as_group() else { continue };
                for (name, node) in spw {
                    let Some(leaf) = node.as_leaf() else { continue };
                    let Some(kind) = classify_image_field(name) else { continue };
                    append_numeric(leaf, samples.entry(kind).or_default());
                }
            }
        }

        let mut medians: BTreeMap<&str, BTreeMap<&str, f64>> = BTreeMap::new();
        for (&(image_type, metric), values) in &samples {
            if let Some(m) = median(values) {
                medians.entry(image_type).or_default().insert(metric, m);
            }
        }
        for (image_type, by_metric) in medians {
            for (metric, m) in &by_metric {
                entry.insert(
                    format!("median_{image_type}_{metric}"),
                    Node::Leaf(LeafValue::float(*m)),
                );
            }
            if let (Some(max), Some(rms)) = (by_metric.get("max"), by_metric.get("rms")) {
                if *rms != 0.0 {
                    entry.insert(
                        format!("median_{image_type}_snr"),
                        Node::Leaf(LeafValue::float(max / rms)),
                    );
                }
            }
        }
    }
}

fn derive_index_fields(record: &mut Record) {
    if let Some(ebs) = level_keys(record, Level::Eb) {
        insert_index_fields(record, Level::Eb, ebs);
    }
    if let Some(targets) = level_keys(record, Level::Target) {
        insert_index_fields(record, Level::Target, targets);

        // SPW groups live per target, so the SPW index is their union.
        let mut spws = BTreeSet::new();
        if let Some(target_group) = record.get("TARGET").and_then(Node::as_group) {
            for entry in target_group.values() {
                let spw_group = entry
                    .as_group()
                    .and_then(|g| g.get("SPW"))
                    .and_then(Node::as_group);
                if let Some(spw_group) = spw_group {
                    spws.extend(spw_group.keys().cloned());
                }
            }
        }
        insert_index_fields(record, Level::Spw, spws.into_iter().collect());
    }
}

/// Write a level's count and entity-list index fields.
fn insert_index_fields(record: &mut Record, level: Level, names: Vec<String>) {
    let (Some(count), Some(list)) = (level.count_field(), level.list_field()) else {
        return;
    };
    record.insert(count, LeafValue::int(names.len() as i64));
    record.insert(list, LeafValue::str_list(names));
}

fn level_keys(record: &Record, level: Level) -> Option<Vec<String>> {
    record
        .get(level.as_str())
        .and_then(Node::as_group)
        .map(|g| g.keys().cloned().collect())
}

/// Split an image-statistic field name into `(image type, metric)`.
///
/// `makeimages_science_cube_rms` classifies as `("cube", "rms")`; field
/// names without a known type or metric are skipped.
fn classify_image_field(name: &str) -> Option<(&'static str, &'static str)> {
    let metric = MEDIAN_METRICS
        .iter()
        .copied()
        .find(|m| name.ends_with(&format!("_{m}")))?;
    let image_type = IMAGE_TYPES
        .iter()
        .copied()
        .find(|t| name.contains(&format!("_{t}_")))?;
    Some((image_type, metric))
}

fn append_numeric(leaf: &LeafValue, out: &mut Vec<f64>) {
    use plstat_model::Value;
    match &leaf.value {
        Value::Scalar(s) => out.extend(s.as_f64()),
        Value::List(items) => out.extend(items.iter().filter_map(|s| s.as_f64())),
    }
}

/// Median over the finite values; `None` when nothing finite remains.
fn median(values: &[f64]) -> Option<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    Some(if v.len() % 2 == 1 {
        v[mid]
    } else {
        (v[mid - 1] + v[mid]) / 2.0
    })
}
