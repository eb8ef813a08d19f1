//! Record-level diff: overlay two assembled MOUS records.
//!
//! Traversal order: MOUS scalar fields, then STAGE fields via the by-name
//! stage map, then per-target per-SPW image metrics (rms, max, derived
//! signal-to-noise), then FLUX measurements. A field present on one side
//! only is skipped with a diagnostic, never a failure.

use plstat_model::{Group, LeafValue, Node, Record, Scalar, Value};
use tracing::warn;

use crate::leaf_diff::{diff_leaf, flag_changed, Changed, Delta, LeafDiff, Pdiff};
use crate::leaf_diff::{INCOMPARABLE, UNCHANGED};
use crate::options::DiffOptions;
use crate::stage_map::stage_map;

/// Placeholder for a value the pipeline never produced. A pair of absent
/// markers is omitted from the diff entirely.
pub const ABSENT: &str = "N/A";

/// The record-shaped comparison tree.
///
/// Every compared leaf position holds a group `{PL1, PL2, diff, pdiff?, CF}`
/// of plain leaves, so a diff serializes and queries exactly like a record.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Diff {
    pub fields: Group,
}

impl Diff {
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.fields.get(key)
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

    /// Number of compared leaves whose changed flag is set anywhere.
    pub fn changed_leaves(&self) -> usize {
        count_changed(&self.fields)
    }

    /// Number of compared leaves in total.
    pub fn compared_leaves(&self) -> usize {
        count_entries(&self.fields)
    }
}

fn is_entry(group: &Group) -> bool {
    group.contains_key("PL1")
}

fn entry_changed(group: &Group) -> bool {
    match group.get("CF").and_then(Node::as_leaf) {
        Some(leaf) => match &leaf.value {
            Value::Scalar(Scalar::Bool(b)) => *b,
            Value::List(items) => items.iter().any(|s| matches!(s, Scalar::Bool(true))),
            _ => false,
        },
        None => false,
    }
}

fn count_changed(group: &Group) -> usize {
    group
        .values()
        .map(|node| match node {
            Node::Group(g) if is_entry(g) => usize::from(entry_changed(g)),
            Node::Group(g) => count_changed(g),
            Node::Leaf(_) => 0,
        })
        .sum()
}

fn count_entries(group: &Group) -> usize {
    group
        .values()
        .map(|node| match node {
            Node::Group(g) if is_entry(g) => 1,
            Node::Group(g) => count_entries(g),
            Node::Leaf(_) => 0,
        })
        .sum()
}

fn delta_leaf(delta: &Delta) -> LeafValue {
    match delta {
        Delta::Unchanged => LeafValue::str(UNCHANGED),
        Delta::Incomparable => LeafValue::str(INCOMPARABLE),
        Delta::Str(s) => LeafValue::str(s.clone()),
        Delta::Num(f) => LeafValue::float(*f),
        Delta::NumList(fs) => LeafValue::list(fs.iter().map(|f| Scalar::Float(*f))),
        Delta::StrList(items) => LeafValue::str_list(items.clone()),
    }
}

fn entry_node(diff: &LeafDiff, changed: &Changed) -> Node {
    let mut entry = Group::new();
    entry.insert("PL1".into(), Node::Leaf(LeafValue::new(diff.pl1.clone())));
    entry.insert("PL2".into(), Node::Leaf(LeafValue::new(diff.pl2.clone())));
    entry.insert("diff".into(), Node::Leaf(delta_leaf(&diff.delta)));
    match &diff.pdiff {
        Pdiff::None => {}
        Pdiff::Num(p) => {
            entry.insert("pdiff".into(), Node::Leaf(LeafValue::float(*p)));
        }
        Pdiff::NumList(ps) => {
            entry.insert(
                "pdiff".into(),
                Node::Leaf(LeafValue::list(ps.iter().map(|p| Scalar::Float(*p)))),
            );
        }
    }
    let cf = match changed {
        Changed::Flag(b) => LeafValue::new(Value::Scalar(Scalar::Bool(*b))),
        Changed::PerChannel(bs) => LeafValue::list(bs.iter().map(|b| Scalar::Bool(*b))),
    };
    entry.insert("CF".into(), Node::Leaf(cf));
    Node::Group(entry)
}

fn is_absent(leaf: &LeafValue) -> bool {
    leaf.value.as_str() == Some(ABSENT)
}

/// Compare a pair of leaves under a field's rule; `None` when the pair is a
/// double absent marker and must be omitted.
fn compare_field(
    field: &str,
    l1: &LeafValue,
    l2: &LeafValue,
    opts: &DiffOptions,
) -> Option<(LeafDiff, Changed)> {
    if is_absent(l1) && is_absent(l2) {
        return None;
    }
    let (limit, direction) = opts.rule_for(field);
    let diff = diff_leaf(l1, l2);
    let changed = flag_changed(&diff, limit, direction);
    Some((diff, changed))
}

/// Keep an entry under `diff_only`? `proposal_code` is always retained.
fn keep_entry(field: &str, changed: &Changed, diff: &LeafDiff, opts: &DiffOptions) -> bool {
    if !opts.diff_only || field == "proposal_code" {
        return true;
    }
    changed.any() && !diff.is_unchanged()
}

/// Compare two assembled records.
pub fn diff_records(pl1: &Record, pl2: &Record, opts: &DiffOptions) -> Diff {
    let mut out = Group::new();
    out.insert("MOUS".into(), Node::Group(diff_mous(pl1, pl2, opts)));

    let stages = diff_stages(pl1, pl2, opts);
    if !stages.is_empty() {
        out.insert("STAGE".into(), Node::Group(stages));
    }
    let targets = diff_targets(pl1, pl2, opts);
    if !targets.is_empty() {
        out.insert("TARGET".into(), Node::Group(targets));
    }
    let flux = diff_flux(pl1, pl2, opts);
    if !flux.is_empty() {
        out.insert("FLUX".into(), Node::Group(flux));
    }
    Diff { fields: out }
}

fn diff_mous(pl1: &Record, pl2: &Record, opts: &DiffOptions) -> Group {
    let mut mous = Group::new();
    for (key, node) in &pl1.fields {
        let Node::Leaf(l1) = node else { continue };
        match pl2.get(key) {
            Some(Node::Leaf(l2)) => {
                if let Some((diff, changed)) = compare_field(key, l1, l2, opts) {
                    if keep_entry(key, &changed, &diff, opts) {
                        mous.insert(key.clone(), entry_node(&diff, &changed));
                    }
                }
            }
            Some(Node::Group(_)) => {
                warn!(field = %key, "leaf in PL1 is a group in PL2, skipping");
            }
            None => warn!(field = %key, "field missing in PL2, skipping"),
        }
    }
    for (key, node) in &pl2.fields {
        if node.is_leaf() && !pl1.contains_key(key) {
            warn!(field = %key, "field missing in PL1, skipping");
        }
    }
    mous
}

const STAGE_FIELDS: [&str; 5] = [
    "stage_name",
    "qa_score",
    "task_time",
    "result_time",
    "total_time",
];

fn diff_stages(pl1: &Record, pl2: &Record, opts: &DiffOptions) -> Group {
    let (Some(s1), Some(s2)) = (
        pl1.get("STAGE").and_then(Node::as_group),
        pl2.get("STAGE").and_then(Node::as_group),
    ) else {
        // Missing STAGE on either side means stage comparisons are empty,
        // not an error.
        return Group::new();
    };

    let mut out = Group::new();
    for (n1, n2) in stage_map(s1, s2) {
        let (Some(stage1), Some(stage2)) = (
            s1.get(&n1).and_then(Node::as_group),
            s2.get(&n2).and_then(Node::as_group),
        ) else {
            continue;
        };
        let mut entry = Group::new();
        for field in STAGE_FIELDS {
            match (
                stage1.get(field).and_then(Node::as_leaf),
                stage2.get(field).and_then(Node::as_leaf),
            ) {
                (Some(l1), Some(l2)) => {
                    if let Some((diff, changed)) = compare_field(field, l1, l2, opts) {
                        if keep_entry(field, &changed, &diff, opts) {
                            entry.insert(field.into(), entry_node(&diff, &changed));
                        }
                    }
                }
                (Some(_), None) | (None, Some(_)) => {
                    warn!(stage = %n1, field, "stage field missing on one side, skipping");
                }
                (None, None) => {}
            }
        }
        if !entry.is_empty() {
            out.insert(n1, Node::Group(entry));
        }
    }
    out
}

/// Derived signal-to-noise: max/rms, elementwise for cubes. `None` when the
/// shapes disagree or any rms channel is zero.
fn derive_snr(max: &LeafValue, rms: &LeafValue) -> Option<LeafValue> {
    match (&max.value, &rms.value) {
        (Value::Scalar(m), Value::Scalar(r)) => {
            let (m, r) = (m.as_f64()?, r.as_f64()?);
            (r != 0.0).then(|| LeafValue::float(m / r))
        }
        (Value::List(ms), Value::List(rs)) if ms.len() == rs.len() => {
            let mut out = Vec::with_capacity(ms.len());
            for (m, r) in ms.iter().zip(rs) {
                let (m, r) = (m.as_f64()?, r.as_f64()?);
                if r == 0.0 {
                    return None;
                }
                out.push(Scalar::Float(m / r));
            }
            Some(LeafValue::list(out))
        }
        _ => None,
    }
}

/// Intersect a changed flag with the reference significance cut: only
/// channels whose PL1 signal-to-noise exceeds the floor may flag.
fn apply_snr_cut(changed: Changed, snr1: &LeafValue, floor: f64) -> Changed {
    match (changed, &snr1.value) {
        (Changed::Flag(b), Value::Scalar(s)) => {
            Changed::Flag(b && s.as_f64().is_some_and(|v| v > floor))
        }
        (Changed::PerChannel(bs), Value::List(snrs)) if bs.len() == snrs.len() => {
            Changed::PerChannel(
                bs.into_iter()
                    .zip(snrs)
                    .map(|(b, s)| b && s.as_f64().is_some_and(|v| v > floor))
                    .collect(),
            )
        }
        (changed, _) => changed,
    }
}

fn diff_targets(pl1: &Record, pl2: &Record, opts: &DiffOptions) -> Group {
    let (Some(t1), Some(t2)) = (
        pl1.get("TARGET").and_then(Node::as_group),
        pl2.get("TARGET").and_then(Node::as_group),
    ) else {
        return Group::new();
    };

    let mut out = Group::new();
    for (target, node1) in t1 {
        let Some(node2) = t2.get(target) else {
            warn!(target = %target, "target missing in PL2, skipping");
            continue;
        };
        let (Some(spws1), Some(spws2)) = (
            node1.as_group().and_then(|g| g.get("SPW")).and_then(Node::as_group),
            node2.as_group().and_then(|g| g.get("SPW")).and_then(Node::as_group),
        ) else {
            continue;
        };
        let mut spw_out = Group::new();
        for (spw, spw_node1) in spws1 {
            let Some(spw_node2) = spws2.get(spw) else {
                warn!(target = %target, spw = %spw, "SPW missing in PL2, skipping");
                continue;
            };
            let (Some(g1), Some(g2)) = (spw_node1.as_group(), spw_node2.as_group()) else {
                continue;
            };
            let entries = diff_image_metrics(g1, g2, opts);
            if !entries.is_empty() {
                spw_out.insert(spw.clone(), Node::Group(entries));
            }
        }
        if !spw_out.is_empty() {
            let mut target_entry = Group::new();
            target_entry.insert("SPW".into(), Node::Group(spw_out));
            out.insert(target.clone(), Node::Group(target_entry));
        }
    }
    out
}

fn diff_image_metrics(g1: &Group, g2: &Group, opts: &DiffOptions) -> Group {
    let mut out = Group::new();
    for image_type in &opts.image_types {
        let rms_field = format!("makeimages_science_{image_type}_rms");
        let max_field = format!("makeimages_science_{image_type}_max");
        let snr_field = format!("makeimages_science_{image_type}_snr");

        let rms1 = leaf_of(g1, &rms_field);
        let rms2 = leaf_of(g2, &rms_field);
        let max1 = leaf_of(g1, &max_field);
        let max2 = leaf_of(g2, &max_field);

        // The low-significance cut uses the reference run's S/N: channels
        // the first pipeline barely detected cannot judge the second.
        let snr1 = max1.zip(rms1).and_then(|(m, r)| derive_snr(m, r));
        let snr2 = max2.zip(rms2).and_then(|(m, r)| derive_snr(m, r));

        if let Some((diff, changed)) = compare_optional(&rms_field, rms1, rms2, opts) {
            if keep_entry(&rms_field, &changed, &diff, opts) {
                out.insert(rms_field.clone(), entry_node(&diff, &changed));
            }
        }
        if let Some((diff, mut changed)) = compare_optional(&max_field, max1, max2, opts) {
            if let Some(snr1) = &snr1 {
                changed = apply_snr_cut(changed, snr1, opts.snr_floor);
            }
            if keep_entry(&max_field, &changed, &diff, opts) {
                out.insert(max_field.clone(), entry_node(&diff, &changed));
            }
        }
        if let (Some(s1), Some(s2)) = (&snr1, &snr2) {
            if let Some((diff, changed)) = compare_field(&snr_field, s1, s2, opts) {
                let changed = apply_snr_cut(changed, s1, opts.snr_floor);
                if keep_entry(&snr_field, &changed, &diff, opts) {
                    out.insert(snr_field.clone(), entry_node(&diff, &changed));
                }
            }
        }
    }
    out
}

fn leaf_of<'a>(group: &'a Group, field: &str) -> Option<&'a LeafValue> {
    group.get(field).and_then(Node::as_leaf)
}

fn compare_optional(
    field: &str,
    l1: Option<&LeafValue>,
    l2: Option<&LeafValue>,
    opts: &DiffOptions,
) -> Option<(LeafDiff, Changed)> {
    match (l1, l2) {
        (Some(l1), Some(l2)) => compare_field(field, l1, l2, opts),
        (Some(_), None) | (None, Some(_)) => {
            warn!(field = %field, "image metric missing on one side, skipping");
            None
        }
        (None, None) => None,
    }
}

const FLUX_FIELDS: [&str; 2] = ["value", "fitted_value"];

fn diff_flux(pl1: &Record, pl2: &Record, opts: &DiffOptions) -> Group {
    let (Some(f1), Some(f2)) = (
        pl1.get("FLUX").and_then(Node::as_group),
        pl2.get("FLUX").and_then(Node::as_group),
    ) else {
        return Group::new();
    };

    let mut out = Group::new();
    for (target, node1) in f1 {
        let Some(node2) = f2.get(target) else {
            warn!(target = %target, "flux target missing in PL2, skipping");
            continue;
        };
        let (Some(spws1), Some(spws2)) = (
            node1.as_group().and_then(|g| g.get("SPW")).and_then(Node::as_group),
            node2.as_group().and_then(|g| g.get("SPW")).and_then(Node::as_group),
        ) else {
            continue;
        };
        let mut spw_out = Group::new();
        for (spw, spw_node1) in spws1 {
            let Some(spw_node2) = spws2.get(spw) else {
                continue;
            };
            let (Some(asdms1), Some(asdms2)) = (spw_node1.as_group(), spw_node2.as_group())
            else {
                continue;
            };
            let mut asdm_out = Group::new();
            for (asdm, a1) in asdms1 {
                let (Some(a1), Some(a2)) =
                    (a1.as_group(), asdms2.get(asdm).and_then(Node::as_group))
                else {
                    continue;
                };
                let mut entry = Group::new();
                for field in FLUX_FIELDS {
                    if let (Some(l1), Some(l2)) = (leaf_of(a1, field), leaf_of(a2, field)) {
                        if let Some((diff, changed)) = compare_field(field, l1, l2, opts) {
                            if keep_entry(field, &changed, &diff, opts) {
                                entry.insert(field.into(), entry_node(&diff, &changed));
                            }
                        }
                    }
                }
                if !entry.is_empty() {
                    asdm_out.insert(asdm.clone(), Node::Group(entry));
                }
            }
            if !asdm_out.is_empty() {
                spw_out.insert(spw.clone(), Node::Group(asdm_out));
            }
        }
        if !spw_out.is_empty() {
            let mut target_entry = Group::new();
            target_entry.insert("SPW".into(), Node::Group(spw_out));
            out.insert(target.clone(), Node::Group(target_entry));
        }
    }
    out
}
