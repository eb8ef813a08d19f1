//! Per-leaf comparison: delta, percentage delta, and the changed flag.

use plstat_model::{LeafValue, Scalar, Value};

use crate::options::Direction;

/// Delta sentinel for equal string values and empty lists.
pub const UNCHANGED: &str = "unchanged";

/// Delta sentinel for mismatched types, unequal-length lists, and lists
/// mixing element types.
pub const INCOMPARABLE: &str = "incomparable";

/// Sentinel percentage delta when the reference value is zero; a zero
/// reference never raises an error.
pub const PDIFF_ZERO_REF: f64 = -1.0;

/// The absolute difference between two leaf payloads.
#[derive(Clone, Debug, PartialEq)]
pub enum Delta {
    /// Values compare equal (strings) or both lists were empty.
    Unchanged,
    /// Types mismatch, list lengths differ, or list elements mix types;
    /// no delta is defined.
    Incomparable,
    /// String pair rendered as `"v1 -- v2"`.
    Str(String),
    /// Numeric difference `v2 - v1`.
    Num(f64),
    /// Elementwise numeric differences for equal-length lists.
    NumList(Vec<f64>),
    /// Elementwise renderings for equal-length string lists: the unchanged
    /// sentinel or `"v1 -- v2"` per position.
    StrList(Vec<String>),
}

/// The percentage difference, where defined.
#[derive(Clone, Debug, PartialEq)]
pub enum Pdiff {
    /// Undefined (strings, incomparable pairs).
    None,
    Num(f64),
    NumList(Vec<f64>),
}

/// The changed flag: scalar for scalar leaves, per-channel for lists.
#[derive(Clone, Debug, PartialEq)]
pub enum Changed {
    Flag(bool),
    PerChannel(Vec<bool>),
}

impl Changed {
    /// Returns `true` if any position is flagged.
    pub fn any(&self) -> bool {
        match self {
            Self::Flag(b) => *b,
            Self::PerChannel(v) => v.iter().any(|b| *b),
        }
    }
}

/// The full comparison result for one leaf position.
#[derive(Clone, Debug, PartialEq)]
pub struct LeafDiff {
    pub pl1: Value,
    pub pl2: Value,
    pub delta: Delta,
    pub pdiff: Pdiff,
}

impl LeafDiff {
    /// Whether this pair carried any difference at all (used by `diff_only`
    /// pruning for non-numeric leaves).
    pub fn is_unchanged(&self) -> bool {
        matches!(self.delta, Delta::Unchanged)
            || matches!(&self.pdiff, Pdiff::Num(p) if *p == 0.0)
            || matches!(&self.pdiff, Pdiff::NumList(ps) if ps.iter().all(|p| *p == 0.0))
    }
}

fn pdiff_of(v1: f64, v2: f64) -> f64 {
    if v1 == 0.0 {
        PDIFF_ZERO_REF
    } else {
        (v2 - v1) / v1
    }
}

/// Compare two leaf payloads.
///
/// Comparison is type-dependent: strings yield a rendered delta and no
/// percentage; numerics yield `v2 - v1` and `(v2 - v1)/v1` (with the zero
/// sentinel); equal-length lists compare elementwise, numeric and string
/// alike; everything else is incomparable. Never fails.
pub fn diff_leaf(v1: &LeafValue, v2: &LeafValue) -> LeafDiff {
    let (delta, pdiff) = match (&v1.value, &v2.value) {
        (Value::Scalar(s1), Value::Scalar(s2)) => diff_scalars(s1, s2),
        (Value::List(l1), Value::List(l2)) => diff_lists(l1, l2),
        _ => (Delta::Incomparable, Pdiff::None),
    };
    LeafDiff {
        pl1: v1.value.clone(),
        pl2: v2.value.clone(),
        delta,
        pdiff,
    }
}

fn diff_scalars(s1: &Scalar, s2: &Scalar) -> (Delta, Pdiff) {
    match (s1, s2) {
        (Scalar::Str(a), Scalar::Str(b)) => {
            if a == b {
                (Delta::Unchanged, Pdiff::None)
            } else {
                (Delta::Str(format!("{a} -- {b}")), Pdiff::None)
            }
        }
        _ => match (s1.as_f64(), s2.as_f64()) {
            (Some(a), Some(b)) => (Delta::Num(b - a), Pdiff::Num(pdiff_of(a, b))),
            _ => (Delta::Incomparable, Pdiff::None),
        },
    }
}

fn diff_lists(l1: &[Scalar], l2: &[Scalar]) -> (Delta, Pdiff) {
    if l1.is_empty() && l2.is_empty() {
        return (Delta::Unchanged, Pdiff::None);
    }
    if l1.len() != l2.len() {
        return (Delta::Incomparable, Pdiff::None);
    }
    if l1.iter().chain(l2).all(Scalar::is_numeric) {
        let mut deltas = Vec::with_capacity(l1.len());
        let mut pdiffs = Vec::with_capacity(l1.len());
        for (a, b) in l1.iter().zip(l2) {
            let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) else {
                return (Delta::Incomparable, Pdiff::None);
            };
            deltas.push(b - a);
            pdiffs.push(pdiff_of(a, b));
        }
        return (Delta::NumList(deltas), Pdiff::NumList(pdiffs));
    }
    diff_string_lists(l1, l2)
}

/// Elementwise comparison of string lists (flag lists, derived index
/// fields): equal elements render the unchanged sentinel, differing ones
/// both sides. Lists mixing element types stay incomparable.
fn diff_string_lists(l1: &[Scalar], l2: &[Scalar]) -> (Delta, Pdiff) {
    let mut rendered = Vec::with_capacity(l1.len());
    let mut any_changed = false;
    for (a, b) in l1.iter().zip(l2) {
        let (Some(a), Some(b)) = (a.as_str(), b.as_str()) else {
            return (Delta::Incomparable, Pdiff::None);
        };
        if a == b {
            rendered.push(UNCHANGED.to_string());
        } else {
            any_changed = true;
            rendered.push(format!("{a} -- {b}"));
        }
    }
    if any_changed {
        (Delta::StrList(rendered), Pdiff::None)
    } else {
        (Delta::Unchanged, Pdiff::None)
    }
}

/// Apply a limit and direction to one percentage delta.
///
/// `LowerIsBetter` flags an increase beyond the limit (the metric regresses
/// by growing, e.g. image rms); `HigherIsBetter` flags a decrease beyond the
/// limit (signal-to-noise, peak flux).
pub fn flag_pdiff(pdiff: f64, limit: f64, direction: Direction) -> bool {
    match direction {
        Direction::LowerIsBetter => pdiff > limit,
        Direction::HigherIsBetter => pdiff < -limit,
    }
}

/// Compute the changed flag for a leaf diff.
///
/// Numeric scalars yield a single flag; lists a per-channel flag vector;
/// strings flag on any difference, per element for string lists;
/// incomparable pairs are flagged so they surface in `diff_only` output.
pub fn flag_changed(diff: &LeafDiff, limit: f64, direction: Direction) -> Changed {
    match (&diff.delta, &diff.pdiff) {
        (_, Pdiff::Num(p)) => Changed::Flag(flag_pdiff(*p, limit, direction)),
        (_, Pdiff::NumList(ps)) => {
            Changed::PerChannel(ps.iter().map(|p| flag_pdiff(*p, limit, direction)).collect())
        }
        (Delta::Str(_), _) => Changed::Flag(true),
        (Delta::StrList(items), _) => {
            Changed::PerChannel(items.iter().map(|item| item != UNCHANGED).collect())
        }
        (Delta::Incomparable, _) => Changed::Flag(true),
        (Delta::Unchanged, _) => Changed::Flag(false),
        (Delta::Num(_) | Delta::NumList(_), Pdiff::None) => Changed::Flag(false),
    }
}
