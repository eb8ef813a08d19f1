//! Diff engine for plstat.
//!
//! Compares two assembled MOUS records leaf by leaf and produces a parallel
//! tree in which every compared position holds both input values, the
//! absolute delta, the percentage delta, and a changed flag. Comparison is
//! type-dependent (string, numeric, list) and never fails: incomparable
//! pairs are recorded with a sentinel and traversal continues.
//!
//! # Key Types
//!
//! - [`LeafDiff`] / [`Delta`] — per-leaf comparison result and its delta variants
//! - [`Diff`] — the record-shaped comparison tree
//! - [`DiffOptions`] / [`MetricRule`] / [`Direction`] — thresholds and per-metric policy
//! - [`stage_map`] — greedy by-name alignment of pipeline stages

pub mod error;
pub mod export;
pub mod leaf_diff;
pub mod options;
pub mod record_diff;
pub mod stage_map;

pub use error::{DiffError, DiffResult};
pub use export::export_csv;
pub use leaf_diff::{
    diff_leaf, flag_changed, Changed, Delta, LeafDiff, Pdiff, INCOMPARABLE, PDIFF_ZERO_REF,
    UNCHANGED,
};
pub use options::{CompareConfig, DiffOptions, Direction, MetricRule};
pub use record_diff::{diff_records, Diff};
pub use stage_map::stage_map;
