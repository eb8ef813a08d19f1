//! Ingest layer for plstat.
//!
//! Each pipeline run leaves a family of per-MOUS output files: the stats
//! JSON, the aggregate quality report, a timetracker JSON, an optional
//! supplemental stats JSON derived from image products, and optional
//! calibration-table summaries. The adapters here turn each of those into a
//! record fragment; the assembler merges them in priority order and runs
//! the derived-statistics pass.
//!
//! # Key Types
//!
//! - [`RunSources`] — the located input files of one pipeline run
//! - [`assemble`] — fragments in priority order to one [`plstat_model::Record`]
//! - [`IngestError`] — schema violations and I/O failures

pub mod adapters;
pub mod assemble;
pub mod discover;
pub mod error;

pub use adapters::{load_report_file, load_stats_file, load_suppl_file, load_table_file, StatsFile};
pub use assemble::{assemble, derive_statistics};
pub use discover::{discover_uids, RunSources};
pub use error::{IngestError, IngestResult};
