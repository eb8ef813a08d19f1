//! Collection layer for plstat.
//!
//! Wraps a set of assembled per-MOUS records and gives them batch
//! semantics: load everything under a directory (or a uid list), query one
//! field across all records, and narrow the set with selection predicates.
//!
//! # Key Types
//!
//! - [`Collection`] — the record set and its loading/filtering operations
//! - [`Op`] — selection operators (`==`, `!=`, `>=`, `<=`, `contains`)
//! - [`QueryError`] — invalid operators and propagated ingest failures

pub mod collection;
pub mod error;

pub use collection::{Collection, Op};
pub use error::{CollectionResult, QueryError};
