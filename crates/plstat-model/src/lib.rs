//! Foundation types for plstat.
//!
//! This crate provides the data model shared by every other plstat crate:
//! the scalar and leaf-value containers, the nested record tree, and the
//! level-based navigation used to query a record without knowing its
//! physical shape.
//!
//! # Key Types
//!
//! - [`Scalar`] — atomic JSON-compatible value (string, integer, float, boolean)
//! - [`LeafValue`] — a scalar or list of scalars plus an optional unit; the terminal node
//! - [`Node`] / [`Group`] — the tagged union of leaf and nested mapping
//! - [`Record`] — the canonical per-MOUS record assembled from adapter fragments
//! - [`Level`] — logical addressing level (MOUS, EB, SPW, TARGET, STAGE)

pub mod error;
pub mod leaf;
pub mod level;
pub mod node;
pub mod record;
pub mod scalar;

pub use error::{ModelError, ModelResult};
pub use leaf::{LeafValue, Value};
pub use level::Level;
pub use node::{Group, Node};
pub use record::{QueryResult, Record};
pub use scalar::Scalar;
