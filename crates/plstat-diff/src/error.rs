//! Error types for the diff crate.
//!
//! The comparison itself is total: mismatched or unsupported leaf pairs are
//! recorded as incomparable, not raised. Errors here only cover the edges —
//! loading threshold configuration and writing exports.

use std::path::PathBuf;

/// Errors that can occur around a diff operation.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// A comparison config file could not be read.
    #[error("cannot read compare config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A comparison config file could not be parsed.
    #[error("cannot parse compare config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Writing a CSV export failed.
    #[error("export failed: {0}")]
    Export(#[from] std::io::Error),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
