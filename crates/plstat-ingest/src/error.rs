//! Error types for the ingest crate.

use std::path::PathBuf;

/// Errors raised while locating, parsing, or assembling run inputs.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// A stats file must contain exactly one MOUS key (a top-level key
    /// containing "uid"). Fatal for that file.
    #[error("{path}: expected exactly one MOUS key, found {candidates:?}")]
    Schema {
        path: PathBuf,
        candidates: Vec<String>,
    },

    /// An expected input file is absent. Recoverable: the assembler skips
    /// the corresponding merge step.
    #[error("missing source file: {0}")]
    MissingSourceFile(PathBuf),

    /// No usable run inputs were found under a directory.
    #[error("no stats files found in: {0}")]
    EmptyDirectory(PathBuf),

    /// Reading an input file failed.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An input file is not valid JSON for its expected shape.
    #[error("cannot parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Convenience alias for ingest results.
pub type IngestResult<T> = Result<T, IngestError>;
