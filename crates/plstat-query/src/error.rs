//! Error types for the query crate.

/// Errors raised while loading or filtering a collection.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The selection operator is not one of `==`, `!=`, `>=`, `<=`,
    /// `contains`.
    #[error("invalid operator: {0:?} (expected ==, !=, >=, <= or contains)")]
    InvalidOperator(String),

    #[error(transparent)]
    Ingest(#[from] plstat_ingest::IngestError),

    #[error(transparent)]
    Model(#[from] plstat_model::ModelError),

    #[error("uid list i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for collection operations.
pub type CollectionResult<T> = Result<T, QueryError>;
