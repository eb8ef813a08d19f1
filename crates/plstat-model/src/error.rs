//! Error types for the model crate.

/// Errors raised while navigating a record.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The requested logical level is not a group key in the record.
    #[error("level not found in record: {0}")]
    LevelNotFound(String),

    /// A field name could not be mapped to any known level.
    #[error("field cannot be mapped to a level: {0}")]
    UnresolvedFieldLevel(String),
}

/// Convenience alias for model results.
pub type ModelResult<T> = Result<T, ModelError>;
