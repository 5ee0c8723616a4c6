//! Repository error types.

use common::SagaId;
use thiserror::Error;

/// Errors that can occur during saga persistence operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No saga exists with the given key.
    #[error("Saga not found: {0}")]
    NotFound(SagaId),

    /// The saga has no persistence key yet; `save` it first.
    #[error("Saga has not been saved yet")]
    MissingId,

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted value could not be mapped back to a domain type.
    #[error("Corrupt persisted value: {0}")]
    Corrupt(String),
}

/// Convenience type alias for repository results.
pub type Result<T> = std::result::Result<T, RepositoryError>;
