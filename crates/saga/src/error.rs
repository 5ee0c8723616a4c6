//! Saga engine error types.

use common::CorrelationId;
use domain::{DomainError, SagaState};
use repository::RepositoryError;
use thiserror::Error;

/// Errors that can occur while orchestrating a saga.
///
/// Step-level business failures (insufficient stock, declined payment) are
/// never represented here; they are ordinary [`crate::steps::StepResult`]
/// values that drive the failure state machine.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Domain error (invalid transition, invalid request, ...).
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Persistence error.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// A caller-supplied correlation ID already identifies another saga.
    #[error("Correlation ID {0} is already in use")]
    CorrelationIdTaken(CorrelationId),

    /// Compensation was requested from a state that does not trigger it.
    #[error("Compensation cannot be triggered from state {0}")]
    CompensationNotTriggerable(SagaState),

    /// The compensation plan names a step the pipeline does not contain.
    #[error("No step registered for compensation entry '{0}'")]
    UnknownCompensationStep(String),
}

/// Convenience type alias for saga engine results.
pub type Result<T> = std::result::Result<T, SagaError>;
