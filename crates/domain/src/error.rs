//! Domain error types.

use thiserror::Error;

use crate::state::SagaState;

/// Errors that can occur in the saga domain layer.
///
/// `InvalidTransition` and `ContextSectionAlreadySet` signal ordering bugs in
/// the orchestration code, never expected conditions in normal operation.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Attempted a state change the transition table does not allow.
    #[error("Invalid saga state transition: {from} -> {to}")]
    InvalidTransition { from: SagaState, to: SagaState },

    /// Attempted to complete a saga that is not in a terminal state.
    #[error("Cannot complete saga in non-terminal state {0}")]
    NotTerminal(SagaState),

    /// Attempted to complete a saga a second time.
    #[error("Saga has already been completed")]
    AlreadyCompleted,

    /// A step tried to fill a context section that is already populated.
    #[error("Context section '{0}' is already set")]
    ContextSectionAlreadySet(&'static str),

    /// The sale request violates a structural invariant.
    #[error("Invalid sale request: {0}")]
    InvalidRequest(String),
}
