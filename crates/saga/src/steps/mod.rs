//! The saga step pipeline.
//!
//! Each step owns one downstream interaction and declares its own state
//! triple (in-progress, success, failure). Business failures are ordinary
//! [`StepResult::Failure`] values, never errors; the orchestrator turns them
//! into failure-state transitions and, where resources were already
//! allocated, into a compensation pass.

pub mod order_confirmation;
pub mod payment_processing;
pub mod stock_reservation;
pub mod stock_verification;

use async_trait::async_trait;
use domain::{CompensationAction, Saga, SagaState, StepOutput};

pub use order_confirmation::OrderConfirmationStep;
pub use payment_processing::PaymentProcessingStep;
pub use stock_reservation::StockReservationStep;
pub use stock_verification::StockVerificationStep;

pub const STEP_STOCK_VERIFICATION: &str = "stock_verification";
pub const STEP_STOCK_RESERVATION: &str = "stock_reservation";
pub const STEP_PAYMENT_PROCESSING: &str = "payment_processing";
pub const STEP_ORDER_CONFIRMATION: &str = "order_confirmation";

/// Outcome of a forward step execution.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// The step succeeded and produced its context section.
    Success(StepOutput),
    /// The step failed. Carries the human-readable reason stored on the
    /// saga; partial side effects were already rolled back by the step
    /// itself where it guarantees that.
    Failure { reason: String },
}

impl StepResult {
    pub fn failure(reason: impl Into<String>) -> Self {
        StepResult::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepResult::Success(_))
    }
}

/// Outcome of one step's compensation attempt.
///
/// `actions` records every undo the step attempted, completed or not, so the
/// saga's compensation trail stays faithful even on partial failure.
#[derive(Debug, Clone, PartialEq)]
pub struct CompensationResult {
    pub success: bool,
    pub actions: Vec<CompensationAction>,
    pub error: Option<String>,
}

impl CompensationResult {
    /// A compensation that found nothing to undo.
    pub fn nothing_to_undo() -> Self {
        Self {
            success: true,
            actions: Vec::new(),
            error: None,
        }
    }
}

/// One step of the sale pipeline.
#[async_trait]
pub trait SagaStep: Send + Sync {
    /// Stable step name, used in step logs and compensation plans.
    fn name(&self) -> &'static str;

    /// State entered when the step starts executing.
    fn in_progress_state(&self) -> SagaState;

    /// State entered when the step succeeds.
    fn success_state(&self) -> SagaState;

    /// State entered when the step fails.
    fn failure_state(&self) -> SagaState;

    /// State entered while this step's side effects are being undone.
    /// `None` for steps with nothing to compensate.
    fn compensating_state(&self) -> Option<SagaState> {
        None
    }

    /// Whether this step has a compensating action at all.
    fn can_compensate(&self) -> bool {
        self.compensating_state().is_some()
    }

    /// Runs the step against the saga's current context.
    async fn execute(&self, saga: &Saga) -> StepResult;

    /// Undoes this step's side effects. Default for steps that allocate
    /// nothing.
    async fn compensate(&self, _saga: &Saga) -> CompensationResult {
        CompensationResult::nothing_to_undo()
    }
}
