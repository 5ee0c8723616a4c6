//! The saga entity.

use chrono::{DateTime, Utc};
use common::{CorrelationId, SagaId};
use serde::{Deserialize, Serialize};

use crate::context::{CompensationSummary, SaleContext, StepOutput};
use crate::error::DomainError;
use crate::request::SaleRequest;
use crate::state::SagaState;

/// One orchestrated sale transaction attempt.
///
/// State only changes through [`Saga::update_state`], which validates against
/// the transition table, or through the explicitly named
/// [`Saga::force_fail`] escape hatch the orchestrator uses when an error
/// escapes the step pipeline. `completed_at` is set exactly once, from a
/// terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Saga {
    id: Option<SagaId>,
    correlation_id: CorrelationId,
    state: SagaState,
    current_step: Option<String>,
    context: SaleContext,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    compensation_data: Option<CompensationSummary>,
}

impl Saga {
    /// Creates a fresh saga in `INITIATED` for the given request.
    pub fn new(correlation_id: CorrelationId, request: SaleRequest) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            correlation_id,
            state: SagaState::Initiated,
            current_step: None,
            context: SaleContext::new(request),
            created_at: now,
            updated_at: now,
            completed_at: None,
            error_message: None,
            compensation_data: None,
        }
    }

    /// Rebuilds a saga from persisted fields. Repository use only.
    #[allow(clippy::too_many_arguments)]
    pub fn hydrate(
        id: SagaId,
        correlation_id: CorrelationId,
        state: SagaState,
        current_step: Option<String>,
        context: SaleContext,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        error_message: Option<String>,
        compensation_data: Option<CompensationSummary>,
    ) -> Self {
        Self {
            id: Some(id),
            correlation_id,
            state,
            current_step,
            context,
            created_at,
            updated_at,
            completed_at,
            error_message,
            compensation_data,
        }
    }

    /// Transitions to `new_state`, recording the step that drove it.
    ///
    /// Fails with [`DomainError::InvalidTransition`] and leaves the saga
    /// unchanged if `new_state` is not in the current state's allowed set.
    pub fn update_state(
        &mut self,
        new_state: SagaState,
        step: Option<&str>,
    ) -> Result<(), DomainError> {
        if !self.state.is_valid_transition(new_state) {
            return Err(DomainError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }
        self.state = new_state;
        if let Some(step) = step {
            self.current_step = Some(step.to_string());
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Marks the saga finished. Fails unless the current state is terminal,
    /// or if it was already completed.
    pub fn complete(&mut self) -> Result<(), DomainError> {
        if self.completed_at.is_some() {
            return Err(DomainError::AlreadyCompleted);
        }
        if !self.state.is_terminal() {
            return Err(DomainError::NotTerminal(self.state));
        }
        let now = Utc::now();
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Jumps straight to `FAILED`, bypassing transition validation.
    ///
    /// This is the orchestrator's outermost error path: when an unexpected
    /// error escapes the pipeline the saga must never be left observable in
    /// a non-terminal state. Every other state change goes through
    /// [`Saga::update_state`].
    pub fn force_fail(&mut self, reason: impl Into<String>) {
        self.state = SagaState::Failed;
        self.error_message = Some(reason.into());
        self.updated_at = Utc::now();
    }

    /// Merges a successful step's output into the context.
    pub fn apply_output(&mut self, output: StepOutput) -> Result<(), DomainError> {
        self.context.apply(output)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records the failure message reported by a step.
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Writes the compensation summary. Only the compensation handler calls
    /// this, once per saga.
    pub fn set_compensation_data(&mut self, summary: CompensationSummary) {
        self.compensation_data = Some(summary);
        self.updated_at = Utc::now();
    }

    /// Assigns the persistence key. Repository use only.
    pub fn set_id(&mut self, id: SagaId) {
        self.id = Some(id);
    }

    pub fn id(&self) -> Option<SagaId> {
        self.id
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn current_step(&self) -> Option<&str> {
        self.current_step.as_deref()
    }

    pub fn context(&self) -> &SaleContext {
        &self.context
    }

    /// Mutable context access for the compensation handler's action trail.
    pub fn context_mut(&mut self) -> &mut SaleContext {
        self.updated_at = Utc::now();
        &mut self.context
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn compensation_data(&self) -> Option<&CompensationSummary> {
        self.compensation_data.as_ref()
    }

    /// True only for the two failure states with allocated resources behind
    /// them. Delegates to the state machine.
    pub fn can_trigger_compensation(&self) -> bool {
        self.state.can_trigger_compensation()
    }

    /// True if compensation ran but could not fully undo side effects.
    pub fn requires_manual_intervention(&self) -> bool {
        self.compensation_data
            .as_ref()
            .map(|summary| summary.requires_manual_intervention)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{StockVerificationData, VerifiedItem};
    use crate::request::SaleLine;

    fn new_saga() -> Saga {
        Saga::new(
            CorrelationId::new(),
            SaleRequest::new(1, 1, vec![SaleLine::new(1, 2, 10.0)]),
        )
    }

    fn drive_to(saga: &mut Saga, chain: &[SagaState]) {
        for state in chain {
            saga.update_state(*state, None).unwrap();
        }
    }

    #[test]
    fn test_new_saga_is_initiated() {
        let saga = new_saga();
        assert_eq!(saga.state(), SagaState::Initiated);
        assert!(saga.id().is_none());
        assert!(saga.completed_at().is_none());
        assert!(saga.current_step().is_none());
    }

    #[test]
    fn test_valid_transition_updates_step() {
        let mut saga = new_saga();
        saga.update_state(SagaState::StockVerifying, Some("stock_verification"))
            .unwrap();
        assert_eq!(saga.state(), SagaState::StockVerifying);
        assert_eq!(saga.current_step(), Some("stock_verification"));
    }

    #[test]
    fn test_invalid_transition_leaves_state_unchanged() {
        let mut saga = new_saga();
        let err = saga
            .update_state(SagaState::PaymentProcessed, None)
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidTransition {
                from: SagaState::Initiated,
                to: SagaState::PaymentProcessed,
            }
        ));
        assert_eq!(saga.state(), SagaState::Initiated);
    }

    #[test]
    fn test_complete_requires_terminal_state() {
        let mut saga = new_saga();
        assert!(matches!(
            saga.complete(),
            Err(DomainError::NotTerminal(SagaState::Initiated))
        ));

        drive_to(
            &mut saga,
            &[
                SagaState::StockVerifying,
                SagaState::StockVerificationFailed,
            ],
        );
        saga.complete().unwrap();
        assert!(saga.completed_at().is_some());
    }

    #[test]
    fn test_completed_at_set_at_most_once() {
        let mut saga = new_saga();
        drive_to(
            &mut saga,
            &[
                SagaState::StockVerifying,
                SagaState::StockVerificationFailed,
            ],
        );
        saga.complete().unwrap();
        let first = saga.completed_at();
        assert!(matches!(saga.complete(), Err(DomainError::AlreadyCompleted)));
        assert_eq!(saga.completed_at(), first);
    }

    #[test]
    fn test_force_fail_is_terminal() {
        let mut saga = new_saga();
        saga.update_state(SagaState::StockVerifying, None).unwrap();
        saga.force_fail("downstream panic");
        assert_eq!(saga.state(), SagaState::Failed);
        assert_eq!(saga.error_message(), Some("downstream panic"));
        saga.complete().unwrap();
    }

    #[test]
    fn test_apply_output_is_append_only() {
        let mut saga = new_saga();
        let data = StockVerificationData {
            verified: true,
            items: vec![VerifiedItem {
                product_id: 1,
                requested: 2,
                available: 10,
            }],
            verified_at: Utc::now(),
        };
        saga.apply_output(StepOutput::StockVerification(data.clone()))
            .unwrap();
        assert!(
            saga.apply_output(StepOutput::StockVerification(data))
                .is_err()
        );
    }

    #[test]
    fn test_can_trigger_compensation_follows_state() {
        let mut saga = new_saga();
        assert!(!saga.can_trigger_compensation());
        drive_to(
            &mut saga,
            &[
                SagaState::StockVerifying,
                SagaState::StockVerified,
                SagaState::StockReserving,
                SagaState::StockReserved,
                SagaState::PaymentProcessing,
                SagaState::PaymentFailed,
            ],
        );
        assert!(saga.can_trigger_compensation());
    }

    #[test]
    fn test_requires_manual_intervention_from_summary() {
        let mut saga = new_saga();
        assert!(!saga.requires_manual_intervention());
        saga.set_compensation_data(CompensationSummary {
            compensated: vec!["payment_processing".to_string()],
            failed: vec!["stock_reservation".to_string()],
            requires_manual_intervention: true,
            completed_at: Utc::now(),
        });
        assert!(saga.requires_manual_intervention());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut saga = new_saga();
        saga.set_id(SagaId::new(7));
        saga.update_state(SagaState::StockVerifying, Some("stock_verification"))
            .unwrap();

        let json = serde_json::to_string(&saga).unwrap();
        let deserialized: Saga = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.id(), Some(SagaId::new(7)));
        assert_eq!(deserialized.state(), SagaState::StockVerifying);
        assert_eq!(deserialized.correlation_id(), saga.correlation_id());
    }
}
