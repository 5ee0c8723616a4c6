//! Best-effort compensation of allocated resources, in reverse dependency
//! order.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use domain::{CompensationSummary, Saga, SagaState};

use crate::error::{Result, SagaError};
use crate::state_manager::StateManager;
use crate::steps::{SagaStep, STEP_PAYMENT_PROCESSING, STEP_STOCK_RESERVATION};

/// The declarative failure-to-undo table.
///
/// Maps each compensation-triggering failure state to the step names whose
/// side effects must be undone, in the order they are undone. Only
/// `PAYMENT_FAILED` and `ORDER_CONFIRMATION_FAILED` have allocated resources
/// behind them; every other failure state returns `None`. The table is
/// static on purpose: which steps to undo follows from the failure state,
/// never from replaying which steps happened to run.
pub fn compensation_plan(state: SagaState) -> Option<&'static [&'static str]> {
    match state {
        SagaState::PaymentFailed => Some(&[STEP_STOCK_RESERVATION]),
        SagaState::OrderConfirmationFailed => {
            Some(&[STEP_PAYMENT_PROCESSING, STEP_STOCK_RESERVATION])
        }
        _ => None,
    }
}

/// Walks the compensation plan for a failed saga.
///
/// Best-effort, not fail-fast: a failed undo is recorded and the walk
/// continues, so a failed refund never blocks the stock release behind it.
/// Any recorded failure marks the saga for manual intervention and lands it
/// in `FAILED` instead of `COMPENSATED`. An engine error during the pass
/// itself force-fails the saga with manual intervention set, preserving the
/// partial progress already recorded.
pub struct CompensationHandler {
    state_manager: Arc<StateManager>,
    steps: Vec<Arc<dyn SagaStep>>,
}

impl CompensationHandler {
    pub fn new(state_manager: Arc<StateManager>, steps: Vec<Arc<dyn SagaStep>>) -> Self {
        Self {
            state_manager,
            steps,
        }
    }

    fn step_by_name(&self, name: &str) -> Option<&Arc<dyn SagaStep>> {
        self.steps.iter().find(|step| step.name() == name)
    }

    /// Runs the full compensation pass and drives the saga to its terminal
    /// state.
    #[tracing::instrument(skip(self, saga), fields(correlation_id = %saga.correlation_id()))]
    pub async fn run(&self, saga: &mut Saga) -> Result<CompensationSummary> {
        let plan = compensation_plan(saga.state())
            .ok_or(SagaError::CompensationNotTriggerable(saga.state()))?;

        let mut compensated = Vec::new();
        let mut failed = Vec::new();

        match self.walk(saga, plan, &mut compensated, &mut failed).await {
            Ok(()) => {
                let summary = CompensationSummary {
                    compensated,
                    failed: failed.clone(),
                    requires_manual_intervention: !failed.is_empty(),
                    completed_at: Utc::now(),
                };
                saga.set_compensation_data(summary.clone());

                let terminal = if failed.is_empty() {
                    SagaState::Compensated
                } else {
                    SagaState::Failed
                };
                self.state_manager
                    .transition(
                        saga,
                        terminal,
                        "compensation",
                        0,
                        failed.is_empty(),
                        (!failed.is_empty())
                            .then(|| format!("compensation incomplete: {failed:?}")),
                    )
                    .await?;
                self.state_manager.complete(saga).await?;

                metrics::counter!("saga_compensations_total").increment(1);
                if summary.requires_manual_intervention {
                    tracing::error!("saga requires manual intervention");
                }
                Ok(summary)
            }
            Err(error) => {
                // The pass itself broke. Keep whatever progress was made and
                // escalate for human reconciliation.
                tracing::error!(%error, "compensation pass aborted");
                let summary = CompensationSummary {
                    compensated,
                    failed,
                    requires_manual_intervention: true,
                    completed_at: Utc::now(),
                };
                saga.set_compensation_data(summary.clone());
                self.state_manager
                    .force_fail(saga, "compensation", error.to_string())
                    .await?;
                self.state_manager.complete(saga).await?;

                metrics::counter!("saga_compensation_failures_total").increment(1);
                Ok(summary)
            }
        }
    }

    async fn walk(
        &self,
        saga: &mut Saga,
        plan: &[&str],
        compensated: &mut Vec<String>,
        failed: &mut Vec<String>,
    ) -> Result<()> {
        for name in plan {
            let step = self
                .step_by_name(name)
                .ok_or_else(|| SagaError::UnknownCompensationStep(name.to_string()))?;

            // A step with nothing to undo is a no-op success.
            let Some(compensating_state) = step.compensating_state() else {
                compensated.push(name.to_string());
                continue;
            };

            self.state_manager
                .transition(saga, compensating_state, name, 0, true, None)
                .await?;

            let started = Instant::now();
            let result = step.compensate(saga).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            for action in result.actions {
                saga.context_mut().record_compensation_action(action);
            }
            self.state_manager.persist(saga).await?;

            if result.success {
                tracing::info!(step = name, duration_ms, "compensation step succeeded");
                compensated.push(name.to_string());
            } else {
                tracing::error!(
                    step = name,
                    duration_ms,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "compensation step failed"
                );
                failed.push(name.to_string());
            }
        }
        Ok(())
    }
}
