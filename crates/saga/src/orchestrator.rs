//! The saga orchestrator: drives the step pipeline end to end.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{CorrelationId, SagaId};
use domain::{CompensationSummary, Saga, SagaState, SaleRequest};
use repository::{SagaRepository, SagaStepLog};

use crate::client::{ResilientClient, RetryConfig};
use crate::compensation::CompensationHandler;
use crate::error::Result;
use crate::services::{PaymentService, SaleService, StockService};
use crate::state_manager::StateManager;
use crate::steps::{
    OrderConfirmationStep, PaymentProcessingStep, SagaStep, StepResult, StockReservationStep,
    StockVerificationStep,
};

/// Sale creation fans out downstream, so its step gets a longer deadline
/// than the default.
const ORDER_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(15);

/// What the caller gets back from a finished saga, success or not.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrationResult {
    pub success: bool,
    pub correlation_id: CorrelationId,
    pub saga_state: SagaState,
    pub sale_id: Option<i64>,
    pub total_amount: Option<f64>,
    pub error: Option<String>,
    pub compensation: Option<CompensationSummary>,
}

impl OrchestrationResult {
    fn from_saga(saga: &Saga) -> Self {
        let sale_result = saga.context().sale_result.as_ref();
        Self {
            success: saga.state().is_success(),
            correlation_id: saga.correlation_id(),
            saga_state: saga.state(),
            sale_id: sale_result.map(|r| r.sale_id),
            total_amount: sale_result.map(|r| r.total_amount),
            error: saga.error_message().map(String::from),
            compensation: saga.compensation_data().cloned(),
        }
    }
}

/// Coordinates the four-step sale pipeline.
///
/// Single entry point for callers: [`SagaOrchestrator::create_sale`] runs
/// the pipeline to a terminal state and always returns a tagged result for
/// a persisted saga. Step failures land in their declared failure states;
/// where resources were already allocated a compensation pass runs before
/// the result is returned. An unexpected engine error force-fails the saga
/// so it is never left observable in a non-terminal state.
pub struct SagaOrchestrator {
    state_manager: Arc<StateManager>,
    steps: Vec<Arc<dyn SagaStep>>,
    compensation: CompensationHandler,
}

impl SagaOrchestrator {
    pub fn new(
        repository: Arc<dyn SagaRepository>,
        stock: Arc<dyn StockService>,
        payment: Arc<dyn PaymentService>,
        sale: Arc<dyn SaleService>,
        config: RetryConfig,
    ) -> Self {
        let client = ResilientClient::new(config.clone());
        let confirmation_client =
            ResilientClient::new(config.with_timeout(ORDER_CONFIRMATION_TIMEOUT));

        let steps: Vec<Arc<dyn SagaStep>> = vec![
            Arc::new(StockVerificationStep::new(stock.clone(), client.clone())),
            Arc::new(StockReservationStep::new(stock, client.clone())),
            Arc::new(PaymentProcessingStep::new(payment, client)),
            Arc::new(OrderConfirmationStep::new(sale, confirmation_client)),
        ];

        let state_manager = Arc::new(StateManager::new(repository));
        let compensation = CompensationHandler::new(state_manager.clone(), steps.clone());

        Self {
            state_manager,
            steps,
            compensation,
        }
    }

    /// Runs a sale saga under a freshly generated correlation ID.
    pub async fn create_sale(&self, request: SaleRequest) -> Result<OrchestrationResult> {
        self.create_sale_with_correlation_id(request, CorrelationId::new())
            .await
    }

    /// Runs a sale saga under a caller-supplied correlation ID.
    ///
    /// The request is validated and the correlation ID reserved before any
    /// saga is persisted; both failure modes return an error without side
    /// effects.
    #[tracing::instrument(skip(self, request), fields(correlation_id = %correlation_id))]
    pub async fn create_sale_with_correlation_id(
        &self,
        request: SaleRequest,
        correlation_id: CorrelationId,
    ) -> Result<OrchestrationResult> {
        request.validate()?;

        let mut saga = self
            .state_manager
            .create(Saga::new(correlation_id, request))
            .await?;
        metrics::counter!("sagas_started_total").increment(1);
        let started = Instant::now();

        let result = match self.run_pipeline(&mut saga).await {
            Ok(result) => result,
            Err(error) => {
                // Outermost catch: the saga must end terminal no matter
                // what escaped the pipeline.
                let step = saga.current_step().unwrap_or("pipeline").to_string();
                self.state_manager
                    .force_fail(&mut saga, &step, error.to_string())
                    .await?;
                self.state_manager.complete(&mut saga).await?;
                OrchestrationResult::from_saga(&saga)
            }
        };

        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());
        metrics::counter!(
            "sagas_finished_total",
            "state" => result.saga_state.as_str()
        )
        .increment(1);

        Ok(result)
    }

    async fn run_pipeline(&self, saga: &mut Saga) -> Result<OrchestrationResult> {
        for step in &self.steps {
            self.state_manager
                .transition(saga, step.in_progress_state(), step.name(), 0, true, None)
                .await?;

            let started = Instant::now();
            let result = step.execute(saga).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                StepResult::Success(output) => {
                    saga.apply_output(output)?;
                    self.state_manager
                        .transition(saga, step.success_state(), step.name(), duration_ms, true, None)
                        .await?;
                }
                StepResult::Failure { reason } => {
                    self.state_manager
                        .transition(
                            saga,
                            step.failure_state(),
                            step.name(),
                            duration_ms,
                            false,
                            Some(reason.clone()),
                        )
                        .await?;

                    if saga.can_trigger_compensation() {
                        self.compensation.run(saga).await?;
                    } else {
                        self.state_manager.complete(saga).await?;
                    }
                    return Ok(OrchestrationResult::from_saga(saga));
                }
            }
        }

        // SALE_CONFIRMED is the last step's success state, already terminal.
        self.state_manager.complete(saga).await?;
        Ok(OrchestrationResult::from_saga(saga))
    }

    /// Maps a saga to the caller-facing result shape. `None` for an unknown
    /// correlation ID, never a default saga.
    pub async fn get_saga_status(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Option<OrchestrationResult>> {
        Ok(self
            .find_saga(correlation_id)
            .await?
            .map(|saga| OrchestrationResult::from_saga(&saga)))
    }

    /// Looks up the full saga by its caller-visible correlation ID.
    pub async fn find_saga(&self, correlation_id: CorrelationId) -> Result<Option<Saga>> {
        self.state_manager.find_by_correlation_id(correlation_id).await
    }

    /// Returns a saga's audit trail, oldest first.
    pub async fn get_saga_steps(&self, saga_id: SagaId) -> Result<Vec<SagaStepLog>> {
        self.state_manager.find_steps(saga_id).await
    }

    /// True if the saga's compensation could not fully undo its side
    /// effects. False for unknown correlation IDs.
    pub async fn requires_manual_intervention(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<bool> {
        Ok(self
            .find_saga(correlation_id)
            .await?
            .map(|saga| saga.requires_manual_intervention())
            .unwrap_or(false))
    }

    /// Correlation IDs of failed sagas whose compensation could not fully
    /// undo their side effects, most recently updated first.
    pub async fn get_sagas_requiring_manual_intervention(
        &self,
        limit: usize,
    ) -> Result<Vec<CorrelationId>> {
        let failed = self.state_manager.find_failed(limit).await?;
        Ok(failed
            .iter()
            .filter(|saga| saga.requires_manual_intervention())
            .map(Saga::correlation_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use domain::SaleLine;
    use repository::InMemorySagaRepository;

    use super::*;
    use crate::error::SagaError;
    use crate::services::{
        InMemoryPaymentService, InMemorySaleService, InMemoryStockService, ServiceError,
    };

    struct Harness {
        orchestrator: SagaOrchestrator,
        stock: Arc<InMemoryStockService>,
        payment: Arc<InMemoryPaymentService>,
    }

    fn harness() -> Harness {
        let stock = Arc::new(InMemoryStockService::new());
        let payment = Arc::new(InMemoryPaymentService::new());
        let sale = Arc::new(InMemorySaleService::new());
        let config = RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryConfig::default()
        };
        let orchestrator = SagaOrchestrator::new(
            Arc::new(InMemorySagaRepository::new()),
            stock.clone(),
            payment.clone(),
            sale,
            config,
        );
        Harness {
            orchestrator,
            stock,
            payment,
        }
    }

    fn request() -> SaleRequest {
        SaleRequest::new(1, 1, vec![SaleLine::new(1, 2, 10.0)])
    }

    #[tokio::test]
    async fn test_happy_path_confirms_sale() {
        let h = harness();
        h.stock.set_available(1, 10);

        let result = h.orchestrator.create_sale(request()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.saga_state, SagaState::SaleConfirmed);
        assert!(result.sale_id.is_some());
        assert!((result.total_amount.unwrap() - 20.0).abs() < 0.01);
        assert!(result.compensation.is_none());
    }

    #[tokio::test]
    async fn test_invalid_request_persists_nothing() {
        let h = harness();
        let correlation_id = CorrelationId::new();
        let bad = SaleRequest::new(1, 1, vec![]);

        let err = h
            .orchestrator
            .create_sale_with_correlation_id(bad, correlation_id)
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::Domain(_)));
        assert!(
            h.orchestrator
                .get_saga_status(correlation_id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_duplicate_correlation_id_rejected() {
        let h = harness();
        h.stock.set_available(1, 10);
        let correlation_id = CorrelationId::new();

        h.orchestrator
            .create_sale_with_correlation_id(request(), correlation_id)
            .await
            .unwrap();
        let err = h
            .orchestrator
            .create_sale_with_correlation_id(request(), correlation_id)
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::CorrelationIdTaken(_)));
    }

    #[tokio::test]
    async fn test_insufficient_stock_is_terminal_without_compensation() {
        let h = harness();
        h.stock.set_available(1, 1);

        let result = h.orchestrator.create_sale(request()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.saga_state, SagaState::StockVerificationFailed);
        assert!(result.compensation.is_none());
        assert!(result.error.unwrap().contains("insufficient stock"));
    }

    #[tokio::test]
    async fn test_payment_failure_releases_stock() {
        let h = harness();
        h.stock.set_available(1, 10);
        h.payment
            .set_fail_on_process(Some(ServiceError::Rejected("declined".to_string())));

        let result = h.orchestrator.create_sale(request()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.saga_state, SagaState::Compensated);

        let summary = result.compensation.unwrap();
        assert_eq!(summary.compensated, vec!["stock_reservation"]);
        assert!(!summary.requires_manual_intervention);
        assert_eq!(h.stock.reservation_count(), 0);
    }

    #[tokio::test]
    async fn test_status_lookup_returns_terminal_saga() {
        let h = harness();
        h.stock.set_available(1, 10);
        let correlation_id = CorrelationId::new();

        let created = h
            .orchestrator
            .create_sale_with_correlation_id(request(), correlation_id)
            .await
            .unwrap();

        let status = h
            .orchestrator
            .get_saga_status(correlation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status, created);
        assert_eq!(status.saga_state, SagaState::SaleConfirmed);

        let saga = h
            .orchestrator
            .find_saga(correlation_id)
            .await
            .unwrap()
            .unwrap();
        assert!(saga.completed_at().is_some());
        assert!(
            !h.orchestrator
                .requires_manual_intervention(correlation_id)
                .await
                .unwrap()
        );
    }
}
