//! Step 3: charge the payment for the reserved goods.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domain::{CompensationAction, PaymentData, Saga, SagaState, StepOutput, amounts_match};

use crate::client::ResilientClient;
use crate::services::{PaymentMetadata, PaymentService};
use crate::steps::{CompensationResult, SagaStep, STEP_PAYMENT_PROCESSING, StepResult};

/// Processes payment for the full sale amount.
///
/// Cross-checks the reservation section against the request before charging:
/// every line must be reserved at its requested quantity, and the charged
/// amount must match the sum of line subtotals within the monetary
/// tolerance. Compensation refunds the recorded transaction.
pub struct PaymentProcessingStep {
    payment: Arc<dyn PaymentService>,
    client: ResilientClient,
}

impl PaymentProcessingStep {
    pub fn new(payment: Arc<dyn PaymentService>, client: ResilientClient) -> Self {
        Self { payment, client }
    }
}

#[async_trait]
impl SagaStep for PaymentProcessingStep {
    fn name(&self) -> &'static str {
        STEP_PAYMENT_PROCESSING
    }

    fn in_progress_state(&self) -> SagaState {
        SagaState::PaymentProcessing
    }

    fn success_state(&self) -> SagaState {
        SagaState::PaymentProcessed
    }

    fn failure_state(&self) -> SagaState {
        SagaState::PaymentFailed
    }

    fn compensating_state(&self) -> Option<SagaState> {
        Some(SagaState::CompensatingPayment)
    }

    async fn execute(&self, saga: &Saga) -> StepResult {
        let context = saga.context();
        let request = &context.sale_request;

        let Some(reservation) = &context.stock_reservation else {
            return StepResult::failure("payment attempted without a stock reservation");
        };

        // Every line must be reserved at its requested quantity.
        let mut reserved_total = 0.0;
        for line in &request.lines {
            let reserved_quantity = reservation
                .items
                .iter()
                .find(|item| item.product_id == line.product_id)
                .map(|item| item.quantity)
                .unwrap_or(0);
            if reserved_quantity != line.quantity {
                return StepResult::failure(format!(
                    "reserved quantity {reserved_quantity} does not match requested {} for product {}",
                    line.quantity, line.product_id
                ));
            }
            reserved_total += f64::from(reserved_quantity) * line.unit_price;
        }

        let amount = request.total_amount();
        if !amounts_match(amount, reserved_total) {
            return StepResult::failure(format!(
                "charge amount {amount} does not match reserved goods total {reserved_total}"
            ));
        }

        let metadata = PaymentMetadata {
            user_id: request.user_id,
            store_id: request.store_id,
            correlation_id: saga.correlation_id().to_string(),
        };

        match self
            .client
            .call(STEP_PAYMENT_PROCESSING, || {
                self.payment.process(amount, metadata.clone())
            })
            .await
        {
            Ok(transaction_id) => StepResult::Success(StepOutput::Payment(PaymentData {
                transaction_id,
                amount,
                processed_at: Utc::now(),
            })),
            Err(error) => StepResult::failure(format!("payment failed: {error}")),
        }
    }

    async fn compensate(&self, saga: &Saga) -> CompensationResult {
        let Some(payment) = &saga.context().payment else {
            return CompensationResult::nothing_to_undo();
        };

        let refund = self
            .client
            .call("payment_refund", || {
                self.payment.refund(&payment.transaction_id)
            })
            .await;

        let (completed, refund_id, error) = match refund {
            Ok(refund_id) => (true, Some(refund_id), None),
            Err(error) => (false, None, Some(error.to_string())),
        };

        CompensationResult {
            success: completed,
            actions: vec![CompensationAction {
                action: "refund_payment".to_string(),
                data: serde_json::json!({
                    "transaction_id": payment.transaction_id,
                    "amount": payment.amount,
                    "refund_id": refund_id,
                }),
                completed,
                recorded_at: Utc::now(),
            }],
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use common::CorrelationId;
    use domain::{
        ReservedItem, SaleLine, SaleRequest, StockReservationData,
    };

    use super::*;
    use crate::client::RetryConfig;
    use crate::services::{InMemoryPaymentService, ServiceError};

    fn reserved_saga() -> Saga {
        let mut saga = Saga::new(
            CorrelationId::new(),
            SaleRequest::new(1, 1, vec![SaleLine::new(1, 2, 10.0)]),
        );
        saga.apply_output(StepOutput::StockReservation(StockReservationData {
            items: vec![ReservedItem {
                product_id: 1,
                quantity: 2,
                reservation_id: "RSV-0001".to_string(),
            }],
            reserved_at: Utc::now(),
        }))
        .unwrap();
        saga
    }

    fn step(payment: Arc<InMemoryPaymentService>) -> PaymentProcessingStep {
        let config = RetryConfig {
            initial_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(2),
            ..RetryConfig::default()
        };
        PaymentProcessingStep::new(payment, ResilientClient::new(config))
    }

    #[tokio::test]
    async fn test_charges_request_total() {
        let payment = Arc::new(InMemoryPaymentService::new());

        let result = step(payment.clone()).execute(&reserved_saga()).await;
        match result {
            StepResult::Success(StepOutput::Payment(data)) => {
                assert!(data.transaction_id.starts_with("TXN-"));
                assert!(amounts_match(data.amount, 20.0));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(payment.payment_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_reservation_fails_without_charging() {
        let payment = Arc::new(InMemoryPaymentService::new());
        let saga = Saga::new(
            CorrelationId::new(),
            SaleRequest::new(1, 1, vec![SaleLine::new(1, 2, 10.0)]),
        );

        let result = step(payment.clone()).execute(&saga).await;
        assert!(matches!(result, StepResult::Failure { .. }));
        assert_eq!(payment.payment_count(), 0);
    }

    #[tokio::test]
    async fn test_quantity_mismatch_fails_without_charging() {
        let payment = Arc::new(InMemoryPaymentService::new());
        let mut saga = Saga::new(
            CorrelationId::new(),
            SaleRequest::new(1, 1, vec![SaleLine::new(1, 2, 10.0)]),
        );
        saga.apply_output(StepOutput::StockReservation(StockReservationData {
            items: vec![ReservedItem {
                product_id: 1,
                quantity: 1,
                reservation_id: "RSV-0001".to_string(),
            }],
            reserved_at: Utc::now(),
        }))
        .unwrap();

        let result = step(payment.clone()).execute(&saga).await;
        assert!(matches!(result, StepResult::Failure { .. }));
        assert_eq!(payment.payment_count(), 0);
    }

    #[tokio::test]
    async fn test_declined_payment_fails() {
        let payment = Arc::new(InMemoryPaymentService::new());
        payment.set_fail_on_process(Some(ServiceError::Rejected("declined".to_string())));

        let result = step(payment).execute(&reserved_saga()).await;
        match result {
            StepResult::Failure { reason } => assert!(reason.contains("declined")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_compensate_refunds_transaction() {
        let payment = Arc::new(InMemoryPaymentService::new());
        let step = step(payment.clone());
        let mut saga = reserved_saga();

        let StepResult::Success(output) = step.execute(&saga).await else {
            panic!("payment should succeed");
        };
        saga.apply_output(output).unwrap();

        let result = step.compensate(&saga).await;
        assert!(result.success);
        assert_eq!(result.actions.len(), 1);
        assert_eq!(result.actions[0].action, "refund_payment");
        assert_eq!(payment.payment_count(), 0);
        assert_eq!(payment.refund_count(), 1);
    }

    #[tokio::test]
    async fn test_compensate_reports_refund_failure() {
        let payment = Arc::new(InMemoryPaymentService::new());
        let step = step(payment.clone());
        let mut saga = reserved_saga();

        let StepResult::Success(output) = step.execute(&saga).await else {
            panic!("payment should succeed");
        };
        saga.apply_output(output).unwrap();

        payment.set_fail_on_refund(Some(ServiceError::Rejected("already settled".to_string())));
        let result = step.compensate(&saga).await;
        assert!(!result.success);
        assert!(!result.actions[0].completed);
        assert!(result.error.is_some());
    }
}
