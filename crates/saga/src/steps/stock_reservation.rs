//! Step 2: reserve stock for every line, all-or-nothing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domain::{
    CompensationAction, ReservedItem, Saga, SagaState, StepOutput, StockReservationData,
};

use crate::client::ResilientClient;
use crate::services::StockService;
use crate::steps::{CompensationResult, SagaStep, STEP_STOCK_RESERVATION, StepResult};

/// Reserves every line, one reservation per product.
///
/// If a mid-batch line fails, earlier reservations of the same batch are
/// released before the failure is reported, so a reported reservation
/// failure never leaves stock held. Compensation releases the reservations
/// recorded in the context section.
pub struct StockReservationStep {
    stock: Arc<dyn StockService>,
    client: ResilientClient,
}

impl StockReservationStep {
    pub fn new(stock: Arc<dyn StockService>, client: ResilientClient) -> Self {
        Self { stock, client }
    }

    async fn release_all(&self, reserved: &[ReservedItem]) -> Vec<CompensationAction> {
        let mut actions = Vec::with_capacity(reserved.len());
        for item in reserved {
            let released = self
                .client
                .call("stock_release", || self.stock.release(&item.reservation_id))
                .await
                .is_ok();
            actions.push(CompensationAction {
                action: "release_stock".to_string(),
                data: serde_json::json!({
                    "reservation_id": item.reservation_id,
                    "product_id": item.product_id,
                    "quantity": item.quantity,
                }),
                completed: released,
                recorded_at: Utc::now(),
            });
        }
        actions
    }
}

#[async_trait]
impl SagaStep for StockReservationStep {
    fn name(&self) -> &'static str {
        STEP_STOCK_RESERVATION
    }

    fn in_progress_state(&self) -> SagaState {
        SagaState::StockReserving
    }

    fn success_state(&self) -> SagaState {
        SagaState::StockReserved
    }

    fn failure_state(&self) -> SagaState {
        SagaState::StockReservationFailed
    }

    fn compensating_state(&self) -> Option<SagaState> {
        Some(SagaState::CompensatingStock)
    }

    async fn execute(&self, saga: &Saga) -> StepResult {
        let request = &saga.context().sale_request;
        let mut reserved: Vec<ReservedItem> = Vec::with_capacity(request.lines.len());

        for line in &request.lines {
            let result = self
                .client
                .call(STEP_STOCK_RESERVATION, || {
                    self.stock
                        .reserve(request.store_id, line.product_id, line.quantity)
                })
                .await;

            match result {
                Ok(reservation_id) => reserved.push(ReservedItem {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    reservation_id,
                }),
                Err(error) => {
                    // Undo the partial batch before reporting failure.
                    let rollback = self.release_all(&reserved).await;
                    let released = rollback.iter().filter(|a| a.completed).count();
                    tracing::warn!(
                        product_id = line.product_id,
                        released,
                        total = rollback.len(),
                        %error,
                        "mid-batch reservation failure, partial batch released"
                    );
                    return StepResult::failure(format!(
                        "stock reservation failed for product {}: {error}",
                        line.product_id
                    ));
                }
            }
        }

        StepResult::Success(StepOutput::StockReservation(StockReservationData {
            items: reserved,
            reserved_at: Utc::now(),
        }))
    }

    async fn compensate(&self, saga: &Saga) -> CompensationResult {
        let Some(reservation) = &saga.context().stock_reservation else {
            return CompensationResult::nothing_to_undo();
        };

        let actions = self.release_all(&reservation.items).await;
        let failed = actions.iter().filter(|a| !a.completed).count();
        CompensationResult {
            success: failed == 0,
            error: (failed > 0).then(|| format!("{failed} reservation release(s) failed")),
            actions,
        }
    }
}

#[cfg(test)]
mod tests {
    use common::CorrelationId;
    use domain::{SaleLine, SaleRequest};

    use super::*;
    use crate::client::RetryConfig;
    use crate::services::{InMemoryStockService, ServiceError};

    fn saga() -> Saga {
        Saga::new(
            CorrelationId::new(),
            SaleRequest::new(1, 1, vec![SaleLine::new(1, 2, 10.0), SaleLine::new(2, 1, 5.0)]),
        )
    }

    fn step(stock: Arc<InMemoryStockService>) -> StockReservationStep {
        let config = RetryConfig {
            initial_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(2),
            ..RetryConfig::default()
        };
        StockReservationStep::new(stock, ResilientClient::new(config))
    }

    #[tokio::test]
    async fn test_reserves_every_line() {
        let stock = Arc::new(InMemoryStockService::new());
        stock.set_available(1, 10);
        stock.set_available(2, 3);

        assert!(step(stock.clone()).can_compensate());

        let result = step(stock.clone()).execute(&saga()).await;
        match result {
            StepResult::Success(StepOutput::StockReservation(data)) => {
                assert_eq!(data.items.len(), 2);
                assert!(data.items.iter().all(|i| i.reservation_id.starts_with("RSV-")));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(stock.reservation_count(), 2);
    }

    #[tokio::test]
    async fn test_mid_batch_failure_releases_earlier_lines() {
        let stock = Arc::new(InMemoryStockService::new());
        stock.set_available(1, 10);
        stock.set_available(2, 3);
        stock.set_fail_on_reserve_product(Some(2));

        let result = step(stock.clone()).execute(&saga()).await;
        assert!(matches!(result, StepResult::Failure { .. }));
        // The reservation for product 1 was rolled back.
        assert_eq!(stock.reservation_count(), 0);
    }

    #[tokio::test]
    async fn test_compensate_releases_recorded_reservations() {
        let stock = Arc::new(InMemoryStockService::new());
        stock.set_available(1, 10);
        stock.set_available(2, 3);

        let step = step(stock.clone());
        let mut saga = saga();
        let StepResult::Success(output) = step.execute(&saga).await else {
            panic!("reservation should succeed");
        };
        saga.apply_output(output).unwrap();
        assert_eq!(stock.reservation_count(), 2);

        let result = step.compensate(&saga).await;
        assert!(result.success);
        assert_eq!(result.actions.len(), 2);
        assert!(result.actions.iter().all(|a| a.completed));
        assert_eq!(stock.reservation_count(), 0);
    }

    #[tokio::test]
    async fn test_compensate_reports_release_failures() {
        let stock = Arc::new(InMemoryStockService::new());
        stock.set_available(1, 10);
        stock.set_available(2, 3);

        let step = step(stock.clone());
        let mut saga = saga();
        let StepResult::Success(output) = step.execute(&saga).await else {
            panic!("reservation should succeed");
        };
        saga.apply_output(output).unwrap();

        stock.set_fail_on_release(Some(ServiceError::Rejected("gone".to_string())));
        let result = step.compensate(&saga).await;
        assert!(!result.success);
        assert!(result.error.is_some());
        assert!(result.actions.iter().all(|a| !a.completed));
    }

    #[tokio::test]
    async fn test_compensate_without_section_is_noop() {
        let stock = Arc::new(InMemoryStockService::new());
        let result = step(stock).compensate(&saga()).await;
        assert!(result.success);
        assert!(result.actions.is_empty());
    }
}
