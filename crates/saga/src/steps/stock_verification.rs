//! Step 1: verify stock availability for every requested line.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domain::{Saga, SagaState, StepOutput, StockVerificationData, VerifiedItem};

use crate::client::ResilientClient;
use crate::services::{StockCheckItem, StockService};
use crate::steps::{SagaStep, STEP_STOCK_VERIFICATION, StepResult};

/// Verifies availability for all lines in one batch call.
///
/// Read-only against the stock service; its failure state is terminal and
/// never triggers compensation.
pub struct StockVerificationStep {
    stock: Arc<dyn StockService>,
    client: ResilientClient,
}

impl StockVerificationStep {
    pub fn new(stock: Arc<dyn StockService>, client: ResilientClient) -> Self {
        Self { stock, client }
    }
}

#[async_trait]
impl SagaStep for StockVerificationStep {
    fn name(&self) -> &'static str {
        STEP_STOCK_VERIFICATION
    }

    fn in_progress_state(&self) -> SagaState {
        SagaState::StockVerifying
    }

    fn success_state(&self) -> SagaState {
        SagaState::StockVerified
    }

    fn failure_state(&self) -> SagaState {
        SagaState::StockVerificationFailed
    }

    async fn execute(&self, saga: &Saga) -> StepResult {
        let request = &saga.context().sale_request;
        let items: Vec<StockCheckItem> = request
            .lines
            .iter()
            .map(|line| StockCheckItem {
                store_id: request.store_id,
                product_id: line.product_id,
                quantity: line.quantity,
            })
            .collect();

        let outcome = match self
            .client
            .call(STEP_STOCK_VERIFICATION, || self.stock.verify(items.clone()))
            .await
        {
            Ok(outcome) => outcome,
            Err(error) => {
                return StepResult::failure(format!("stock verification failed: {error}"));
            }
        };

        if !outcome.verified {
            let products = outcome
                .insufficient
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return StepResult::failure(format!("insufficient stock for products: {products}"));
        }

        let verified_items = request
            .lines
            .iter()
            .map(|line| {
                let available = outcome
                    .availability
                    .iter()
                    .find(|a| a.product_id == line.product_id)
                    .map(|a| a.available)
                    .unwrap_or(0);
                VerifiedItem {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available,
                }
            })
            .collect();

        StepResult::Success(StepOutput::StockVerification(StockVerificationData {
            verified: true,
            items: verified_items,
            verified_at: Utc::now(),
        }))
    }
}
