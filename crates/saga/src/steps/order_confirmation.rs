//! Step 4: create the final sale record.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domain::{Saga, SagaState, SaleResultData, StepOutput, amounts_match};

use crate::client::ResilientClient;
use crate::services::SaleService;
use crate::steps::{SagaStep, STEP_ORDER_CONFIRMATION, StepResult};

/// Confirms the sale against the captured payment.
///
/// The last forward step. It allocates nothing that later steps depend on,
/// so it has no compensation of its own; its failure instead triggers the
/// compensation of payment and stock. Runs under a longer deadline than the
/// other steps because sale creation fans out downstream.
pub struct OrderConfirmationStep {
    sale: Arc<dyn SaleService>,
    client: ResilientClient,
}

impl OrderConfirmationStep {
    pub fn new(sale: Arc<dyn SaleService>, client: ResilientClient) -> Self {
        Self { sale, client }
    }
}

#[async_trait]
impl SagaStep for OrderConfirmationStep {
    fn name(&self) -> &'static str {
        STEP_ORDER_CONFIRMATION
    }

    fn in_progress_state(&self) -> SagaState {
        SagaState::OrderConfirming
    }

    fn success_state(&self) -> SagaState {
        SagaState::SaleConfirmed
    }

    fn failure_state(&self) -> SagaState {
        SagaState::OrderConfirmationFailed
    }

    async fn execute(&self, saga: &Saga) -> StepResult {
        let context = saga.context();
        let Some(payment) = &context.payment else {
            return StepResult::failure("order confirmation attempted without a payment");
        };

        let request = &context.sale_request;
        let creation = match self
            .client
            .call(STEP_ORDER_CONFIRMATION, || {
                self.sale.create_sale(request, &payment.transaction_id)
            })
            .await
        {
            Ok(creation) => creation,
            Err(error) => {
                return StepResult::failure(format!("order confirmation failed: {error}"));
            }
        };

        // The created sale must total what was actually charged.
        if !amounts_match(creation.total_amount, payment.amount) {
            return StepResult::failure(format!(
                "sale total {} does not match charged amount {}",
                creation.total_amount, payment.amount
            ));
        }

        StepResult::Success(StepOutput::SaleResult(SaleResultData {
            sale_id: creation.sale_id,
            total_amount: creation.total_amount,
            confirmed_at: Utc::now(),
        }))
    }
}
