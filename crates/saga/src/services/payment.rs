//! Payment service contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::ServiceError;

/// Metadata attached to a payment request for reconciliation downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentMetadata {
    pub user_id: i64,
    pub store_id: i64,
    pub correlation_id: String,
}

/// Trait for payment processing and refunds.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Charges the given amount. Returns the transaction ID issued by the
    /// payment service.
    async fn process(
        &self,
        amount: f64,
        metadata: PaymentMetadata,
    ) -> Result<String, ServiceError>;

    /// Issues a full refund against a transaction. Returns the refund ID.
    async fn refund(&self, transaction_id: &str) -> Result<String, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    payments: HashMap<String, f64>,
    refunds: Vec<String>,
    next_id: u32,
    fail_process: Option<ServiceError>,
    fail_refund: Option<ServiceError>,
}

/// In-memory payment service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    /// Creates a new in-memory payment service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every process call fail with the given error.
    pub fn set_fail_on_process(&self, error: Option<ServiceError>) {
        self.state.write().unwrap().fail_process = error;
    }

    /// Makes every refund call fail with the given error.
    pub fn set_fail_on_refund(&self, error: Option<ServiceError>) {
        self.state.write().unwrap().fail_refund = error;
    }

    /// Returns the number of non-refunded payments.
    pub fn payment_count(&self) -> usize {
        self.state.read().unwrap().payments.len()
    }

    /// Returns the number of refunds issued.
    pub fn refund_count(&self) -> usize {
        self.state.read().unwrap().refunds.len()
    }

    /// Returns true if an active payment exists with the given ID.
    pub fn has_payment(&self, transaction_id: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .payments
            .contains_key(transaction_id)
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn process(
        &self,
        amount: f64,
        _metadata: PaymentMetadata,
    ) -> Result<String, ServiceError> {
        let mut state = self.state.write().unwrap();

        if let Some(error) = &state.fail_process {
            return Err(error.clone());
        }

        state.next_id += 1;
        let transaction_id = format!("TXN-{:04}", state.next_id);
        state.payments.insert(transaction_id.clone(), amount);

        Ok(transaction_id)
    }

    async fn refund(&self, transaction_id: &str) -> Result<String, ServiceError> {
        let mut state = self.state.write().unwrap();

        if let Some(error) = &state.fail_refund {
            return Err(error.clone());
        }

        if state.payments.remove(transaction_id).is_none() {
            return Err(ServiceError::Rejected(format!(
                "unknown transaction {transaction_id}"
            )));
        }

        state.next_id += 1;
        let refund_id = format!("RFD-{:04}", state.next_id);
        state.refunds.push(refund_id.clone());

        Ok(refund_id)
    }
}
