//! Downstream service contracts and in-memory implementations.
//!
//! The orchestration core only consumes these request/response contracts;
//! the concrete services' business logic lives elsewhere. Every call goes
//! through the resilient client, which uses [`ServiceError::is_retryable`]
//! to decide between retry and terminal failure.

pub mod payment;
pub mod sale;
pub mod stock;

use thiserror::Error;

pub use payment::{InMemoryPaymentService, PaymentMetadata, PaymentService};
pub use sale::{InMemorySaleService, SaleCreation, SaleService};
pub use stock::{
    InMemoryStockService, StockAvailability, StockCheckItem, StockService,
    StockVerificationOutcome,
};

/// Upstream status codes that indicate a transient condition.
const RETRYABLE_STATUS: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Failure reported by a downstream service call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Network-level failure: connection reset/refused, DNS failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// The call did not complete within its deadline.
    #[error("request timed out")]
    Timeout,

    /// The upstream answered with a non-success status code.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// Business rejection (insufficient stock, declined payment, ...).
    /// Never retried; retrying cannot change the answer.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl ServiceError {
    /// Transient failures worth retrying: network-level errors, timeouts,
    /// and the specific upstream status codes 408/429/500/502/503/504.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Connection(_) | ServiceError::Timeout => true,
            ServiceError::Status(code) => RETRYABLE_STATUS.contains(code),
            ServiceError::Rejected(_) => false,
        }
    }
}
