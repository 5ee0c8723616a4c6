//! Domain layer for the sale saga engine.
//!
//! Holds the saga entity with its validated state machine, the typed sale
//! context that successful steps append to, and the request types the
//! orchestrator validates before any state is persisted.

pub mod context;
pub mod error;
pub mod request;
pub mod saga;
pub mod state;

pub use context::{
    CompensationAction, CompensationSummary, PaymentData, ReservedItem, SaleContext,
    SaleResultData, StepOutput, StockReservationData, StockVerificationData, VerifiedItem,
};
pub use error::DomainError;
pub use request::{AMOUNT_TOLERANCE, SaleLine, SaleRequest, amounts_match};
pub use saga::Saga;
pub use state::SagaState;
