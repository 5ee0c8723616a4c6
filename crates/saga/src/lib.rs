//! Saga orchestration engine for multi-step sale transactions.
//!
//! Drives a 4-step distributed transaction (verify stock → reserve stock →
//! process payment → confirm order) across independently owned services with
//! no shared transaction boundary. A partial failure leaves the system in a
//! recoverable, explicitly tracked state via compensating actions executed in
//! reverse dependency order.
//!
//! The orchestrator is the only entry point an outer transport layer calls;
//! everything downstream goes through the resilient client's bounded-retry
//! layer.

pub mod client;
pub mod compensation;
pub mod error;
pub mod orchestrator;
pub mod services;
pub mod state_manager;
pub mod steps;

pub use client::{HealthStatus, ResilientClient, RetryConfig};
pub use compensation::{CompensationHandler, compensation_plan};
pub use error::SagaError;
pub use orchestrator::{OrchestrationResult, SagaOrchestrator};
pub use services::{
    InMemoryPaymentService, InMemorySaleService, InMemoryStockService, PaymentMetadata,
    PaymentService, SaleCreation, SaleService, ServiceError, StockAvailability, StockCheckItem,
    StockService, StockVerificationOutcome,
};
pub use state_manager::StateManager;
pub use steps::{
    CompensationResult, OrderConfirmationStep, PaymentProcessingStep, SagaStep,
    STEP_ORDER_CONFIRMATION, STEP_PAYMENT_PROCESSING, STEP_STOCK_RESERVATION,
    STEP_STOCK_VERIFICATION, StepResult, StockReservationStep, StockVerificationStep,
};
