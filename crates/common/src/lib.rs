//! Shared identifier types used across the sale saga workspace.

mod types;

pub use types::{CorrelationId, SagaId};
