//! Saga persistence.
//!
//! The core consumes the [`SagaRepository`] contract only; the in-memory
//! implementation backs tests and the PostgreSQL implementation backs
//! deployments. The repository also owns the append-only step log used for
//! history and debugging, never for control flow.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod step_log;

pub use error::{RepositoryError, Result};
pub use memory::InMemorySagaRepository;
pub use postgres::PostgresSagaRepository;
pub use repository::SagaRepository;
pub use step_log::SagaStepLog;
