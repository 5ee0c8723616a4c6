//! The saga persistence contract.

use async_trait::async_trait;
use common::{CorrelationId, SagaId};
use domain::Saga;

use crate::Result;
use crate::step_log::SagaStepLog;

/// Storage contract for sagas and their audit trail.
///
/// Every operation is fallible. Callers must not assume atomicity across a
/// `save`/`update` + `log_step` pair beyond best-effort sequencing; the
/// state manager always persists the saga first and appends the log row
/// second.
#[async_trait]
pub trait SagaRepository: Send + Sync {
    /// Persists a new saga and returns it with its store-assigned key.
    async fn save(&self, saga: Saga) -> Result<Saga>;

    /// Overwrites the stored saga with the given key.
    async fn update(&self, id: SagaId, saga: &Saga) -> Result<()>;

    /// Fetches a saga by its persistence key.
    async fn find_by_id(&self, id: SagaId) -> Result<Option<Saga>>;

    /// Fetches a saga by its caller-visible correlation ID.
    async fn find_by_correlation_id(&self, correlation_id: CorrelationId)
    -> Result<Option<Saga>>;

    /// Appends one audit row. Rows are never updated or deleted.
    async fn log_step(&self, entry: SagaStepLog) -> Result<()>;

    /// Returns the audit trail for a saga, oldest first.
    async fn find_steps_by_saga_id(&self, saga_id: SagaId) -> Result<Vec<SagaStepLog>>;

    /// Returns sagas in the FAILED state, most recently updated first.
    async fn find_failed_sagas(&self, limit: usize) -> Result<Vec<Saga>>;
}
