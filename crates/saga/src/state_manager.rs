//! Persisted state transitions with an append-only audit trail.

use std::sync::Arc;

use common::{CorrelationId, SagaId};
use domain::{Saga, SagaState};
use repository::{SagaRepository, SagaStepLog};

use crate::error::{Result, SagaError};

/// Applies validated state transitions and persists each one.
///
/// Every transition writes the saga first and its audit row second, so a
/// crash between the two loses at most one log row, never a state change.
/// The audit trail is write-only from here; nothing in the engine reads it
/// back for control flow.
pub struct StateManager {
    repository: Arc<dyn SagaRepository>,
}

impl StateManager {
    pub fn new(repository: Arc<dyn SagaRepository>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Arc<dyn SagaRepository> {
        &self.repository
    }

    /// Persists a new saga, enforcing correlation ID uniqueness.
    pub async fn create(&self, saga: Saga) -> Result<Saga> {
        let correlation_id = saga.correlation_id();
        if !self.is_correlation_id_unique(correlation_id).await? {
            return Err(SagaError::CorrelationIdTaken(correlation_id));
        }
        Ok(self.repository.save(saga).await?)
    }

    /// Read-only existence check for a caller-supplied correlation ID.
    pub async fn is_correlation_id_unique(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<bool> {
        Ok(self
            .repository
            .find_by_correlation_id(correlation_id)
            .await?
            .is_none())
    }

    /// Transitions the saga and persists the result plus one audit row.
    ///
    /// An invalid transition is rejected before anything is written; the
    /// saga stays unchanged in memory and in the store.
    pub async fn transition(
        &self,
        saga: &mut Saga,
        new_state: SagaState,
        step_name: &str,
        duration_ms: u64,
        success: bool,
        error: Option<String>,
    ) -> Result<()> {
        let from_state = saga.state();
        saga.update_state(new_state, Some(step_name))?;

        if let Some(err) = &error {
            saga.set_error(err.clone());
        }

        let id = self.persist(saga).await?;
        self.repository
            .log_step(SagaStepLog::new(
                id, step_name, from_state, new_state, duration_ms, success, error,
            ))
            .await?;

        tracing::info!(
            saga_id = id.as_i64(),
            correlation_id = %saga.correlation_id(),
            from = %from_state,
            to = %new_state,
            step = step_name,
            "saga transitioned"
        );
        metrics::counter!("saga_transitions_total", "to_state" => new_state.as_str()).increment(1);

        Ok(())
    }

    /// Forces the saga into `FAILED` and persists it, with an audit row
    /// recording the jump. The outermost error path; never used when a
    /// validated transition exists.
    pub async fn force_fail(
        &self,
        saga: &mut Saga,
        step_name: &str,
        reason: String,
    ) -> Result<()> {
        let from_state = saga.state();
        saga.force_fail(reason.clone());

        let id = self.persist(saga).await?;
        self.repository
            .log_step(SagaStepLog::new(
                id,
                step_name,
                from_state,
                SagaState::Failed,
                0,
                false,
                Some(reason),
            ))
            .await?;

        tracing::error!(
            saga_id = id.as_i64(),
            correlation_id = %saga.correlation_id(),
            from = %from_state,
            step = step_name,
            "saga force-failed"
        );

        Ok(())
    }

    /// Marks the saga completed and persists it. The state must already be
    /// terminal.
    pub async fn complete(&self, saga: &mut Saga) -> Result<()> {
        saga.complete()?;
        self.persist(saga).await?;
        Ok(())
    }

    /// Writes the saga's current in-memory form without changing state.
    pub async fn persist(&self, saga: &mut Saga) -> Result<SagaId> {
        match saga.id() {
            Some(id) => {
                self.repository.update(id, saga).await?;
                Ok(id)
            }
            None => {
                let saved = self.repository.save(saga.clone()).await?;
                let id = saved.id().ok_or(repository::RepositoryError::MissingId)?;
                saga.set_id(id);
                Ok(id)
            }
        }
    }

    pub async fn find_by_correlation_id(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Option<Saga>> {
        Ok(self
            .repository
            .find_by_correlation_id(correlation_id)
            .await?)
    }

    pub async fn find_steps(&self, saga_id: SagaId) -> Result<Vec<SagaStepLog>> {
        Ok(self.repository.find_steps_by_saga_id(saga_id).await?)
    }

    pub async fn find_failed(&self, limit: usize) -> Result<Vec<Saga>> {
        Ok(self.repository.find_failed_sagas(limit).await?)
    }
}
