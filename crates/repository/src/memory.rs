//! In-memory repository implementation for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CorrelationId, SagaId};
use domain::{Saga, SagaState};
use tokio::sync::RwLock;

use crate::error::RepositoryError;
use crate::repository::SagaRepository;
use crate::step_log::SagaStepLog;
use crate::Result;

#[derive(Default)]
struct Inner {
    sagas: HashMap<SagaId, Saga>,
    step_logs: Vec<SagaStepLog>,
    next_id: i64,
}

/// In-memory saga repository with sequential key assignment.
///
/// Provides the same interface as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemorySagaRepository {
    inner: Arc<RwLock<Inner>>,
}

impl InMemorySagaRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sagas.
    pub async fn saga_count(&self) -> usize {
        self.inner.read().await.sagas.len()
    }

    /// Returns the total number of audit rows.
    pub async fn step_log_count(&self) -> usize {
        self.inner.read().await.step_logs.len()
    }
}

#[async_trait]
impl SagaRepository for InMemorySagaRepository {
    async fn save(&self, mut saga: Saga) -> Result<Saga> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = SagaId::new(inner.next_id);
        saga.set_id(id);
        inner.sagas.insert(id, saga.clone());
        Ok(saga)
    }

    async fn update(&self, id: SagaId, saga: &Saga) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.sagas.contains_key(&id) {
            return Err(RepositoryError::NotFound(id));
        }
        inner.sagas.insert(id, saga.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: SagaId) -> Result<Option<Saga>> {
        let inner = self.inner.read().await;
        Ok(inner.sagas.get(&id).cloned())
    }

    async fn find_by_correlation_id(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Option<Saga>> {
        let inner = self.inner.read().await;
        Ok(inner
            .sagas
            .values()
            .find(|saga| saga.correlation_id() == correlation_id)
            .cloned())
    }

    async fn log_step(&self, entry: SagaStepLog) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.step_logs.push(entry);
        Ok(())
    }

    async fn find_steps_by_saga_id(&self, saga_id: SagaId) -> Result<Vec<SagaStepLog>> {
        let inner = self.inner.read().await;
        Ok(inner
            .step_logs
            .iter()
            .filter(|log| log.saga_id == saga_id)
            .cloned()
            .collect())
    }

    async fn find_failed_sagas(&self, limit: usize) -> Result<Vec<Saga>> {
        let inner = self.inner.read().await;
        let mut failed: Vec<Saga> = inner
            .sagas
            .values()
            .filter(|saga| saga.state() == SagaState::Failed)
            .cloned()
            .collect();
        failed.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
        failed.truncate(limit);
        Ok(failed)
    }
}
