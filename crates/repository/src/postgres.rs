//! PostgreSQL-backed saga repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CorrelationId, SagaId};
use domain::{CompensationSummary, Saga, SagaState, SaleContext};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::Result;
use crate::error::RepositoryError;
use crate::repository::SagaRepository;
use crate::step_log::SagaStepLog;

/// PostgreSQL saga repository.
///
/// Saga context and compensation summaries are stored as JSONB; the state
/// column holds the canonical SCREAMING_SNAKE_CASE state name.
#[derive(Clone)]
pub struct PostgresSagaRepository {
    pool: PgPool,
}

impl PostgresSagaRepository {
    /// Creates a new PostgreSQL saga repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("saga schema migrations applied");
        Ok(())
    }

    fn parse_state(raw: &str) -> Result<SagaState> {
        raw.parse::<SagaState>().map_err(RepositoryError::Corrupt)
    }

    fn row_to_saga(row: PgRow) -> Result<Saga> {
        let state = Self::parse_state(&row.try_get::<String, _>("state")?)?;
        let context: SaleContext = serde_json::from_value(row.try_get("context")?)?;
        let compensation_data: Option<CompensationSummary> = row
            .try_get::<Option<serde_json::Value>, _>("compensation_data")?
            .map(serde_json::from_value)
            .transpose()?;

        Ok(Saga::hydrate(
            SagaId::new(row.try_get("id")?),
            CorrelationId::from_uuid(row.try_get::<Uuid, _>("correlation_id")?),
            state,
            row.try_get("current_step")?,
            context,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
            row.try_get("completed_at")?,
            row.try_get("error_message")?,
            compensation_data,
        ))
    }

    fn row_to_step_log(row: PgRow) -> Result<SagaStepLog> {
        Ok(SagaStepLog {
            saga_id: SagaId::new(row.try_get("saga_id")?),
            step_name: row.try_get("step_name")?,
            from_state: Self::parse_state(&row.try_get::<String, _>("from_state")?)?,
            to_state: Self::parse_state(&row.try_get::<String, _>("to_state")?)?,
            timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
            duration_ms: row.try_get::<i64, _>("duration_ms")? as u64,
            success: row.try_get("success")?,
            error: row.try_get("error")?,
        })
    }
}

const SAGA_COLUMNS: &str = "id, correlation_id, state, current_step, context, \
     created_at, updated_at, completed_at, error_message, compensation_data";

#[async_trait]
impl SagaRepository for PostgresSagaRepository {
    async fn save(&self, mut saga: Saga) -> Result<Saga> {
        let context = serde_json::to_value(saga.context())?;
        let compensation = saga
            .compensation_data()
            .map(serde_json::to_value)
            .transpose()?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sagas (correlation_id, state, current_step, context,
                               created_at, updated_at, completed_at,
                               error_message, compensation_data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(saga.correlation_id().as_uuid())
        .bind(saga.state().as_str())
        .bind(saga.current_step())
        .bind(&context)
        .bind(saga.created_at())
        .bind(saga.updated_at())
        .bind(saga.completed_at())
        .bind(saga.error_message())
        .bind(&compensation)
        .fetch_one(&self.pool)
        .await?;

        saga.set_id(SagaId::new(id));
        Ok(saga)
    }

    async fn update(&self, id: SagaId, saga: &Saga) -> Result<()> {
        let context = serde_json::to_value(saga.context())?;
        let compensation = saga
            .compensation_data()
            .map(serde_json::to_value)
            .transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE sagas
            SET state = $2, current_step = $3, context = $4, updated_at = $5,
                completed_at = $6, error_message = $7, compensation_data = $8
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .bind(saga.state().as_str())
        .bind(saga.current_step())
        .bind(&context)
        .bind(saga.updated_at())
        .bind(saga.completed_at())
        .bind(saga.error_message())
        .bind(&compensation)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: SagaId) -> Result<Option<Saga>> {
        let row = sqlx::query(&format!(
            "SELECT {SAGA_COLUMNS} FROM sagas WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_saga).transpose()
    }

    async fn find_by_correlation_id(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Option<Saga>> {
        let row = sqlx::query(&format!(
            "SELECT {SAGA_COLUMNS} FROM sagas WHERE correlation_id = $1"
        ))
        .bind(correlation_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_saga).transpose()
    }

    async fn log_step(&self, entry: SagaStepLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO saga_step_logs (saga_id, step_name, from_state, to_state,
                                        timestamp, duration_ms, success, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.saga_id.as_i64())
        .bind(&entry.step_name)
        .bind(entry.from_state.as_str())
        .bind(entry.to_state.as_str())
        .bind(entry.timestamp)
        .bind(entry.duration_ms as i64)
        .bind(entry.success)
        .bind(&entry.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_steps_by_saga_id(&self, saga_id: SagaId) -> Result<Vec<SagaStepLog>> {
        let rows = sqlx::query(
            r#"
            SELECT saga_id, step_name, from_state, to_state, timestamp,
                   duration_ms, success, error
            FROM saga_step_logs
            WHERE saga_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(saga_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_step_log).collect()
    }

    async fn find_failed_sagas(&self, limit: usize) -> Result<Vec<Saga>> {
        let rows = sqlx::query(&format!(
            "SELECT {SAGA_COLUMNS} FROM sagas WHERE state = $1 \
             ORDER BY updated_at DESC LIMIT $2"
        ))
        .bind(SagaState::Failed.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_saga).collect()
    }
}
