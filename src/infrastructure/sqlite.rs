//! SQLite execution store.
//!
//! Scalar columns carry the fields used for filtering and ordering; the
//! full record is stored as JSON so unknown nested fields survive
//! read-modify-write cycles.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, SqlitePool};

use crate::domain::error::StoreError;
use crate::domain::models::{
    Execution, ExecutionFilters, ExecutionStatus, Phase, PhaseArtifact,
};
use crate::domain::ports::ExecutionStore;

/// Execution store backed by a SQLite pool.
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the executions table and its indexes.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS executions (
                execution_id TEXT PRIMARY KEY,
                member_id TEXT NOT NULL,
                team_id TEXT NOT NULL,
                trigger_type TEXT NOT NULL,
                status TEXT NOT NULL,
                phase TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT,
                error TEXT,
                record TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_executions_member_start
             ON executions (member_id, start_time DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn load(&self, execution_id: &str) -> Result<Execution, StoreError> {
        let row = sqlx::query("SELECT record FROM executions WHERE execution_id = ?1")
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?
            .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))?;
        decode(&row.get::<String, _>("record"))
    }

    async fn persist(&self, execution: &Execution) -> Result<(), StoreError> {
        let record = encode(execution)?;
        sqlx::query(
            "INSERT OR REPLACE INTO executions
             (execution_id, member_id, team_id, trigger_type, status, phase,
              start_time, end_time, error, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&execution.execution_id)
        .bind(&execution.member_id)
        .bind(&execution.team_id)
        .bind(execution.trigger_type.as_str())
        .bind(execution.status.as_str())
        .bind(execution.phase.map(|p| p.as_str()))
        .bind(execution.start_time.to_rfc3339())
        .bind(execution.end_time.map(|t| t.to_rfc3339()))
        .bind(&execution.error)
        .bind(record)
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }
}

fn query_failed(e: sqlx::Error) -> StoreError {
    StoreError::QueryFailed(e.to_string())
}

fn encode(execution: &Execution) -> Result<String, StoreError> {
    serde_json::to_string(execution).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode(record: &str) -> Result<Execution, StoreError> {
    serde_json::from_str(record).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl ExecutionStore for SqliteExecutionStore {
    async fn save(&self, execution: &Execution) -> Result<(), StoreError> {
        self.persist(execution).await
    }

    async fn get(&self, execution_id: &str) -> Result<Option<Execution>, StoreError> {
        match self.load(execution_id).await {
            Ok(execution) => Ok(Some(execution)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, filters: &ExecutionFilters) -> Result<Vec<Execution>, StoreError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT record FROM executions WHERE 1 = 1");
        if let Some(member_id) = &filters.member_id {
            builder.push(" AND member_id = ").push_bind(member_id);
        }
        if let Some(team_id) = &filters.team_id {
            builder.push(" AND team_id = ").push_bind(team_id);
        }
        if let Some(status) = filters.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(trigger) = filters.trigger_type {
            builder.push(" AND trigger_type = ").push_bind(trigger.as_str());
        }
        builder.push(" ORDER BY start_time DESC");
        if let Some(limit) = filters.limit {
            builder
                .push(" LIMIT ")
                .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(offset) = filters.offset {
            if filters.limit.is_none() {
                builder.push(" LIMIT -1");
            }
            builder
                .push(" OFFSET ")
                .push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
        }

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter()
            .map(|row| decode(&row.get::<String, _>("record")))
            .collect()
    }

    async fn update_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut execution = self.load(execution_id).await?;
        execution.status = status;
        if error.is_some() {
            execution.error = error;
        }
        if status.is_terminal() && execution.end_time.is_none() {
            execution.end_time = Some(chrono::Utc::now());
        }
        self.persist(&execution).await
    }

    async fn update_phase(
        &self,
        execution_id: &str,
        artifact: &PhaseArtifact,
    ) -> Result<(), StoreError> {
        let mut execution = self.load(execution_id).await?;
        execution.record_artifact(artifact.clone());
        self.persist(&execution).await
    }

    async fn update_current(&self, execution_id: &str, phase: Phase) -> Result<(), StoreError> {
        let mut execution = self.load(execution_id).await?;
        execution.phase = Some(phase);
        self.persist(&execution).await
    }

    async fn delete(&self, execution_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM executions WHERE execution_id = ?1")
            .bind(execution_id)
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }
}
