//! In-memory adapters - embeddable member and execution stores.
//!
//! Useful for tests and for hosts that do not wire a database.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::error::StoreError;
use crate::domain::models::{
    Execution, ExecutionFilters, ExecutionStatus, MemberRecord, Phase, PhaseArtifact,
};
use crate::domain::ports::{ExecutionStore, MemberStore};

/// Member store over a plain vector.
pub struct MemoryMemberStore {
    records: RwLock<Vec<MemberRecord>>,
}

impl MemoryMemberStore {
    pub fn new(records: Vec<MemberRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Insert or replace a record by member id.
    pub async fn upsert(&self, record: MemberRecord) {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.member_id == record.member_id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    pub async fn remove(&self, member_id: &str) {
        self.records.write().await.retain(|r| r.member_id != member_id);
    }
}

#[async_trait]
impl MemberStore for MemoryMemberStore {
    async fn list_active_robots(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MemberRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.is_active_robot())
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_member(&self, member_id: &str) -> Result<Option<MemberRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|r| r.member_id == member_id)
            .cloned())
    }
}

/// Execution store over a hash map.
#[derive(Default)]
pub struct MemoryExecutionStore {
    executions: RwLock<HashMap<String, Execution>>,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.executions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn save(&self, execution: &Execution) -> Result<(), StoreError> {
        self.executions
            .write()
            .await
            .insert(execution.execution_id.clone(), execution.clone());
        Ok(())
    }

    async fn get(&self, execution_id: &str) -> Result<Option<Execution>, StoreError> {
        Ok(self.executions.read().await.get(execution_id).cloned())
    }

    async fn list(&self, filters: &ExecutionFilters) -> Result<Vec<Execution>, StoreError> {
        let executions = self.executions.read().await;
        let mut matching: Vec<Execution> = executions
            .values()
            .filter(|e| filters.matches(e))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.start_time.cmp(&a.start_time));

        let offset = filters.offset.unwrap_or(0);
        let limit = filters.limit.unwrap_or(usize::MAX);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn update_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(execution_id)
            .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))?;
        execution.status = status;
        if error.is_some() {
            execution.error = error;
        }
        if status.is_terminal() && execution.end_time.is_none() {
            execution.end_time = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn update_phase(
        &self,
        execution_id: &str,
        artifact: &PhaseArtifact,
    ) -> Result<(), StoreError> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(execution_id)
            .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))?;
        execution.record_artifact(artifact.clone());
        Ok(())
    }

    async fn update_current(&self, execution_id: &str, phase: Phase) -> Result<(), StoreError> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(execution_id)
            .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))?;
        execution.phase = Some(phase);
        Ok(())
    }

    async fn delete(&self, execution_id: &str) -> Result<(), StoreError> {
        self.executions.write().await.remove(execution_id);
        Ok(())
    }
}
