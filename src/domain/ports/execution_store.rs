//! Execution store port - durable records of executions.

use async_trait::async_trait;

use crate::domain::error::StoreError;
use crate::domain::models::{Execution, ExecutionFilters, ExecutionStatus, Phase, PhaseArtifact};

/// Durable record store keyed by execution id.
///
/// The store is the authority for post-mortem reads. Implementations
/// must preserve unknown JSON fields inside phase slots across
/// read-modify-write cycles.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert or replace the full record.
    async fn save(&self, execution: &Execution) -> Result<(), StoreError>;

    /// Fetch a record by id.
    async fn get(&self, execution_id: &str) -> Result<Option<Execution>, StoreError>;

    /// List records matching the filters, start time descending.
    async fn list(&self, filters: &ExecutionFilters) -> Result<Vec<Execution>, StoreError>;

    /// Update the status (and error message) of a record.
    async fn update_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> Result<(), StoreError>;

    /// Write one phase artifact and advance the phase marker.
    async fn update_phase(
        &self,
        execution_id: &str,
        artifact: &PhaseArtifact,
    ) -> Result<(), StoreError>;

    /// Advance the phase marker without an artifact (phase entry).
    async fn update_current(&self, execution_id: &str, phase: Phase) -> Result<(), StoreError>;

    /// Delete a record.
    async fn delete(&self, execution_id: &str) -> Result<(), StoreError>;
}
