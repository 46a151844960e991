//! Member store port - read-only access to the members table.

use async_trait::async_trait;

use crate::domain::error::StoreError;
use crate::domain::models::MemberRecord;

/// Read-only view over the team member table.
///
/// The cache scans it page by page with the active-robot predicate
/// (`member_type = robot`, `autonomous_mode = true`, `status = active`).
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// One page of active autonomous robots, in a stable order.
    async fn list_active_robots(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MemberRecord>, StoreError>;

    /// Fetch a single member by id, regardless of predicate.
    async fn get_member(&self, member_id: &str) -> Result<Option<MemberRecord>, StoreError>;
}
