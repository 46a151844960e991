//! Knowledge base port.
//!
//! Each robot owns a private collection named
//! `robot_{team_id}_{member_id}_kb`; the learning phase appends entries
//! there and prunes old ones.

use async_trait::async_trait;

use crate::domain::error::StoreError;
use crate::domain::models::LearningEntry;

/// The vector/knowledge store collaborator.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Create a collection; succeeds if it already exists.
    async fn create_collection(&self, name: &str) -> Result<(), StoreError>;

    /// Append one entry to a collection.
    async fn insert(&self, collection: &str, entry: &LearningEntry) -> Result<(), StoreError>;

    /// Search across collections, best `k` matches first.
    async fn search(
        &self,
        collections: &[String],
        query: &str,
        k: usize,
    ) -> Result<Vec<LearningEntry>, StoreError>;

    /// Drop an entire collection.
    async fn delete_collection(&self, name: &str) -> Result<(), StoreError>;

    /// Remove entries older than the given number of days.
    /// Returns how many were removed.
    async fn prune(&self, collection: &str, older_than_days: u32) -> Result<usize, StoreError>;
}

/// No-op knowledge base for deployments without a vector store.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullKnowledgeBase;

#[async_trait]
impl KnowledgeBase for NullKnowledgeBase {
    async fn create_collection(&self, _name: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert(&self, _collection: &str, _entry: &LearningEntry) -> Result<(), StoreError> {
        Ok(())
    }

    async fn search(
        &self,
        _collections: &[String],
        _query: &str,
        _k: usize,
    ) -> Result<Vec<LearningEntry>, StoreError> {
        Ok(Vec::new())
    }

    async fn delete_collection(&self, _name: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn prune(&self, _collection: &str, _older_than_days: u32) -> Result<usize, StoreError> {
        Ok(0)
    }
}
