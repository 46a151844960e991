//! Learning writer (P5) - persists entries to the robot's private
//! knowledge collection and prunes old ones.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::error::StoreError;
use crate::domain::models::{private_collection, LearningEntry, Robot};
use crate::domain::ports::KnowledgeBase;

/// Appends learning entries to `robot_{team}_{member}_kb`.
pub struct LearningService {
    knowledge: Arc<dyn KnowledgeBase>,
}

impl LearningService {
    pub fn new(knowledge: Arc<dyn KnowledgeBase>) -> Self {
        Self { knowledge }
    }

    /// Write all entries, then prune anything older than
    /// `learn.keep_days` (0 keeps forever). Returns how many entries
    /// were written.
    pub async fn record(
        &self,
        robot: &Robot,
        entries: &[LearningEntry],
    ) -> Result<usize, StoreError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let collection = private_collection(&robot.team_id, &robot.member_id);
        self.knowledge.create_collection(&collection).await?;

        for entry in entries {
            self.knowledge.insert(&collection, entry).await?;
        }

        let keep_days = robot.config.learn.keep_days;
        if keep_days > 0 {
            match self.knowledge.prune(&collection, keep_days).await {
                Ok(pruned) if pruned > 0 => {
                    debug!(collection = %collection, pruned, "Pruned old learning entries");
                }
                Ok(_) => {}
                Err(e) => warn!(collection = %collection, error = %e, "Learning prune failed"),
            }
        }
        Ok(entries.len())
    }

    /// Search the robot's private collection.
    pub async fn recall(
        &self,
        robot: &Robot,
        query: &str,
        k: usize,
    ) -> Result<Vec<LearningEntry>, StoreError> {
        let collection = private_collection(&robot.team_id, &robot.member_id);
        self.knowledge.search(&[collection], query, k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{LearningKind, MemberRecord};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemoryKnowledge {
        collections: Mutex<HashMap<String, Vec<LearningEntry>>>,
        prune_calls: Mutex<Vec<(String, u32)>>,
    }

    #[async_trait]
    impl KnowledgeBase for MemoryKnowledge {
        async fn create_collection(&self, name: &str) -> Result<(), StoreError> {
            self.collections
                .lock()
                .await
                .entry(name.to_string())
                .or_default();
            Ok(())
        }

        async fn insert(&self, collection: &str, entry: &LearningEntry) -> Result<(), StoreError> {
            self.collections
                .lock()
                .await
                .get_mut(collection)
                .ok_or_else(|| StoreError::NotFound(collection.to_string()))?
                .push(entry.clone());
            Ok(())
        }

        async fn search(
            &self,
            collections: &[String],
            _query: &str,
            k: usize,
        ) -> Result<Vec<LearningEntry>, StoreError> {
            let store = self.collections.lock().await;
            Ok(collections
                .iter()
                .filter_map(|c| store.get(c))
                .flatten()
                .take(k)
                .cloned()
                .collect())
        }

        async fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
            self.collections.lock().await.remove(name);
            Ok(())
        }

        async fn prune(&self, collection: &str, older_than_days: u32) -> Result<usize, StoreError> {
            self.prune_calls
                .lock()
                .await
                .push((collection.to_string(), older_than_days));
            Ok(0)
        }
    }

    fn robot(keep_days: u32) -> Robot {
        Robot::from_record(&MemberRecord {
            member_id: "r7".to_string(),
            team_id: "t2".to_string(),
            member_type: "robot".to_string(),
            status: "active".to_string(),
            autonomous_mode: true,
            display_name: "r7".to_string(),
            system_prompt: None,
            robot_email: None,
            robot_config: json!({
                "identity": {"role": "analyst"},
                "learn": {"keep_days": keep_days}
            }),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_record_writes_to_private_collection() {
        let kb = Arc::new(MemoryKnowledge::default());
        let service = LearningService::new(Arc::clone(&kb) as Arc<dyn KnowledgeBase>);

        let entries = vec![
            LearningEntry::new(LearningKind::Execution, "clock runs peak on Mondays"),
            LearningEntry::new(LearningKind::Insight, "webhook deliveries are flaky at 5pm"),
        ];
        let written = service.record(&robot(0), &entries).await.unwrap();
        assert_eq!(written, 2);

        let collections = kb.collections.lock().await;
        assert_eq!(collections.get("robot_t2_r7_kb").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_keep_days_never_prunes() {
        let kb = Arc::new(MemoryKnowledge::default());
        let service = LearningService::new(Arc::clone(&kb) as Arc<dyn KnowledgeBase>);

        let entries = vec![LearningEntry::new(LearningKind::Feedback, "noted")];
        service.record(&robot(0), &entries).await.unwrap();
        assert!(kb.prune_calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_keep_days_triggers_prune() {
        let kb = Arc::new(MemoryKnowledge::default());
        let service = LearningService::new(Arc::clone(&kb) as Arc<dyn KnowledgeBase>);

        let entries = vec![LearningEntry::new(LearningKind::Feedback, "noted")];
        service.record(&robot(30), &entries).await.unwrap();
        assert_eq!(
            kb.prune_calls.lock().await.as_slice(),
            &[("robot_t2_r7_kb".to_string(), 30)]
        );
    }

    #[tokio::test]
    async fn test_empty_entries_write_nothing() {
        let kb = Arc::new(MemoryKnowledge::default());
        let service = LearningService::new(Arc::clone(&kb) as Arc<dyn KnowledgeBase>);
        assert_eq!(service.record(&robot(30), &[]).await.unwrap(), 0);
        assert!(kb.collections.lock().await.is_empty());
    }
}
