//! Robot cache - the hot in-memory view of autonomous members.
//!
//! Holds `member_id → Robot` plus a `team_id → member ids` secondary
//! index behind one reader-writer lock. A full load scans the member
//! store page by page into a shadow map and swaps it in atomically, so a
//! failed load never corrupts the live view.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::error::{ExecutionError, StoreError};
use crate::domain::models::{MemberRecord, Robot};
use crate::domain::ports::MemberStore;

/// Page size for full loads.
const LOAD_PAGE_SIZE: usize = 100;

/// Default interval between background refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Default)]
struct CacheInner {
    robots: HashMap<String, Arc<Robot>>,
    teams: HashMap<String, HashSet<String>>,
}

impl CacheInner {
    fn insert(&mut self, robot: Arc<Robot>) {
        self.teams
            .entry(robot.team_id.clone())
            .or_default()
            .insert(robot.member_id.clone());
        self.robots.insert(robot.member_id.clone(), robot);
    }

    fn remove(&mut self, member_id: &str) -> Option<Arc<Robot>> {
        let robot = self.robots.remove(member_id)?;
        if let Some(members) = self.teams.get_mut(&robot.team_id) {
            members.remove(member_id);
            if members.is_empty() {
                self.teams.remove(&robot.team_id);
            }
        }
        Some(robot)
    }
}

/// Counters exposed for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub robots: usize,
    pub teams: usize,
}

struct RefreshTask {
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The hot view of autonomous members.
pub struct RobotCache {
    store: Arc<dyn MemberStore>,
    inner: RwLock<CacheInner>,
    refresh: Mutex<Option<RefreshTask>>,
}

impl RobotCache {
    pub fn new(store: Arc<dyn MemberStore>) -> Self {
        Self {
            store,
            inner: RwLock::new(CacheInner::default()),
            refresh: Mutex::new(None),
        }
    }

    /// Full load: paged scan of active autonomous robots, then an atomic
    /// swap. Robots already cached keep their runtime counters; records
    /// with invalid configs are logged and skipped.
    pub async fn load(&self) -> Result<usize, StoreError> {
        let existing: HashMap<String, Arc<Robot>> = {
            let inner = self.inner.read().await;
            inner.robots.clone()
        };

        let mut shadow = CacheInner::default();
        let mut offset = 0;
        loop {
            let page = self.store.list_active_robots(offset, LOAD_PAGE_SIZE).await?;
            let page_len = page.len();
            for record in &page {
                if !record.is_active_robot() {
                    continue;
                }
                match self.materialize(record, &existing) {
                    Ok(robot) => shadow.insert(Arc::new(robot)),
                    Err(e) => {
                        warn!(
                            member_id = %record.member_id,
                            error = %e,
                            "Skipping robot with invalid config"
                        );
                    }
                }
            }
            if page_len < LOAD_PAGE_SIZE {
                break;
            }
            offset += page_len;
        }

        let count = shadow.robots.len();
        let mut inner = self.inner.write().await;
        *inner = shadow;
        info!(robots = count, "Robot cache loaded");
        Ok(count)
    }

    fn materialize(
        &self,
        record: &MemberRecord,
        existing: &HashMap<String, Arc<Robot>>,
    ) -> Result<Robot, crate::domain::error::ConfigError> {
        match existing.get(&record.member_id) {
            Some(current) => current.refreshed_from(record),
            None => Robot::from_record(record),
        }
    }

    /// Fetch a robot, loading it from the member store when absent.
    pub async fn load_by_id(&self, member_id: &str) -> Result<Arc<Robot>, ExecutionError> {
        if let Some(robot) = self.inner.read().await.robots.get(member_id) {
            return Ok(Arc::clone(robot));
        }

        let record = self
            .store
            .get_member(member_id)
            .await?
            .filter(MemberRecord::is_active_robot)
            .ok_or_else(|| ExecutionError::RobotNotFound(member_id.to_string()))?;

        let robot = Arc::new(
            Robot::from_record(&record)
                .map_err(|e| ExecutionError::RobotNotFound(format!("{member_id}: {e}")))?,
        );
        self.inner.write().await.insert(Arc::clone(&robot));
        Ok(robot)
    }

    /// Reload one entry. Evicts it when the record no longer satisfies
    /// the active predicate.
    pub async fn refresh(&self, member_id: &str) -> Result<Option<Arc<Robot>>, StoreError> {
        let record = self.store.get_member(member_id).await?;
        let mut inner = self.inner.write().await;

        let Some(record) = record.filter(MemberRecord::is_active_robot) else {
            if inner.remove(member_id).is_some() {
                debug!(member_id, "Evicted robot no longer active");
            }
            return Ok(None);
        };

        let robot = match inner.robots.get(member_id) {
            Some(current) => current.refreshed_from(&record),
            None => Robot::from_record(&record),
        };
        match robot {
            Ok(robot) => {
                let robot = Arc::new(robot);
                inner.insert(Arc::clone(&robot));
                Ok(Some(robot))
            }
            Err(e) => {
                inner.remove(member_id);
                warn!(member_id, error = %e, "Evicted robot with invalid config");
                Ok(None)
            }
        }
    }

    /// Fetch a cached robot.
    pub async fn get(&self, member_id: &str) -> Result<Arc<Robot>, ExecutionError> {
        self.inner
            .read()
            .await
            .robots
            .get(member_id)
            .cloned()
            .ok_or_else(|| ExecutionError::RobotNotFound(member_id.to_string()))
    }

    /// Insert a robot directly, maintaining both indices.
    pub async fn add(&self, robot: Robot) {
        self.inner.write().await.insert(Arc::new(robot));
    }

    /// Remove a robot directly, maintaining both indices.
    pub async fn remove(&self, member_id: &str) -> bool {
        self.inner.write().await.remove(member_id).is_some()
    }

    /// All cached robots.
    pub async fn all(&self) -> Vec<Arc<Robot>> {
        self.inner.read().await.robots.values().cloned().collect()
    }

    /// Cached robots of one team.
    pub async fn team_members(&self, team_id: &str) -> Vec<Arc<Robot>> {
        let inner = self.inner.read().await;
        inner
            .teams
            .get(team_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.robots.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.read().await;
        CacheStats {
            robots: inner.robots.len(),
            teams: inner.teams.len(),
        }
    }

    /// Start the background full-refresh loop. Calling start again stops
    /// the previous loop first.
    pub async fn start_auto_refresh(self: &Arc<Self>, interval: Duration) {
        self.stop_auto_refresh().await;

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
        let cache = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick is not a refresh
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = cache.load().await {
                            warn!(error = %e, "Background robot cache refresh failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("Robot cache auto-refresh stopping");
                        return;
                    }
                }
            }
        });

        *self.refresh.lock().await = Some(RefreshTask { shutdown_tx, handle });
    }

    /// Stop the background refresh loop and wait for it to exit.
    /// Idempotent; no task outlives this call.
    pub async fn stop_auto_refresh(&self) {
        let task = self.refresh.lock().await.take();
        if let Some(task) = task {
            let _ = task.shutdown_tx.send(true);
            let _ = task.handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubMemberStore {
        records: RwLock<Vec<MemberRecord>>,
        list_calls: AtomicUsize,
    }

    impl StubMemberStore {
        fn new(records: Vec<MemberRecord>) -> Self {
            Self {
                records: RwLock::new(records),
                list_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MemberStore for StubMemberStore {
        async fn list_active_robots(
            &self,
            offset: usize,
            limit: usize,
        ) -> Result<Vec<MemberRecord>, StoreError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let records = self.records.read().await;
            Ok(records
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

    fn record(member_id: &str, team_id: &str) -> MemberRecord {
        MemberRecord {
            member_id: member_id.to_string(),
            team_id: team_id.to_string(),
            member_type: "robot".to_string(),
            status: "active".to_string(),
            autonomous_mode: true,
            display_name: member_id.to_string(),
            system_prompt: None,
            robot_email: None,
            robot_config: json!({"identity": {"role": "analyst"}}),
        }
    }

    #[tokio::test]
    async fn test_load_and_team_index() {
        let store = Arc::new(StubMemberStore::new(vec![
            record("r1", "t1"),
            record("r2", "t1"),
            record("r3", "t2"),
        ]));
        let cache = RobotCache::new(store);

        assert_eq!(cache.load().await.unwrap(), 3);
        assert_eq!(cache.stats().await, CacheStats { robots: 3, teams: 2 });
        assert_eq!(cache.team_members("t1").await.len(), 2);
        assert_eq!(cache.team_members("t2").await.len(), 1);
        assert!(cache.team_members("t9").await.is_empty());
    }

    #[tokio::test]
    async fn test_load_skips_invalid_config() {
        let mut bad = record("bad", "t1");
        bad.robot_config = json!({"identity": {"role": ""}});
        let store = Arc::new(StubMemberStore::new(vec![record("r1", "t1"), bad]));
        let cache = RobotCache::new(store);

        assert_eq!(cache.load().await.unwrap(), 1);
        assert!(cache.get("bad").await.is_err());
    }

    #[tokio::test]
    async fn test_add_get_remove_round_trip() {
        let store = Arc::new(StubMemberStore::new(vec![]));
        let cache = RobotCache::new(store);

        let robot = Robot::from_record(&record("r1", "t1")).unwrap();
        cache.add(robot).await;
        assert_eq!(cache.get("r1").await.unwrap().member_id, "r1");

        assert!(cache.remove("r1").await);
        assert!(cache.get("r1").await.is_err());
        assert!(!cache.remove("r1").await);
        assert_eq!(cache.stats().await, CacheStats { robots: 0, teams: 0 });
    }

    #[tokio::test]
    async fn test_refresh_evicts_inactive() {
        let store = Arc::new(StubMemberStore::new(vec![record("r1", "t1")]));
        let cache = RobotCache::new(Arc::clone(&store) as Arc<dyn MemberStore>);
        cache.load().await.unwrap();
        assert!(cache.get("r1").await.is_ok());

        store.records.write().await[0].status = "disabled".to_string();
        assert!(cache.refresh("r1").await.unwrap().is_none());
        assert!(cache.get("r1").await.is_err());
    }

    #[tokio::test]
    async fn test_full_load_keeps_runtime_counters() {
        let store = Arc::new(StubMemberStore::new(vec![record("r1", "t1")]));
        let cache = RobotCache::new(Arc::clone(&store) as Arc<dyn MemberStore>);
        cache.load().await.unwrap();

        let robot = cache.get("r1").await.unwrap();
        assert!(robot.runtime.try_begin("e1", 2).await);

        cache.load().await.unwrap();
        let reloaded = cache.get("r1").await.unwrap();
        assert_eq!(reloaded.runtime.running_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_start_stop_cycles() {
        let store = Arc::new(StubMemberStore::new(vec![record("r1", "t1")]));
        let cache = Arc::new(RobotCache::new(Arc::clone(&store) as Arc<dyn MemberStore>));

        for _ in 0..5 {
            cache.start_auto_refresh(Duration::from_secs(60)).await;
            cache.stop_auto_refresh().await;
        }
        // Stop twice: idempotent
        cache.stop_auto_refresh().await;

        let calls_after_stop = store.list_calls.load(Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(300)).await;
        tokio::task::yield_now().await;
        assert_eq!(
            store.list_calls.load(Ordering::SeqCst),
            calls_after_stop,
            "no refresh loop survives stop"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_ticks() {
        let store = Arc::new(StubMemberStore::new(vec![record("r1", "t1")]));
        let cache = Arc::new(RobotCache::new(Arc::clone(&store) as Arc<dyn MemberStore>));

        cache.start_auto_refresh(Duration::from_secs(60)).await;
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(61)).await;
            tokio::task::yield_now().await;
        }
        cache.stop_auto_refresh().await;

        assert!(store.list_calls.load(Ordering::SeqCst) >= 2);
        assert!(cache.get("r1").await.is_ok());
    }
}
