//! Robot domain model.
//!
//! A robot is an autonomous member of a team, materialized from a member
//! record whose `autonomous_mode` flag is set. Runtime counters (live
//! executions, last run) are guarded by a per-robot mutex; everything
//! else is an immutable snapshot owned by the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::error::ConfigError;

use super::config::RobotConfig;

/// Operational status of a robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    Idle,
    Working,
    Paused,
    Error,
    Maintenance,
}

impl Default for RobotStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl RobotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Paused => "paused",
            Self::Error => "error",
            Self::Maintenance => "maintenance",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "working" => Some(Self::Working),
            "paused" => Some(Self::Paused),
            "error" => Some(Self::Error),
            "maintenance" => Some(Self::Maintenance),
            _ => None,
        }
    }

    /// A paused robot accepts no new executions.
    pub fn accepts_work(&self) -> bool {
        !matches!(self, Self::Paused | Self::Maintenance)
    }
}

/// A raw row from the member store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub member_id: String,
    pub team_id: String,
    pub member_type: String,
    pub status: String,
    pub autonomous_mode: bool,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robot_email: Option<String>,
    /// Deserialized into [`RobotConfig`] when the robot is materialized
    #[serde(default)]
    pub robot_config: serde_json::Value,
}

impl MemberRecord {
    /// The cache-load predicate: active autonomous robots only.
    pub fn is_active_robot(&self) -> bool {
        self.member_type == "robot" && self.autonomous_mode && self.status == "active"
    }
}

/// Mutable runtime state of a robot, behind the per-robot mutex.
#[derive(Debug, Default)]
struct RuntimeState {
    /// Currently-live executions keyed by execution id
    live: HashMap<String, DateTime<Utc>>,
    /// When the last execution finished (drives interval clocks)
    last_run: Option<DateTime<Utc>>,
}

/// Per-robot runtime counters.
#[derive(Debug, Default)]
pub struct RobotRuntime {
    state: Mutex<RuntimeState>,
}

impl RobotRuntime {
    /// Number of currently-live executions.
    pub async fn running_count(&self) -> usize {
        self.state.lock().await.live.len()
    }

    /// Register a starting execution if the quota allows it.
    ///
    /// Returns false without registering when `live >= max`, so
    /// `running_count <= quota.max` holds at all times.
    pub async fn try_begin(&self, execution_id: &str, max: usize) -> bool {
        let mut state = self.state.lock().await;
        if state.live.len() >= max {
            return false;
        }
        state.live.insert(execution_id.to_string(), Utc::now());
        true
    }

    /// Deregister a finished execution and stamp `last_run`.
    pub async fn finish(&self, execution_id: &str) {
        let mut state = self.state.lock().await;
        state.live.remove(execution_id);
        state.last_run = Some(Utc::now());
    }

    pub async fn last_run(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_run
    }

    /// Ids of the currently-live executions.
    pub async fn live_executions(&self) -> Vec<String> {
        self.state.lock().await.live.keys().cloned().collect()
    }
}

/// An autonomous team member held by the cache.
#[derive(Debug)]
pub struct Robot {
    pub member_id: String,
    pub team_id: String,
    pub display_name: String,
    pub status: RobotStatus,
    pub system_prompt: Option<String>,
    pub email: Option<String>,
    pub config: RobotConfig,
    /// Runtime counters, shared with workers holding this robot
    pub runtime: Arc<RobotRuntime>,
}

impl Robot {
    /// Materialize a robot from a member record.
    ///
    /// The `robot_config` blob is validated here; records that fail are
    /// rejected and stay out of the cache.
    pub fn from_record(record: &MemberRecord) -> Result<Self, ConfigError> {
        let config = RobotConfig::from_value(record.robot_config.clone())?;
        let status = RobotStatus::from_str(&record.status).unwrap_or(RobotStatus::Idle);
        Ok(Self {
            member_id: record.member_id.clone(),
            team_id: record.team_id.clone(),
            display_name: record.display_name.clone(),
            status,
            system_prompt: record.system_prompt.clone(),
            email: record.robot_email.clone(),
            config,
            runtime: Arc::new(RobotRuntime::default()),
        })
    }

    /// Replace the snapshot fields from a fresh record, keeping the
    /// runtime counters (live executions survive a refresh).
    pub fn refreshed_from(&self, record: &MemberRecord) -> Result<Self, ConfigError> {
        let mut updated = Self::from_record(record)?;
        updated.runtime = Arc::clone(&self.runtime);
        Ok(updated)
    }
}
