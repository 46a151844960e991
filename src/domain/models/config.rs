//! Per-robot configuration.
//!
//! Arrives as the `robot_config` JSON blob on the member record and is
//! validated before the robot enters the cache. Unknown fields are kept
//! verbatim so a read-modify-write round-trips foreign data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::error::ConfigError;

use super::delivery::ChannelPreference;
use super::execution::Phase;

/// Validated configuration of one robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct RobotConfig {
    pub identity: Identity,

    /// Clock schedule; absent means the robot is never clock-triggered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<ClockConfig>,

    #[serde(default)]
    pub quota: QuotaConfig,

    /// Absent block means all trigger types enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggers: Option<TriggerSwitches>,

    #[serde(default)]
    pub resources: ResourceConfig,

    /// Delivery channel preferences, iterated by the delivery center.
    #[serde(default)]
    pub delivery: Vec<ChannelPreference>,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub learn: LearnConfig,

    /// Foreign fields preserved for round-trip.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Who the robot is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct Identity {
    /// Mandatory role description
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
}

/// Clock schedule plus the execution deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {
    #[serde(flatten)]
    pub mode: ClockMode,

    /// Deadline for each execution started by any trigger of this robot.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    1800
}

/// The three accepted clock shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ClockMode {
    /// Fire at fixed local times of day.
    Times {
        /// Minute-granular "HH:MM" entries
        times: Vec<String>,
        /// Weekday names, or `["*"]` for every day
        #[serde(default = "default_days")]
        days: Vec<String>,
        /// IANA timezone; UTC when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timezone: Option<String>,
    },
    /// Fire when at least `every_secs` elapsed since the last run.
    Interval { every_secs: u64 },
    /// Restart immediately after the previous execution completes.
    Daemon,
}

fn default_days() -> Vec<String> {
    vec!["*".to_string()]
}

/// Per-robot limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QuotaConfig {
    /// Maximum concurrently-running executions
    #[serde(default = "default_quota_max")]
    pub max: usize,
    /// Maximum queued executions
    #[serde(default = "default_quota_queue")]
    pub queue: usize,
    /// Scheduling priority, 1..=10
    #[serde(default = "default_quota_priority")]
    pub priority: u8,
}

const fn default_quota_max() -> usize {
    2
}

const fn default_quota_queue() -> usize {
    10
}

const fn default_quota_priority() -> u8 {
    5
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max: default_quota_max(),
            queue: default_quota_queue(),
            priority: default_quota_priority(),
        }
    }
}

/// Independent enable switches per trigger type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TriggerSwitches {
    #[serde(default = "default_true")]
    pub clock: bool,
    #[serde(default = "default_true")]
    pub intervene: bool,
    #[serde(default = "default_true")]
    pub event: bool,
    /// Allow-list for intervention actions; absent means all allowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<super::trigger::InterventionAction>>,
}

const fn default_true() -> bool {
    true
}

impl Default for TriggerSwitches {
    fn default() -> Self {
        Self {
            clock: true,
            intervene: true,
            event: true,
            actions: None,
        }
    }
}

/// Phase-agent overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct ResourceConfig {
    #[serde(default)]
    pub phases: PhaseAgents,
}

/// Agent identifier per phase; unset entries fall back to `__yao.{phase}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct PhaseAgents {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspiration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning: Option<String>,
}

impl PhaseAgents {
    /// Resolve the agent id for a phase.
    pub fn agent_for(&self, phase: Phase) -> String {
        let overridden = match phase {
            Phase::Inspiration => &self.inspiration,
            Phase::Goals => &self.goals,
            Phase::Tasks => &self.tasks,
            Phase::Run => &self.run,
            Phase::Delivery => &self.delivery,
            Phase::Learning => &self.learning,
        };
        overridden
            .clone()
            .unwrap_or_else(|| format!("__yao.{}", phase.as_str()))
    }
}

/// Task-runner knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunConfig {
    /// Keep running remaining tasks after one fails
    #[serde(default)]
    pub continue_on_failure: bool,
    /// Hard cap on assistant conversation turns per task
    #[serde(default = "default_max_turns")]
    pub max_turns_per_task: u32,
    /// Minimum semantic score for `passed` when no rule decided
    #[serde(default = "default_validation_threshold")]
    pub validation_threshold: f64,
}

const fn default_max_turns() -> u32 {
    10
}

const fn default_validation_threshold() -> f64 {
    0.6
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            continue_on_failure: false,
            max_turns_per_task: default_max_turns(),
            validation_threshold: default_validation_threshold(),
        }
    }
}

/// Learning retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct LearnConfig {
    /// Days to keep learning entries; 0 retains forever
    #[serde(default)]
    pub keep_days: u32,
}

impl RobotConfig {
    /// Parse and validate a `robot_config` JSON blob.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration. Invalid robots are omitted from the
    /// cache at load time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.role.trim().is_empty() {
            return Err(ConfigError::MissingRole);
        }

        if let Some(clock) = &self.clock {
            match &clock.mode {
                ClockMode::Times { times, timezone, .. } => {
                    if times.is_empty() {
                        return Err(ConfigError::EmptyClockTimes);
                    }
                    for entry in times {
                        if chrono::NaiveTime::parse_from_str(entry, "%H:%M").is_err() {
                            return Err(ConfigError::InvalidClockTime(entry.clone()));
                        }
                    }
                    if let Some(tz) = timezone {
                        if tz.parse::<chrono_tz::Tz>().is_err() {
                            return Err(ConfigError::UnknownTimezone(tz.clone()));
                        }
                    }
                }
                ClockMode::Interval { every_secs } => {
                    if *every_secs == 0 {
                        return Err(ConfigError::NonPositiveInterval);
                    }
                }
                ClockMode::Daemon => {}
            }
        }

        if self.quota.max == 0 {
            return Err(ConfigError::InvalidQuota { field: "max" });
        }
        if self.quota.queue == 0 {
            return Err(ConfigError::InvalidQuota { field: "queue" });
        }
        if !(1..=10).contains(&self.quota.priority) {
            return Err(ConfigError::InvalidPriority(self.quota.priority));
        }

        Ok(())
    }

    /// Execution deadline in seconds (default 30 minutes).
    pub fn timeout_secs(&self) -> u64 {
        self.clock
            .as_ref()
            .map_or_else(default_timeout_secs, |c| c.timeout_secs)
    }

    /// Whether the given trigger type is enabled for this robot.
    pub fn trigger_enabled(&self, trigger: super::trigger::TriggerType) -> bool {
        use super::trigger::TriggerType;
        self.triggers.as_ref().map_or(true, |t| match trigger {
            TriggerType::Clock => t.clock,
            TriggerType::Human => t.intervene,
            TriggerType::Event => t.event,
        })
    }

    /// Whether the given intervention action is within the allow-list.
    pub fn action_allowed(&self, action: super::trigger::InterventionAction) -> bool {
        self.triggers
            .as_ref()
            .and_then(|t| t.actions.as_ref())
            .map_or(true, |allowed| allowed.contains(&action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::trigger::{InterventionAction, TriggerType};
    use serde_json::json;

    fn minimal() -> serde_json::Value {
        json!({"identity": {"role": "analyst"}})
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = RobotConfig::from_value(minimal()).unwrap();
        assert_eq!(config.quota.max, 2);
        assert_eq!(config.quota.queue, 10);
        assert_eq!(config.quota.priority, 5);
        assert_eq!(config.run.max_turns_per_task, 10);
        assert!((config.run.validation_threshold - 0.6).abs() < f64::EPSILON);
        assert!(!config.run.continue_on_failure);
        assert_eq!(config.timeout_secs(), 1800);
        assert_eq!(config.learn.keep_days, 0);
    }

    #[test]
    fn test_missing_role_rejected() {
        let err = RobotConfig::from_value(json!({"identity": {"role": "  "}})).unwrap_err();
        assert_eq!(err, crate::domain::error::ConfigError::MissingRole);
    }

    #[test]
    fn test_clock_times_shape() {
        let config = RobotConfig::from_value(json!({
            "identity": {"role": "analyst"},
            "clock": {"mode": "times", "times": ["09:00", "18:30"], "timezone": "Asia/Shanghai"}
        }))
        .unwrap();
        match &config.clock.as_ref().unwrap().mode {
            ClockMode::Times { times, days, timezone } => {
                assert_eq!(times.len(), 2);
                assert_eq!(days, &vec!["*".to_string()]);
                assert_eq!(timezone.as_deref(), Some("Asia/Shanghai"));
            }
            other => panic!("unexpected clock mode: {other:?}"),
        }
    }

    #[test]
    fn test_clock_validation_errors() {
        let empty = RobotConfig::from_value(json!({
            "identity": {"role": "r"},
            "clock": {"mode": "times", "times": []}
        }));
        assert!(matches!(empty, Err(crate::domain::error::ConfigError::EmptyClockTimes)));

        let bad_time = RobotConfig::from_value(json!({
            "identity": {"role": "r"},
            "clock": {"mode": "times", "times": ["9am"]}
        }));
        assert!(matches!(
            bad_time,
            Err(crate::domain::error::ConfigError::InvalidClockTime(_))
        ));

        let bad_tz = RobotConfig::from_value(json!({
            "identity": {"role": "r"},
            "clock": {"mode": "times", "times": ["09:00"], "timezone": "Mars/Olympus"}
        }));
        assert!(matches!(
            bad_tz,
            Err(crate::domain::error::ConfigError::UnknownTimezone(_))
        ));

        let zero_interval = RobotConfig::from_value(json!({
            "identity": {"role": "r"},
            "clock": {"mode": "interval", "every_secs": 0}
        }));
        assert!(matches!(
            zero_interval,
            Err(crate::domain::error::ConfigError::NonPositiveInterval)
        ));
    }

    #[test]
    fn test_quota_validation() {
        let bad = RobotConfig::from_value(json!({
            "identity": {"role": "r"},
            "quota": {"priority": 11}
        }));
        assert!(matches!(
            bad,
            Err(crate::domain::error::ConfigError::InvalidPriority(11))
        ));
    }

    #[test]
    fn test_trigger_switches() {
        let config = RobotConfig::from_value(json!({
            "identity": {"role": "r"},
            "triggers": {"clock": false, "actions": ["task.add", "instruct"]}
        }))
        .unwrap();
        assert!(!config.trigger_enabled(TriggerType::Clock));
        assert!(config.trigger_enabled(TriggerType::Human));
        assert!(config.action_allowed(InterventionAction::TaskAdd));
        assert!(!config.action_allowed(InterventionAction::GoalCancel));

        // Absent block: everything allowed
        let open = RobotConfig::from_value(minimal()).unwrap();
        assert!(open.trigger_enabled(TriggerType::Event));
        assert!(open.action_allowed(InterventionAction::PlanRemove));
    }

    #[test]
    fn test_phase_agent_defaults_and_overrides() {
        let config = RobotConfig::from_value(json!({
            "identity": {"role": "r"},
            "resources": {"phases": {"goals": "custom.goals-agent"}}
        }))
        .unwrap();
        assert_eq!(config.resources.phases.agent_for(Phase::Goals), "custom.goals-agent");
        assert_eq!(config.resources.phases.agent_for(Phase::Tasks), "__yao.tasks");
        assert_eq!(
            config.resources.phases.agent_for(Phase::Inspiration),
            "__yao.inspiration"
        );
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let blob = json!({
            "identity": {"role": "r"},
            "custom_section": {"keep": ["me"]},
            "another": 42
        });
        let config = RobotConfig::from_value(blob).unwrap();
        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["custom_section"], json!({"keep": ["me"]}));
        assert_eq!(back["another"], json!(42));
    }
}
