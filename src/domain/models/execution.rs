//! Execution domain model.
//!
//! An execution is one pass of the six-phase pipeline for a single
//! trigger. Phase outputs land in one optional slot each; absence means
//! the phase did not run or kept no output. Foreign fields inside slots
//! survive read-modify-write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::delivery::{DeliveryResult, DeliveryTarget};
use super::learning::LearningEntry;
use super::task::{TaskResult, TaskSpec};
use super::trigger::{ClockContext, TriggerInput, TriggerType};

/// One of the six pipeline phases. Wire-stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Inspiration,
    Goals,
    Tasks,
    Run,
    Delivery,
    Learning,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inspiration => "inspiration",
            Self::Goals => "goals",
            Self::Tasks => "tasks",
            Self::Run => "run",
            Self::Delivery => "delivery",
            Self::Learning => "learning",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "inspiration" => Some(Self::Inspiration),
            "goals" => Some(Self::Goals),
            "tasks" => Some(Self::Tasks),
            "run" => Some(Self::Run),
            "delivery" => Some(Self::Delivery),
            "learning" => Some(Self::Learning),
            _ => None,
        }
    }

    /// The phase order for a trigger type. Clock executions start at
    /// inspiration; human and event executions skip it.
    pub fn sequence_for(trigger: TriggerType) -> &'static [Phase] {
        const FULL: &[Phase] = &[
            Phase::Inspiration,
            Phase::Goals,
            Phase::Tasks,
            Phase::Run,
            Phase::Delivery,
            Phase::Learning,
        ];
        match trigger {
            TriggerType::Clock => FULL,
            TriggerType::Human | TriggerType::Event => &FULL[1..],
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Accepted, waiting for a worker
    Pending,
    /// Owned by a worker, phases in progress
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Output of the inspiration phase (clock executions only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspirationOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<ClockContext>,
    /// Markdown report
    pub content: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Output of the goals phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalsOutput {
    /// Markdown goals
    pub content: String,
    /// Where the goals phase suggested delivering the result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_target: Option<DeliveryTarget>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Output of the tasks phase: the ordered plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasksOutput {
    pub tasks: Vec<TaskSpec>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Output of the run phase: one result per task, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub results: Vec<TaskResult>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Output of the learning phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningOutput {
    pub entries: Vec<LearningEntry>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A produced phase artifact, written to the store at each boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseArtifact {
    Inspiration(InspirationOutput),
    Goals(GoalsOutput),
    Tasks(TasksOutput),
    Run(RunOutput),
    Delivery(DeliveryResult),
    Learning(LearningOutput),
}

impl PhaseArtifact {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Inspiration(_) => Phase::Inspiration,
            Self::Goals(_) => Phase::Goals,
            Self::Tasks(_) => Phase::Tasks,
            Self::Run(_) => Phase::Run,
            Self::Delivery(_) => Phase::Delivery,
            Self::Learning(_) => Phase::Learning,
        }
    }
}

/// A single pass through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: String,
    pub member_id: String,
    pub team_id: String,
    pub trigger_type: TriggerType,
    pub status: ExecutionStatus,
    /// The phase currently (or last) in progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    /// The validated trigger input that started this execution
    pub input: TriggerInput,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// First error message for failed or cancelled runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    // One slot per phase; absence means the phase did not run or kept
    // no output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspiration: Option<InspirationOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<GoalsOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TasksOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<RunOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning: Option<LearningOutput>,
}

impl Execution {
    /// Create a pending execution for a validated trigger.
    pub fn new(
        execution_id: impl Into<String>,
        member_id: impl Into<String>,
        team_id: impl Into<String>,
        input: TriggerInput,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            member_id: member_id.into(),
            team_id: team_id.into(),
            trigger_type: input.trigger_type(),
            status: ExecutionStatus::Pending,
            phase: None,
            input,
            start_time: Utc::now(),
            end_time: None,
            error: None,
            inspiration: None,
            goals: None,
            tasks: None,
            run: None,
            delivery: None,
            learning: None,
        }
    }

    /// Store a produced artifact in its slot and advance the phase marker.
    pub fn record_artifact(&mut self, artifact: PhaseArtifact) {
        self.phase = Some(artifact.phase());
        match artifact {
            PhaseArtifact::Inspiration(out) => self.inspiration = Some(out),
            PhaseArtifact::Goals(out) => self.goals = Some(out),
            PhaseArtifact::Tasks(out) => self.tasks = Some(out),
            PhaseArtifact::Run(out) => self.run = Some(out),
            PhaseArtifact::Delivery(out) => self.delivery = Some(out),
            PhaseArtifact::Learning(out) => self.learning = Some(out),
        }
    }

    /// The phases that have recorded output, in pipeline order.
    pub fn recorded_phases(&self) -> Vec<Phase> {
        let mut phases = Vec::new();
        if self.inspiration.is_some() {
            phases.push(Phase::Inspiration);
        }
        if self.goals.is_some() {
            phases.push(Phase::Goals);
        }
        if self.tasks.is_some() {
            phases.push(Phase::Tasks);
        }
        if self.run.is_some() {
            phases.push(Phase::Run);
        }
        if self.delivery.is_some() {
            phases.push(Phase::Delivery);
        }
        if self.learning.is_some() {
            phases.push(Phase::Learning);
        }
        phases
    }

    pub fn mark_running(&mut self) {
        self.status = ExecutionStatus::Running;
    }

    pub fn mark_completed(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.end_time = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self.end_time = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self, reason: impl Into<String>) {
        self.status = ExecutionStatus::Cancelled;
        self.error = Some(reason.into());
        self.end_time = Some(Utc::now());
    }
}

/// Filters for listing executions. Default order is start time descending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionFilters {
    pub member_id: Option<String>,
    pub team_id: Option<String>,
    pub status: Option<ExecutionStatus>,
    pub trigger_type: Option<TriggerType>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ExecutionFilters {
    pub fn for_member(member_id: impl Into<String>) -> Self {
        Self {
            member_id: Some(member_id.into()),
            ..Self::default()
        }
    }

    /// Whether an execution matches every set filter.
    pub fn matches(&self, execution: &Execution) -> bool {
        if let Some(member) = &self.member_id {
            if &execution.member_id != member {
                return false;
            }
        }
        if let Some(team) = &self.team_id {
            if &execution.team_id != team {
                return false;
            }
        }
        if let Some(status) = self.status {
            if execution.status != status {
                return false;
            }
        }
        if let Some(trigger) = self.trigger_type {
            if execution.trigger_type != trigger {
                return false;
            }
        }
        true
    }
}
