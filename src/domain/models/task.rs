//! Task domain model.
//!
//! Tasks are the units produced by the planning phase and executed in
//! order by the task runner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::{ValidationResult, ValidationRule};

/// What executes a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorType {
    /// A conversational agent; runs the multi-turn loop
    Assistant,
    /// A single MCP tool call, executor id `server.tool`
    Mcp,
    /// A single registered process call
    Process,
}

impl ExecutorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assistant => "assistant",
            Self::Mcp => "mcp",
            Self::Process => "process",
        }
    }
}

/// Status of a task within its execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// A unit of work planned in the tasks phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Stable id; generated when the planning agent omits one
    #[serde(default = "default_task_id")]
    pub task_id: String,
    /// Which goal this task serves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_ref: Option<String>,
    pub executor_type: ExecutorType,
    /// Agent id, `server.tool` for MCP, or a registered process name
    pub executor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
    /// What the output should look like; input to the semantic validator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    /// Ordered validation rules; strings are lowered to agent assertions
    #[serde(default)]
    pub validation_rules: Vec<ValidationRule>,
    /// Position within the execution; strictly increasing
    pub order: u32,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Free-form instruction for assistant tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_task_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl TaskSpec {
    /// Create an assistant task with the given order and instruction.
    pub fn assistant(order: u32, executor_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            goal_ref: None,
            executor_type: ExecutorType::Assistant,
            executor_id: executor_id.into(),
            args: None,
            expected_output: None,
            validation_rules: Vec::new(),
            order,
            status: TaskStatus::Pending,
            start_time: None,
            end_time: None,
            description: Some(description.into()),
        }
    }

    /// Split an MCP executor id into `(server, tool)`.
    ///
    /// The id is composed as `server.tool`; the first dot separates the
    /// two, so tool names may themselves contain dots.
    pub fn mcp_target(&self) -> Option<(&str, &str)> {
        self.executor_id.split_once('.')
    }
}

/// Outcome of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    pub validation: ValidationResult,
}
