//! Task runner - executes the planned tasks of one execution (P3).
//!
//! Tasks run strictly in `order`. Previous task outputs are concatenated
//! into a compact previous-results block for context; they are never
//! re-executed and never edited. Assistant tasks run a multi-turn
//! conversation driven by the validator: the loop continues only while
//! the validator asks for a reply, capped at `run.max_turns_per_task`,
//! and the conversation context is released exactly once on exit.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::domain::error::ExecutionError;
use crate::domain::models::{
    ExecutorType, Robot, RunOutput, TaskResult, TaskSpec, ValidationResult,
};
use crate::domain::ports::{
    AgentMessage, AgentRuntime, CallOptions, McpExecutor, ProcessExecutor,
};

use super::controller::ExecutionController;
use super::validator::Validator;

/// Outcome of an assistant conversation.
struct TurnsOutcome {
    output: String,
    validation: ValidationResult,
    error: Option<String>,
    turns: u32,
}

/// Drives P3 for one execution.
pub struct TaskRunner {
    agents: Arc<dyn AgentRuntime>,
    mcp: Arc<dyn McpExecutor>,
    processes: Arc<dyn ProcessExecutor>,
    validator: Arc<Validator>,
}

impl TaskRunner {
    pub fn new(
        agents: Arc<dyn AgentRuntime>,
        mcp: Arc<dyn McpExecutor>,
        processes: Arc<dyn ProcessExecutor>,
        validator: Arc<Validator>,
    ) -> Self {
        Self {
            agents,
            mcp,
            processes,
            validator,
        }
    }

    /// Run all tasks in order. Returns the per-task results; execution
    /// failure policy (`continue_on_failure`) decides how far we get.
    /// Only cancellation aborts with an error.
    pub async fn run_tasks(
        &self,
        robot: &Robot,
        specs: &[TaskSpec],
        controller: &ExecutionController,
        execution_id: &str,
    ) -> Result<RunOutput, ExecutionError> {
        let mut ordered: Vec<&TaskSpec> = specs.iter().collect();
        ordered.sort_by_key(|t| t.order);

        let mut results: Vec<TaskResult> = Vec::with_capacity(ordered.len());

        for task in ordered {
            controller.check_cancelled(execution_id).await?;
            controller.wait_if_paused(execution_id).await?;

            let previous = previous_results_block(&results);
            let started = Instant::now();

            let result = match task.executor_type {
                ExecutorType::Assistant => {
                    let outcome = self
                        .run_assistant(robot, task, &previous, controller, execution_id)
                        .await?;
                    debug!(task_id = %task.task_id, turns = outcome.turns, "Assistant task finished");
                    TaskResult {
                        task_id: task.task_id.clone(),
                        success: outcome.error.is_none() && outcome.validation.passed,
                        output: outcome.output,
                        error: outcome.error,
                        duration_ms: elapsed_ms(started),
                        validation: outcome.validation,
                    }
                }
                ExecutorType::Mcp => self.run_mcp(robot, task, started).await,
                ExecutorType::Process => self.run_process(robot, task, started).await,
            };

            let failed = !result.success;
            results.push(result);

            if failed && !robot.config.run.continue_on_failure {
                warn!(
                    task_id = %task.task_id,
                    execution_id,
                    "Task failed, aborting remaining tasks"
                );
                break;
            }
        }

        Ok(RunOutput {
            results,
            extra: std::collections::BTreeMap::new(),
        })
    }

    /// The multi-turn assistant loop. One conversation per task; the
    /// context is torn down exactly once no matter how the loop exits.
    async fn run_assistant(
        &self,
        robot: &Robot,
        task: &TaskSpec,
        previous: &str,
        controller: &ExecutionController,
        execution_id: &str,
    ) -> Result<TurnsOutcome, ExecutionError> {
        let mut messages = Vec::new();
        if let Some(prompt) = &robot.system_prompt {
            messages.push(AgentMessage::system(prompt.clone()));
        }
        let mut first = String::new();
        if !previous.is_empty() {
            first.push_str(previous);
            first.push_str("\n\n");
        }
        first.push_str(task.description.as_deref().unwrap_or(task.executor_id.as_str()));
        messages.push(AgentMessage::user(first));

        let mut context_id: Option<String> = None;
        let outcome = self
            .assistant_turns(robot, task, &mut messages, &mut context_id, controller, execution_id)
            .await;

        // Release the conversation exactly once, on every exit path
        if let Some(ctx) = context_id {
            if let Err(e) = self.agents.release(&ctx).await {
                warn!(context_id = %ctx, error = %e, "Failed to release agent context");
            }
        }
        outcome
    }

    async fn assistant_turns(
        &self,
        robot: &Robot,
        task: &TaskSpec,
        messages: &mut Vec<AgentMessage>,
        context_id: &mut Option<String>,
        controller: &ExecutionController,
        execution_id: &str,
    ) -> Result<TurnsOutcome, ExecutionError> {
        let max_turns = robot.config.run.max_turns_per_task;
        let mut last_output = String::new();
        let mut last_validation = ValidationResult::failing("no turns executed");

        for turn in 1..=max_turns {
            controller.check_cancelled(execution_id).await?;
            controller.wait_if_paused(execution_id).await?;

            let options = CallOptions {
                context_id: context_id.clone(),
                timeout_secs: None,
            };
            let response = match self.agents.call(&task.executor_id, messages, &options).await {
                Ok(response) => response,
                Err(e) => {
                    return Ok(TurnsOutcome {
                        output: last_output,
                        validation: ValidationResult::failing(format!("agent call failed: {e}")),
                        error: Some(format!("task {}: {e}", task.task_id)),
                        turns: turn,
                    });
                }
            };
            if context_id.is_none() {
                context_id.clone_from(&response.context_id);
            }

            let validation = self
                .validator
                .validate(task, &response.content, &robot.config.run)
                .await;
            last_output = response.content;
            last_validation = validation.clone();

            if validation.complete && validation.passed {
                return Ok(TurnsOutcome {
                    output: last_output,
                    validation: last_validation,
                    error: None,
                    turns: turn,
                });
            }

            match (&validation.need_reply, &validation.reply_content) {
                (true, Some(reply)) if turn < max_turns => {
                    debug!(task_id = %task.task_id, turn, "Validator asked for another turn");
                    messages.push(AgentMessage::assistant(last_output.clone()));
                    messages.push(AgentMessage::user(reply.clone()));
                }
                _ => {
                    return Ok(TurnsOutcome {
                        output: last_output,
                        validation: last_validation,
                        error: None,
                        turns: turn,
                    });
                }
            }
        }

        info!(task_id = %task.task_id, max_turns, "Turn cap reached");
        Ok(TurnsOutcome {
            output: last_output,
            validation: last_validation,
            error: None,
            turns: max_turns,
        })
    }

    async fn run_mcp(&self, robot: &Robot, task: &TaskSpec, started: Instant) -> TaskResult {
        let Some((server, tool)) = task.mcp_target() else {
            return TaskResult {
                task_id: task.task_id.clone(),
                success: false,
                output: String::new(),
                error: Some(format!("invalid MCP executor id '{}'", task.executor_id)),
                duration_ms: elapsed_ms(started),
                validation: ValidationResult::failing("invalid MCP executor id"),
            };
        };

        let args = task.args.clone().unwrap_or(serde_json::Value::Null);
        match self.mcp.invoke(server, tool, args).await {
            Ok(value) => {
                let output = value.to_string();
                let validation = self.validator.validate(task, &output, &robot.config.run).await;
                TaskResult {
                    task_id: task.task_id.clone(),
                    success: validation.passed,
                    output,
                    error: None,
                    duration_ms: elapsed_ms(started),
                    validation,
                }
            }
            Err(e) => TaskResult {
                task_id: task.task_id.clone(),
                success: false,
                output: String::new(),
                error: Some(format!("task {}: {e}", task.task_id)),
                duration_ms: elapsed_ms(started),
                validation: ValidationResult::failing(e.to_string()),
            },
        }
    }

    async fn run_process(&self, robot: &Robot, task: &TaskSpec, started: Instant) -> TaskResult {
        let args: Vec<serde_json::Value> = match &task.args {
            Some(serde_json::Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        };

        match self.processes.call(&task.executor_id, &args).await {
            Ok(value) => {
                let output = value.to_string();
                let validation = self.validator.validate(task, &output, &robot.config.run).await;
                TaskResult {
                    task_id: task.task_id.clone(),
                    success: validation.passed,
                    output,
                    error: None,
                    duration_ms: elapsed_ms(started),
                    validation,
                }
            }
            Err(e) => TaskResult {
                task_id: task.task_id.clone(),
                success: false,
                output: String::new(),
                error: Some(format!("task {}: {e}", task.task_id)),
                duration_ms: elapsed_ms(started),
                validation: ValidationResult::failing(e.to_string()),
            },
        }
    }
}

/// Compact context block from earlier task outputs.
fn previous_results_block(results: &[TaskResult]) -> String {
    if results.is_empty() {
        return String::new();
    }
    let mut block = String::from("Previous task results:");
    for result in results {
        block.push_str(&format!(
            "\n- [{}] {}: {}",
            if result.success { "ok" } else { "failed" },
            result.task_id,
            result.output
        ));
    }
    block
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
