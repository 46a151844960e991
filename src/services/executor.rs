//! Phase executor - the six-phase state machine.
//!
//! ```text
//! clock:         P0 -> P1 -> P2 -> P3 -> P4 -> P5 -> done
//! human/event:         P1 -> P2 -> P3 -> P4 -> P5 -> done
//! ```
//!
//! Transitions are unconditional on success; any phase error terminates
//! the execution as failed, cancellation as cancelled. Between phases
//! the executor checks the controller, and every phase boundary is
//! persisted to the execution store. The whole run is bounded by the
//! robot's execution deadline; on expiry the controller raises cancel.
//!
//! Two runners implement the phases: Standard delegates to the
//! configured agents, DryRun returns plausible fixtures without
//! external calls. Sandbox is reserved and currently served by DryRun.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::error::{AgentError, ExecutionError};
use crate::domain::models::{
    DeliveryContent, DeliveryContext, DeliveryRequest, DeliveryResult, Execution, ExecutorMode,
    GoalsOutput, InspirationOutput, LearningEntry, LearningKind, LearningOutput, Phase,
    PhaseArtifact, Robot, RunOutput, TaskResult, TaskSpec, TasksOutput, TriggerInput,
    ValidationResult,
};
use crate::domain::ports::{AgentMessage, AgentRuntime, CallOptions, ExecutionStore};

use super::controller::ExecutionController;
use super::delivery::DeliveryCenter;
use super::learning::LearningService;
use super::scheduler::ExecutionDriver;
use super::task_runner::TaskRunner;
use super::validator::extract_json;

/// Produces the artifact of each phase. The executor owns ordering,
/// control checks, and persistence; runners own the phase semantics.
#[async_trait]
pub trait PhaseRunner: Send + Sync {
    async fn inspiration(
        &self,
        robot: &Robot,
        execution: &Execution,
    ) -> Result<InspirationOutput, ExecutionError>;

    async fn goals(&self, robot: &Robot, execution: &Execution)
        -> Result<GoalsOutput, ExecutionError>;

    async fn tasks(&self, robot: &Robot, execution: &Execution)
        -> Result<TasksOutput, ExecutionError>;

    async fn run(
        &self,
        robot: &Robot,
        execution: &Execution,
        controller: &ExecutionController,
    ) -> Result<RunOutput, ExecutionError>;

    async fn delivery(
        &self,
        robot: &Robot,
        execution: &Execution,
    ) -> Result<DeliveryResult, ExecutionError>;

    async fn learning(
        &self,
        robot: &Robot,
        execution: &Execution,
    ) -> Result<LearningOutput, ExecutionError>;
}

/// Drives executions through the phase sequence.
pub struct PhaseExecutor {
    store: Arc<dyn ExecutionStore>,
    controller: Arc<ExecutionController>,
    standard: Arc<dyn PhaseRunner>,
    dryrun: Arc<dyn PhaseRunner>,
}

impl PhaseExecutor {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        controller: Arc<ExecutionController>,
        standard: Arc<dyn PhaseRunner>,
    ) -> Self {
        Self {
            store,
            controller,
            standard,
            dryrun: Arc::new(DryRunRunner),
        }
    }

    fn runner_for(&self, mode: ExecutorMode) -> &Arc<dyn PhaseRunner> {
        match mode {
            ExecutorMode::Standard => &self.standard,
            ExecutorMode::DryRun => &self.dryrun,
            ExecutorMode::Sandbox => {
                // Sandbox isolation is a placeholder; serve fixtures
                debug!("Sandbox mode requested, falling back to dry run");
                &self.dryrun
            }
        }
    }

    async fn phase_loop(
        &self,
        robot: &Robot,
        execution: &mut Execution,
        runner: &Arc<dyn PhaseRunner>,
    ) -> Result<(), ExecutionError> {
        let execution_id = execution.execution_id.clone();

        for &phase in Phase::sequence_for(execution.trigger_type) {
            self.controller.check_cancelled(&execution_id).await?;
            self.controller.wait_if_paused(&execution_id).await?;

            self.controller.set_phase(&execution_id, phase).await;
            self.store.update_current(&execution_id, phase).await?;
            debug!(execution_id = %execution_id, phase = %phase, "Entering phase");

            let artifact = match phase {
                Phase::Inspiration => {
                    PhaseArtifact::Inspiration(runner.inspiration(robot, execution).await?)
                }
                Phase::Goals => PhaseArtifact::Goals(runner.goals(robot, execution).await?),
                Phase::Tasks => PhaseArtifact::Tasks(runner.tasks(robot, execution).await?),
                Phase::Run => {
                    PhaseArtifact::Run(runner.run(robot, execution, &self.controller).await?)
                }
                Phase::Delivery => {
                    PhaseArtifact::Delivery(runner.delivery(robot, execution).await?)
                }
                Phase::Learning => {
                    PhaseArtifact::Learning(runner.learning(robot, execution).await?)
                }
            };

            execution.record_artifact(artifact.clone());
            self.store.update_phase(&execution_id, &artifact).await?;

            // A failed task fails the execution unless the robot opted
            // into continuing; the partial run output stays recorded.
            if let PhaseArtifact::Run(output) = &artifact {
                if !robot.config.run.continue_on_failure {
                    if let Some(failed) = output.results.iter().find(|r| !r.success) {
                        return Err(ExecutionError::phase(
                            Phase::Run,
                            format!("task {} failed", failed.task_id),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionDriver for PhaseExecutor {
    async fn run(
        &self,
        robot: Arc<Robot>,
        mut execution: Execution,
        mode: ExecutorMode,
    ) -> Result<(), ExecutionError> {
        let execution_id = execution.execution_id.clone();
        self.controller.track(&execution_id).await;

        execution.mark_running();
        self.store.save(&execution).await?;

        let runner = Arc::clone(self.runner_for(mode));
        let timeout_secs = robot.config.timeout_secs();
        let deadline = Duration::from_secs(timeout_secs);

        let outcome = tokio::select! {
            result = self.phase_loop(&robot, &mut execution, &runner) => result,
            () = tokio::time::sleep(deadline) => {
                let _ = self.controller.stop(&execution_id).await;
                Err(ExecutionError::Timeout(timeout_secs))
            }
        };

        match outcome {
            Ok(()) => {
                execution.mark_completed();
                info!(execution_id = %execution_id, "Execution completed");
            }
            Err(e) if e.is_cancellation() => {
                execution.mark_cancelled(e.to_string());
                info!(execution_id = %execution_id, reason = %e, "Execution cancelled");
            }
            Err(e) => {
                execution.mark_failed(e.to_string());
                warn!(execution_id = %execution_id, error = %e, "Execution failed");
            }
        }

        let result = self.store.save(&execution).await.map_err(ExecutionError::from);
        self.controller.untrack(&execution_id).await;
        result
    }
}

// ============================================================================
// Standard runner - delegates each phase to the configured agent
// ============================================================================

/// The production runner: every phase goes to its configured agent, P3
/// to the task runner, P4 to the delivery center, P5 to the knowledge
/// base.
pub struct StandardRunner {
    agents: Arc<dyn AgentRuntime>,
    task_runner: TaskRunner,
    delivery_center: Arc<DeliveryCenter>,
    learning: LearningService,
    /// Names shown to the planning agent as the available executors
    catalog: Vec<String>,
}

impl StandardRunner {
    pub fn new(
        agents: Arc<dyn AgentRuntime>,
        task_runner: TaskRunner,
        delivery_center: Arc<DeliveryCenter>,
        learning: LearningService,
        catalog: Vec<String>,
    ) -> Self {
        Self {
            agents,
            task_runner,
            delivery_center,
            learning,
            catalog,
        }
    }

    async fn call_phase_agent(
        &self,
        robot: &Robot,
        phase: Phase,
        prompt: String,
    ) -> Result<String, ExecutionError> {
        let agent_id = robot.config.resources.phases.agent_for(phase);
        let messages = [AgentMessage::user(prompt)];
        let response = self
            .agents
            .call(&agent_id, &messages, &CallOptions::default())
            .await
            .map_err(|e| agent_failure(phase, e))?;
        Ok(response.content)
    }
}

fn agent_failure(phase: Phase, source: AgentError) -> ExecutionError {
    ExecutionError::Agent {
        site: format!("phase {phase}"),
        source,
    }
}

/// Make the plan's ordering strictly increasing: sort, then reindex
/// sequentially when the agent produced duplicates.
fn normalize_orders(mut tasks: Vec<TaskSpec>) -> Vec<TaskSpec> {
    tasks.sort_by_key(|t| t.order);
    let strictly_increasing = tasks.windows(2).all(|w| w[0].order < w[1].order);
    if !strictly_increasing {
        for (index, task) in tasks.iter_mut().enumerate() {
            task.order = u32::try_from(index).unwrap_or(u32::MAX).saturating_add(1);
        }
    }
    tasks
}

#[async_trait]
impl PhaseRunner for StandardRunner {
    async fn inspiration(
        &self,
        robot: &Robot,
        execution: &Execution,
    ) -> Result<InspirationOutput, ExecutionError> {
        let TriggerInput::Clock(context) = &execution.input else {
            return Err(ExecutionError::phase(
                Phase::Inspiration,
                "inspiration requires a clock trigger",
            ));
        };
        let prompt = format!(
            "Role: {}\nClock context:\n{}\n\nWrite a short inspiration report in markdown.",
            robot.config.identity.role,
            serde_json::to_string_pretty(context).unwrap_or_default(),
        );
        let content = self.call_phase_agent(robot, Phase::Inspiration, prompt).await?;
        Ok(InspirationOutput {
            clock: Some(context.clone()),
            content,
            extra: BTreeMap::new(),
        })
    }

    async fn goals(
        &self,
        robot: &Robot,
        execution: &Execution,
    ) -> Result<GoalsOutput, ExecutionError> {
        let input = match (&execution.input, &execution.inspiration) {
            (TriggerInput::Clock(_), Some(report)) => report.content.clone(),
            (input, _) => serde_json::to_string_pretty(input).unwrap_or_default(),
        };
        let prompt = format!(
            "Role: {}\nInput:\n{input}\n\nDerive the goals for this run, in markdown.",
            robot.config.identity.role,
        );
        let content = self.call_phase_agent(robot, Phase::Goals, prompt).await?;
        Ok(GoalsOutput {
            content,
            delivery_target: None,
            extra: BTreeMap::new(),
        })
    }

    async fn tasks(
        &self,
        robot: &Robot,
        execution: &Execution,
    ) -> Result<TasksOutput, ExecutionError> {
        let goals = execution
            .goals
            .as_ref()
            .map(|g| g.content.clone())
            .unwrap_or_default();
        let prompt = format!(
            "Goals:\n{goals}\n\nAvailable executors: {}\n\nPlan the tasks as a JSON list; each \
             task has order, executor_type (assistant|mcp|process), executor_id, and optional \
             args, expected_output, validation_rules.",
            self.catalog.join(", "),
        );
        let content = self.call_phase_agent(robot, Phase::Tasks, prompt).await?;

        let value = extract_json(&content).ok_or_else(|| {
            ExecutionError::phase(Phase::Tasks, "planning agent returned no JSON task list")
        })?;
        let raw = match value {
            serde_json::Value::Array(_) => value,
            serde_json::Value::Object(ref map) => map
                .get("tasks")
                .cloned()
                .ok_or_else(|| ExecutionError::phase(Phase::Tasks, "no tasks field in plan"))?,
            _ => return Err(ExecutionError::phase(Phase::Tasks, "plan is not a list")),
        };
        let tasks: Vec<TaskSpec> = serde_json::from_value(raw)
            .map_err(|e| ExecutionError::phase(Phase::Tasks, format!("malformed plan: {e}")))?;
        if tasks.is_empty() {
            return Err(ExecutionError::phase(Phase::Tasks, "plan contains no tasks"));
        }
        Ok(TasksOutput {
            tasks: normalize_orders(tasks),
            extra: BTreeMap::new(),
        })
    }

    async fn run(
        &self,
        robot: &Robot,
        execution: &Execution,
        controller: &ExecutionController,
    ) -> Result<RunOutput, ExecutionError> {
        let specs = execution
            .tasks
            .as_ref()
            .map(|t| t.tasks.clone())
            .unwrap_or_default();
        self.task_runner
            .run_tasks(robot, &specs, controller, &execution.execution_id)
            .await
    }

    async fn delivery(
        &self,
        robot: &Robot,
        execution: &Execution,
    ) -> Result<DeliveryResult, ExecutionError> {
        let goals = execution
            .goals
            .as_ref()
            .map(|g| g.content.clone())
            .unwrap_or_default();
        let results = execution
            .run
            .as_ref()
            .map(|r| {
                r.results
                    .iter()
                    .map(|t| format!("- [{}] {}", if t.success { "ok" } else { "failed" }, t.output))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        let prompt = format!(
            "Goals:\n{goals}\n\nTask results:\n{results}\n\nCompose the deliverable as JSON: \
             {{\"summary\", \"body\", \"attachments\"}}."
        );
        let content = match self.call_phase_agent(robot, Phase::Delivery, prompt).await {
            Ok(content) => content,
            Err(e) => {
                // Content composition is best-effort; fall back to the
                // raw material rather than losing the delivery
                warn!(error = %e, "Delivery agent unavailable, composing directly");
                String::new()
            }
        };

        let composed: DeliveryContent = extract_json(&content)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_else(|| DeliveryContent {
                summary: goals.lines().next().unwrap_or("Execution result").to_string(),
                body: results.clone(),
                attachments: Vec::new(),
            });

        let request = DeliveryRequest {
            content: composed,
            context: DeliveryContext {
                member_id: execution.member_id.clone(),
                execution_id: execution.execution_id.clone(),
                trigger_type: execution.trigger_type,
                team_id: execution.team_id.clone(),
            },
        };
        Ok(self.delivery_center.deliver(robot, &request).await)
    }

    async fn learning(
        &self,
        robot: &Robot,
        execution: &Execution,
    ) -> Result<LearningOutput, ExecutionError> {
        let summary = format!(
            "trigger={} phases={:?} tasks={} delivered={}",
            execution.trigger_type,
            execution.recorded_phases().len(),
            execution.run.as_ref().map_or(0, |r| r.results.len()),
            execution.delivery.as_ref().is_some_and(|d| d.success),
        );
        let prompt = format!(
            "Execution summary: {summary}\n\nDistill what this robot should remember as a JSON \
             list of {{\"kind\": \"execution\"|\"feedback\"|\"insight\", \"content\"}} entries."
        );
        let content = self.call_phase_agent(robot, Phase::Learning, prompt).await?;

        let entries: Vec<LearningEntry> = extract_json(&content)
            .and_then(|value| {
                let raw = match value {
                    serde_json::Value::Array(_) => value,
                    serde_json::Value::Object(ref map) => map.get("entries").cloned()?,
                    _ => return None,
                };
                serde_json::from_value::<Vec<RawLearning>>(raw).ok()
            })
            .map(|raw| raw.into_iter().map(RawLearning::into_entry).collect())
            .unwrap_or_default();

        self.learning.record(robot, &entries).await?;
        Ok(LearningOutput {
            entries,
            extra: BTreeMap::new(),
        })
    }
}

/// Learning entries as agents produce them (timestamps assigned here).
#[derive(serde::Deserialize)]
struct RawLearning {
    #[serde(default = "default_learning_kind")]
    kind: LearningKind,
    content: String,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

const fn default_learning_kind() -> LearningKind {
    LearningKind::Execution
}

impl RawLearning {
    fn into_entry(self) -> LearningEntry {
        let mut entry = LearningEntry::new(self.kind, self.content);
        entry.metadata = self.metadata;
        entry
    }
}

// ============================================================================
// DryRun runner - plausible fixtures, no external calls
// ============================================================================

/// Fixture runner for tests and scheduling verification.
pub struct DryRunRunner;

#[async_trait]
impl PhaseRunner for DryRunRunner {
    async fn inspiration(
        &self,
        _robot: &Robot,
        execution: &Execution,
    ) -> Result<InspirationOutput, ExecutionError> {
        let clock = match &execution.input {
            TriggerInput::Clock(context) => Some(context.clone()),
            _ => None,
        };
        Ok(InspirationOutput {
            clock,
            content: "# Inspiration (dry run)\n\nNothing noteworthy since the last run.".to_string(),
            extra: BTreeMap::new(),
        })
    }

    async fn goals(
        &self,
        _robot: &Robot,
        _execution: &Execution,
    ) -> Result<GoalsOutput, ExecutionError> {
        Ok(GoalsOutput {
            content: "# Goals (dry run)\n\n1. Produce a placeholder result.".to_string(),
            delivery_target: None,
            extra: BTreeMap::new(),
        })
    }

    async fn tasks(
        &self,
        _robot: &Robot,
        _execution: &Execution,
    ) -> Result<TasksOutput, ExecutionError> {
        Ok(TasksOutput {
            tasks: vec![TaskSpec::assistant(
                1,
                "__yao.run",
                "Produce the placeholder result",
            )],
            extra: BTreeMap::new(),
        })
    }

    async fn run(
        &self,
        _robot: &Robot,
        execution: &Execution,
        _controller: &ExecutionController,
    ) -> Result<RunOutput, ExecutionError> {
        let results = execution
            .tasks
            .as_ref()
            .map(|t| &t.tasks)
            .into_iter()
            .flatten()
            .map(|task| TaskResult {
                task_id: task.task_id.clone(),
                success: true,
                output: "dry run output".to_string(),
                error: None,
                duration_ms: 0,
                validation: ValidationResult::passing(),
            })
            .collect();
        Ok(RunOutput {
            results,
            extra: BTreeMap::new(),
        })
    }

    async fn delivery(
        &self,
        _robot: &Robot,
        _execution: &Execution,
    ) -> Result<DeliveryResult, ExecutionError> {
        Ok(DeliveryResult::from_results(Vec::new()))
    }

    async fn learning(
        &self,
        _robot: &Robot,
        _execution: &Execution,
    ) -> Result<LearningOutput, ExecutionError> {
        Ok(LearningOutput {
            entries: vec![LearningEntry::new(
                LearningKind::Execution,
                "dry run completed",
            )],
            extra: BTreeMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        EventRequest, ExecutionStatus, MemberRecord, TriggerType,
    };
    use crate::infrastructure::memory::MemoryExecutionStore;
    use serde_json::json;

    fn robot() -> Arc<Robot> {
        Arc::new(
            Robot::from_record(&MemberRecord {
                member_id: "r1".to_string(),
                team_id: "t1".to_string(),
                member_type: "robot".to_string(),
                status: "active".to_string(),
                autonomous_mode: true,
                display_name: "r1".to_string(),
                system_prompt: None,
                robot_email: None,
                robot_config: json!({"identity": {"role": "analyst"}}),
            })
            .unwrap(),
        )
    }

    fn event_execution(id: &str) -> Execution {
        Execution::new(
            id,
            "r1",
            "t1",
            TriggerInput::Event(EventRequest {
                source: "webhook".to_string(),
                event_type: "lead.created".to_string(),
                data: json!({"name": "John"}),
                executor_mode: None,
            }),
        )
    }

    fn executor(store: Arc<MemoryExecutionStore>) -> PhaseExecutor {
        // Standard runner unused in dry-run tests; wire it to fixtures
        PhaseExecutor {
            store,
            controller: Arc::new(ExecutionController::new()),
            standard: Arc::new(DryRunRunner),
            dryrun: Arc::new(DryRunRunner),
        }
    }

    #[tokio::test]
    async fn test_dryrun_event_records_p1_to_p5() {
        let store = Arc::new(MemoryExecutionStore::new());
        let exec = executor(Arc::clone(&store));

        exec.run(robot(), event_execution("e1"), ExecutorMode::DryRun)
            .await
            .unwrap();

        let stored = store.get("e1").await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
        assert!(stored.inspiration.is_none(), "P0 skipped for events");
        assert!(stored.goals.is_some());
        assert!(stored.tasks.is_some());
        assert!(stored.run.is_some());
        assert!(stored.delivery.is_some());
        assert!(stored.learning.is_some());
        assert!(stored.end_time.is_some());

        let recorded = stored.recorded_phases();
        let sequence = Phase::sequence_for(TriggerType::Event);
        assert_eq!(recorded.as_slice(), &sequence[..recorded.len()]);
    }

    #[tokio::test]
    async fn test_sandbox_falls_back_to_dryrun() {
        let store = Arc::new(MemoryExecutionStore::new());
        let exec = executor(Arc::clone(&store));

        exec.run(robot(), event_execution("e1"), ExecutorMode::Sandbox)
            .await
            .unwrap();
        let stored = store.get("e1").await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_pre_cancelled_execution_ends_cancelled() {
        let store = Arc::new(MemoryExecutionStore::new());
        let exec = executor(Arc::clone(&store));

        exec.controller.track("e1").await;
        exec.controller.stop("e1").await.unwrap();
        exec.run(robot(), event_execution("e1"), ExecutorMode::DryRun)
            .await
            .unwrap();

        let stored = store.get("e1").await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Cancelled);
        assert!(stored.run.is_none(), "no phase output after cancellation");
    }

    #[tokio::test]
    async fn test_normalize_orders_reindexes_duplicates() {
        let tasks = vec![
            TaskSpec::assistant(3, "a", "third"),
            TaskSpec::assistant(3, "b", "also third"),
            TaskSpec::assistant(1, "c", "first"),
        ];
        let normalized = normalize_orders(tasks);
        let orders: Vec<u32> = normalized.iter().map(|t| t.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(normalized[0].executor_id, "c");
    }

    #[tokio::test]
    async fn test_normalize_orders_keeps_strict_sequences() {
        let tasks = vec![
            TaskSpec::assistant(10, "a", "later"),
            TaskSpec::assistant(2, "b", "earlier"),
        ];
        let normalized = normalize_orders(tasks);
        let orders: Vec<u32> = normalized.iter().map(|t| t.order).collect();
        assert_eq!(orders, vec![2, 10], "already strict orders are preserved");
    }
}
