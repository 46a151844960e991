//! Trigger ingress - validation and the clock ticker.
//!
//! Three entrypoints produce a [`TriggerInput`] and submit it to the
//! pool: the internal one-minute ticker, human interventions, and
//! external events. Human and event submissions are validated against
//! the robot's trigger switches; clock firings additionally pass the
//! window dedup.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::error::{ExecutionError, TriggerError};
use crate::domain::models::{
    EventRequest, InterventionRequest, TriggerInput, TriggerType,
};

use super::cache::RobotCache;
use super::clock::ClockMatcher;
use super::dedup::{DedupDecision, SemanticDedup, WindowDedup};
use super::scheduler::{SchedulerPool, SubmitOutcome};

/// Default ticker period: clocks are minute-granular.
pub const DEFAULT_TICK: Duration = Duration::from_secs(60);

struct TickerTask {
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Validates triggers and feeds the scheduler.
pub struct TriggerIngress {
    cache: Arc<RobotCache>,
    pool: Arc<SchedulerPool>,
    window_dedup: Arc<WindowDedup>,
    semantic_dedup: Option<Arc<SemanticDedup>>,
    tick: Duration,
    ticker: Mutex<Option<TickerTask>>,
}

impl TriggerIngress {
    pub fn new(
        cache: Arc<RobotCache>,
        pool: Arc<SchedulerPool>,
        window_dedup: Arc<WindowDedup>,
    ) -> Self {
        Self {
            cache,
            pool,
            window_dedup,
            semantic_dedup: None,
            tick: DEFAULT_TICK,
            ticker: Mutex::new(None),
        }
    }

    /// Consult a semantic dedup agent for human/event submissions.
    pub fn with_semantic_dedup(mut self, dedup: Arc<SemanticDedup>) -> Self {
        self.semantic_dedup = Some(dedup);
        self
    }

    /// Override the ticker period (tests).
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    fn new_execution_id() -> String {
        format!("exec_{}", uuid::Uuid::new_v4().simple())
    }

    /// Submit a human intervention for a robot.
    pub async fn intervene(
        &self,
        member_id: &str,
        request: InterventionRequest,
    ) -> Result<SubmitOutcome, ExecutionError> {
        let robot = self.cache.get(member_id).await?;

        if !robot.config.trigger_enabled(TriggerType::Human) {
            return Err(TriggerError::Disabled {
                member_id: member_id.to_string(),
                trigger: "human".to_string(),
            }
            .into());
        }
        if !robot.config.action_allowed(request.action) {
            return Err(TriggerError::ActionNotAllowed(request.action.as_str().to_string()).into());
        }
        if request.messages.is_empty() {
            return Err(TriggerError::MissingMessages.into());
        }

        if let Some(decision) = self
            .semantic_check(&summarize_messages(&request))
            .await
        {
            if decision == DedupDecision::Skip {
                let execution_id = Self::new_execution_id();
                debug!(member_id, "Intervention skipped as duplicate");
                return Ok(SubmitOutcome {
                    accepted: false,
                    queued: false,
                    execution_id,
                    message: Some("skipped: duplicates recent work".to_string()),
                });
            }
        }

        self.pool
            .submit(
                robot,
                TriggerInput::Human(request),
                Self::new_execution_id(),
                None,
            )
            .await
    }

    /// Submit an external event for a robot.
    pub async fn event(
        &self,
        member_id: &str,
        request: EventRequest,
    ) -> Result<SubmitOutcome, ExecutionError> {
        let robot = self.cache.get(member_id).await?;

        if !robot.config.trigger_enabled(TriggerType::Event) {
            return Err(TriggerError::Disabled {
                member_id: member_id.to_string(),
                trigger: "event".to_string(),
            }
            .into());
        }
        if request.source.trim().is_empty() {
            return Err(TriggerError::MissingField("source").into());
        }
        if request.event_type.trim().is_empty() {
            return Err(TriggerError::MissingField("event_type").into());
        }

        if let Some(decision) = self
            .semantic_check(&format!("{}:{}", request.source, request.event_type))
            .await
        {
            if decision == DedupDecision::Skip {
                return Ok(SubmitOutcome {
                    accepted: false,
                    queued: false,
                    execution_id: Self::new_execution_id(),
                    message: Some("skipped: duplicates recent work".to_string()),
                });
            }
        }

        self.pool
            .submit(
                robot,
                TriggerInput::Event(request),
                Self::new_execution_id(),
                None,
            )
            .await
    }

    /// Semantic dedup applies to human/event only; clock firings rely
    /// on the window layer.
    async fn semantic_check(&self, candidate: &str) -> Option<DedupDecision> {
        let dedup = self.semantic_dedup.as_ref()?;
        Some(dedup.evaluate(candidate, &[]).await)
    }

    /// One ticker pass: match every cached robot, dedup, submit.
    pub async fn clock_tick(&self) -> usize {
        let now = Utc::now();
        let mut fired = 0;

        for robot in self.cache.all().await {
            let Some(hit) = ClockMatcher::matches(&robot, now).await else {
                continue;
            };

            let decision = self
                .window_dedup
                .check(&robot.member_id, TriggerType::Clock, &hit.window_label)
                .await;
            if decision != DedupDecision::Proceed {
                debug!(member_id = %robot.member_id, label = %hit.window_label, "Clock firing deduped");
                continue;
            }

            let member_id = robot.member_id.clone();
            let outcome = self
                .pool
                .submit(
                    robot,
                    TriggerInput::Clock(hit.context),
                    Self::new_execution_id(),
                    None,
                )
                .await;

            match outcome {
                Ok(outcome) if outcome.accepted => {
                    self.window_dedup
                        .mark(&member_id, TriggerType::Clock, &hit.window_label, self.tick)
                        .await;
                    fired += 1;
                }
                Ok(outcome) => {
                    debug!(
                        member_id = %member_id,
                        message = outcome.message.as_deref().unwrap_or(""),
                        "Clock submission refused"
                    );
                }
                Err(e) => warn!(member_id = %member_id, error = %e, "Clock submission failed"),
            }
        }
        fired
    }

    /// Start the ticker. Restarting stops the previous loop first.
    pub async fn start_clock(self: &Arc<Self>) {
        self.stop_clock().await;

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
        let ingress = Arc::clone(self);
        let tick = self.tick;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let fired = ingress.clock_tick().await;
                        if fired > 0 {
                            info!(fired, "Clock ticker submitted executions");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("Clock ticker stopping");
                        return;
                    }
                }
            }
        });

        *self.ticker.lock().await = Some(TickerTask { shutdown_tx, handle });
    }

    /// Stop the ticker and wait for it to exit. Idempotent.
    pub async fn stop_clock(&self) {
        let task = self.ticker.lock().await.take();
        if let Some(task) = task {
            let _ = task.shutdown_tx.send(true);
            let _ = task.handle.await;
        }
    }
}

fn summarize_messages(request: &InterventionRequest) -> String {
    request
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
