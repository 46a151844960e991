//! Execution controller - pause/resume/stop for in-flight executions.
//!
//! Every live execution is tracked with a small record and two watch
//! channels: a pause gate the running code blocks on, and a cancel flag
//! surfaced through [`ExecutionController::check_cancelled`]. The phase
//! executor checks both at every phase boundary and the task runner
//! between turns, so control actions take effect within a bounded number
//! of steps.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::debug;

use crate::domain::error::ExecutionError;
use crate::domain::models::Phase;

/// Observable state of one tracked execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Running,
    Paused,
    Cancelled,
}

/// A point-in-time view of a tracked execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSnapshot {
    pub execution_id: String,
    pub state: ControlState,
    pub phase: Option<Phase>,
    pub started_at: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
}

struct TrackedMeta {
    phase: Option<Phase>,
    paused_at: Option<DateTime<Utc>>,
}

struct Tracked {
    started_at: DateTime<Utc>,
    meta: Mutex<TrackedMeta>,
    pause_tx: watch::Sender<bool>,
    cancel_tx: watch::Sender<bool>,
}

impl Tracked {
    fn new() -> Self {
        let (pause_tx, _) = watch::channel(false);
        let (cancel_tx, _) = watch::channel(false);
        Self {
            started_at: Utc::now(),
            meta: Mutex::new(TrackedMeta {
                phase: None,
                paused_at: None,
            }),
            pause_tx,
            cancel_tx,
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    fn is_paused(&self) -> bool {
        *self.pause_tx.borrow()
    }
}

/// Tracks every in-flight execution and arbitrates control actions.
#[derive(Default)]
pub struct ExecutionController {
    tracked: RwLock<HashMap<String, Arc<Tracked>>>,
}

impl ExecutionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an execution. Idempotent: re-tracking an id keeps the
    /// existing record and its control state.
    pub async fn track(&self, execution_id: &str) {
        let mut tracked = self.tracked.write().await;
        tracked
            .entry(execution_id.to_string())
            .or_insert_with(|| Arc::new(Tracked::new()));
    }

    /// Drop a terminal execution from the registry.
    pub async fn untrack(&self, execution_id: &str) {
        self.tracked.write().await.remove(execution_id);
    }

    async fn get(&self, execution_id: &str) -> Option<Arc<Tracked>> {
        self.tracked.read().await.get(execution_id).cloned()
    }

    /// Close the pause gate. Subsequent `wait_if_paused` calls block
    /// until resume or stop.
    pub async fn pause(&self, execution_id: &str) -> Result<(), ExecutionError> {
        let tracked = self
            .get(execution_id)
            .await
            .ok_or_else(|| ExecutionError::ExecutionNotFound(execution_id.to_string()))?;
        let _ = tracked.pause_tx.send(true);
        tracked.meta.lock().await.paused_at = Some(Utc::now());
        debug!(execution_id, "Execution paused");
        Ok(())
    }

    /// Reopen the pause gate.
    pub async fn resume(&self, execution_id: &str) -> Result<(), ExecutionError> {
        let tracked = self
            .get(execution_id)
            .await
            .ok_or_else(|| ExecutionError::ExecutionNotFound(execution_id.to_string()))?;
        let _ = tracked.pause_tx.send(false);
        tracked.meta.lock().await.paused_at = None;
        debug!(execution_id, "Execution resumed");
        Ok(())
    }

    /// Raise the cancel signal. Blocked and future control checks
    /// surface [`ExecutionError::Cancelled`].
    pub async fn stop(&self, execution_id: &str) -> Result<(), ExecutionError> {
        let tracked = self
            .get(execution_id)
            .await
            .ok_or_else(|| ExecutionError::ExecutionNotFound(execution_id.to_string()))?;
        let _ = tracked.cancel_tx.send(true);
        debug!(execution_id, "Execution stop requested");
        Ok(())
    }

    /// Record the phase the execution is entering.
    pub async fn set_phase(&self, execution_id: &str, phase: Phase) {
        if let Some(tracked) = self.get(execution_id).await {
            tracked.meta.lock().await.phase = Some(phase);
        }
    }

    /// Fail fast when the execution was stopped. Untracked ids pass.
    pub async fn check_cancelled(&self, execution_id: &str) -> Result<(), ExecutionError> {
        match self.get(execution_id).await {
            Some(tracked) if tracked.is_cancelled() => Err(ExecutionError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Block while the execution is paused. Returns
    /// [`ExecutionError::Cancelled`] if it is stopped first (or was
    /// already stopped).
    pub async fn wait_if_paused(&self, execution_id: &str) -> Result<(), ExecutionError> {
        let Some(tracked) = self.get(execution_id).await else {
            return Ok(());
        };

        let mut pause_rx = tracked.pause_tx.subscribe();
        let mut cancel_rx = tracked.cancel_tx.subscribe();
        loop {
            if tracked.is_cancelled() {
                return Err(ExecutionError::Cancelled);
            }
            if !tracked.is_paused() {
                return Ok(());
            }
            tokio::select! {
                changed = pause_rx.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
                changed = cancel_rx.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Point-in-time view of one tracked execution.
    pub async fn snapshot(&self, execution_id: &str) -> Option<ControlSnapshot> {
        let tracked = self.get(execution_id).await?;
        let meta = tracked.meta.lock().await;
        let state = if tracked.is_cancelled() {
            ControlState::Cancelled
        } else if tracked.is_paused() {
            ControlState::Paused
        } else {
            ControlState::Running
        };
        Some(ControlSnapshot {
            execution_id: execution_id.to_string(),
            state,
            phase: meta.phase,
            started_at: tracked.started_at,
            paused_at: meta.paused_at,
        })
    }

    /// Number of tracked executions.
    pub async fn tracked_count(&self) -> usize {
        self.tracked.read().await.len()
    }
}
