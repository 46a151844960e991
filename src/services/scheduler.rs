//! Priority scheduler - the two-level worker pool.
//!
//! Submissions land in a binary heap ordered by
//! `robot_priority * 1000 + trigger_weight * 100`, ties broken FIFO by
//! enqueue sequence. N workers pull from the heap; a robot at its
//! `quota.max` has its items re-enqueued with their original sequence so
//! waiting never decays their priority. Global capacity and per-robot
//! queue caps bound the footprint.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::error::ExecutionError;
use crate::domain::models::{Execution, ExecutorMode, Robot, TriggerInput};
use crate::domain::ports::ExecutionStore;

use super::controller::ExecutionController;

/// Runs one execution to a terminal state. Implemented by the phase
/// executor; mocked in scheduler tests.
#[async_trait]
pub trait ExecutionDriver: Send + Sync {
    async fn run(
        &self,
        robot: Arc<Robot>,
        execution: Execution,
        mode: ExecutorMode,
    ) -> Result<(), ExecutionError>;
}

/// Pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PoolConfig {
    /// Concurrent worker tasks
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Global queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long `stop` waits for workers to finish current items
    #[serde(default = "default_drain_secs")]
    pub drain_timeout_secs: u64,
}

const fn default_workers() -> usize {
    10
}

const fn default_queue_capacity() -> usize {
    1000
}

const fn default_drain_secs() -> u64 {
    30
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            drain_timeout_secs: default_drain_secs(),
        }
    }
}

/// The caller-visible acceptance decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub accepted: bool,
    /// Whether the work waits for a slot rather than starting at once
    pub queued: bool,
    pub execution_id: String,
    pub message: Option<String>,
}

impl SubmitOutcome {
    fn rejected(execution_id: String, message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            queued: false,
            execution_id,
            message: Some(message.into()),
        }
    }
}

struct QueuedItem {
    /// Enqueue sequence; preserved across re-enqueues so priority never
    /// decays while a robot is at quota
    seq: u64,
    score: u32,
    robot: Arc<Robot>,
    execution: Execution,
    mode: ExecutorMode,
}

impl QueuedItem {
    fn score_for(robot: &Robot, input: &TriggerInput) -> u32 {
        u32::from(robot.config.quota.priority) * 1000 + input.trigger_type().weight() * 100
    }
}

impl PartialEq for QueuedItem {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedItem {}

impl PartialOrd for QueuedItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher score wins, then earlier sequence (FIFO)
        self.score
            .cmp(&other.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct PoolInner {
    queue: BinaryHeap<QueuedItem>,
    queued_per_robot: HashMap<String, usize>,
    next_seq: u64,
    running: usize,
    accepting: bool,
}

impl PoolInner {
    fn decrement_queued(&mut self, member_id: &str) {
        if let Some(count) = self.queued_per_robot.get_mut(member_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.queued_per_robot.remove(member_id);
            }
        }
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub queued: usize,
    pub running: usize,
    pub workers: usize,
}

/// The two-level priority worker pool.
pub struct SchedulerPool {
    config: PoolConfig,
    driver: Arc<dyn ExecutionDriver>,
    store: Arc<dyn ExecutionStore>,
    controller: Arc<ExecutionController>,
    inner: Mutex<PoolInner>,
    notify: Notify,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerPool {
    pub fn new(
        config: PoolConfig,
        driver: Arc<dyn ExecutionDriver>,
        store: Arc<dyn ExecutionStore>,
        controller: Arc<ExecutionController>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            driver,
            store,
            controller,
            inner: Mutex::new(PoolInner {
                accepting: true,
                ..PoolInner::default()
            }),
            notify: Notify::new(),
            shutdown_tx,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker tasks. Idempotent: extra calls are ignored once
    /// workers exist.
    pub async fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            return;
        }
        for worker_id in 0..self.config.workers {
            let pool = Arc::clone(self);
            workers.push(tokio::spawn(async move {
                pool.worker_loop(worker_id).await;
            }));
        }
        info!(workers = self.config.workers, "Scheduler pool started");
    }

    /// Submit a validated trigger for a robot.
    ///
    /// Saves a pending execution record and enqueues it. Rejections
    /// (shutdown, paused robot, full queues) are returned as facts in
    /// the outcome, not errors.
    pub async fn submit(
        &self,
        robot: Arc<Robot>,
        input: TriggerInput,
        execution_id: String,
        mode_override: Option<ExecutorMode>,
    ) -> Result<SubmitOutcome, ExecutionError> {
        if !robot.status.accepts_work() {
            return Ok(SubmitOutcome::rejected(
                execution_id,
                format!("robot {} is not accepting work", robot.member_id),
            ));
        }

        let mode = mode_override
            .or_else(|| input.executor_mode())
            .unwrap_or_default();
        let score = QueuedItem::score_for(&robot, &input);

        let mut inner = self.inner.lock().await;
        if !inner.accepting {
            return Ok(SubmitOutcome::rejected(execution_id, "scheduler is shutting down"));
        }
        if inner.queue.len() >= self.config.queue_capacity {
            return Ok(SubmitOutcome::rejected(execution_id, "scheduler queue is full"));
        }
        let queued_for_robot = inner
            .queued_per_robot
            .get(&robot.member_id)
            .copied()
            .unwrap_or(0);
        if queued_for_robot >= robot.config.quota.queue {
            return Ok(SubmitOutcome::rejected(
                execution_id,
                format!("robot {} queue is full", robot.member_id),
            ));
        }

        let execution = Execution::new(
            execution_id.clone(),
            robot.member_id.clone(),
            robot.team_id.clone(),
            input,
        );
        self.store.save(&execution).await?;
        // Track now so stop() works on queued executions too
        self.controller.track(&execution_id).await;

        // Committed work (running + queued) at or above quota means the
        // item waits for a slot.
        let running = robot.runtime.running_count().await;
        let queued = running + queued_for_robot >= robot.config.quota.max;

        inner.next_seq += 1;
        let seq = inner.next_seq;
        *inner
            .queued_per_robot
            .entry(robot.member_id.clone())
            .or_insert(0) += 1;
        inner.queue.push(QueuedItem {
            seq,
            score,
            robot,
            execution,
            mode,
        });
        drop(inner);
        self.notify.notify_one();

        debug!(execution_id = %execution_id, score, queued, "Execution enqueued");
        Ok(SubmitOutcome {
            accepted: true,
            queued,
            execution_id,
            message: None,
        })
    }

    /// Pop the best runnable item: the highest-priority entry whose
    /// robot is below `quota.max`. Blocked entries go straight back with
    /// their sequence preserved.
    async fn claim_next(&self) -> Option<QueuedItem> {
        let mut inner = self.inner.lock().await;
        let mut blocked = Vec::new();
        let mut claimed = None;

        while let Some(item) = inner.queue.pop() {
            let max = item.robot.config.quota.max;
            if item
                .robot
                .runtime
                .try_begin(&item.execution.execution_id, max)
                .await
            {
                inner.decrement_queued(&item.robot.member_id);
                inner.running += 1;
                claimed = Some(item);
                break;
            }
            blocked.push(item);
        }

        for item in blocked {
            inner.queue.push(item);
        }
        claimed
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            if *shutdown_rx.borrow() {
                debug!(worker_id, "Worker exiting");
                return;
            }

            match self.claim_next().await {
                Some(item) => self.process(item).await,
                None => {
                    tokio::select! {
                        () = self.notify.notified() => {}
                        // Re-check periodically: a freed slot may make a
                        // re-enqueued item runnable without a new submit
                        () = tokio::time::sleep(Duration::from_millis(100)) => {}
                        _ = shutdown_rx.changed() => {}
                    }
                }
            }
        }
    }

    async fn process(&self, item: QueuedItem) {
        let execution_id = item.execution.execution_id.clone();
        let robot = Arc::clone(&item.robot);

        debug!(execution_id = %execution_id, member_id = %robot.member_id, "Worker picked execution");
        if let Err(e) = self
            .driver
            .run(Arc::clone(&robot), item.execution, item.mode)
            .await
        {
            error!(execution_id = %execution_id, error = %e, "Execution driver failed");
        }

        robot.runtime.finish(&execution_id).await;
        self.inner.lock().await.running -= 1;
        // A slot freed: blocked items of this robot may be runnable now
        self.notify.notify_one();
    }

    /// Stop accepting work, drain workers, and cancel whatever is still
    /// queued after the drain deadline.
    pub async fn stop(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.accepting = false;
        }
        let _ = self.shutdown_tx.send(true);
        self.notify.notify_waiters();

        let mut workers: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        let drain = Duration::from_secs(self.config.drain_timeout_secs);
        if tokio::time::timeout(drain, futures::future::join_all(workers.iter_mut()))
            .await
            .is_err()
        {
            warn!("Drain deadline reached, aborting remaining workers");
            for worker in &workers {
                worker.abort();
            }
        }

        // Mark everything still queued as cancelled
        let leftovers: Vec<QueuedItem> = {
            let mut inner = self.inner.lock().await;
            inner.queued_per_robot.clear();
            inner.queue.drain().collect()
        };
        for item in leftovers {
            let execution_id = &item.execution.execution_id;
            if let Err(e) = self
                .store
                .update_status(
                    execution_id,
                    crate::domain::models::ExecutionStatus::Cancelled,
                    Some("scheduler shutdown".to_string()),
                )
                .await
            {
                warn!(execution_id = %execution_id, error = %e, "Failed to cancel queued execution");
            }
            self.controller.untrack(execution_id).await;
        }
        info!("Scheduler pool stopped");
    }

    pub async fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().await;
        PoolStats {
            queued: inner.queue.len(),
            running: inner.running,
            workers: self.config.workers,
        }
    }
}
