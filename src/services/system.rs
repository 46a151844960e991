//! The core system facade.
//!
//! Wires the cache, dedup, controller, scheduler, ingress, and phase
//! executor into one value constructed at startup. Hosts that want a
//! default instance hold one `CoreSystem` and expose its methods from
//! their API surface.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::domain::error::{ExecutionError, StoreError};
use crate::domain::models::{
    EventRequest, Execution, ExecutionFilters, InterventionRequest,
};
use crate::domain::ports::{
    AgentRuntime, AttachmentService, ExecutionStore, KnowledgeBase, McpExecutor, MemberStore,
    Messenger, ProcessExecutor, ScriptRunner,
};
use crate::infrastructure::config::CoreConfig;

use super::cache::{CacheStats, RobotCache};
use super::controller::{ControlSnapshot, ExecutionController};
use super::delivery::DeliveryCenter;
use super::dedup::{SemanticDedup, WindowDedup};
use super::executor::{PhaseExecutor, StandardRunner};
use super::ingress::TriggerIngress;
use super::learning::LearningService;
use super::scheduler::{PoolStats, SchedulerPool, SubmitOutcome};
use super::task_runner::TaskRunner;
use super::validator::Validator;

/// The external collaborators the core talks to.
pub struct Collaborators {
    pub members: Arc<dyn MemberStore>,
    pub executions: Arc<dyn ExecutionStore>,
    pub agents: Arc<dyn AgentRuntime>,
    pub mcp: Arc<dyn McpExecutor>,
    pub processes: Arc<dyn ProcessExecutor>,
    pub messenger: Arc<dyn Messenger>,
    pub attachments: Arc<dyn AttachmentService>,
    pub knowledge: Arc<dyn KnowledgeBase>,
    /// Pluggable runner for `script` validation rules
    pub script_runner: Option<Arc<dyn ScriptRunner>>,
    /// Executor names advertised to the planning phase
    pub executor_catalog: Vec<String>,
    /// Consult the semantic dedup agent for human/event submissions
    pub semantic_dedup: bool,
}

/// Combined runtime counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemStats {
    pub cache: CacheStats,
    pub pool: PoolStats,
    pub tracked_executions: usize,
}

/// The orchestration substrate, assembled.
pub struct CoreSystem {
    config: CoreConfig,
    cache: Arc<RobotCache>,
    controller: Arc<ExecutionController>,
    pool: Arc<SchedulerPool>,
    ingress: Arc<TriggerIngress>,
    store: Arc<dyn ExecutionStore>,
}

impl CoreSystem {
    /// Assemble the system. Nothing runs until [`CoreSystem::start`].
    pub fn new(collaborators: Collaborators, config: CoreConfig) -> Self {
        let cache = Arc::new(RobotCache::new(Arc::clone(&collaborators.members)));
        let controller = Arc::new(ExecutionController::new());

        let mut validator = Validator::new(Arc::clone(&collaborators.agents));
        if let Some(runner) = &collaborators.script_runner {
            validator = validator.with_script_runner(Arc::clone(runner));
        }
        let validator = Arc::new(validator);

        let task_runner = TaskRunner::new(
            Arc::clone(&collaborators.agents),
            Arc::clone(&collaborators.mcp),
            Arc::clone(&collaborators.processes),
            validator,
        );
        let delivery_center = Arc::new(DeliveryCenter::new(
            Arc::clone(&collaborators.messenger),
            Arc::clone(&collaborators.attachments),
            Arc::clone(&collaborators.processes),
        ));
        let learning = LearningService::new(Arc::clone(&collaborators.knowledge));

        let standard = Arc::new(StandardRunner::new(
            Arc::clone(&collaborators.agents),
            task_runner,
            delivery_center,
            learning,
            collaborators.executor_catalog.clone(),
        ));
        let executor = Arc::new(PhaseExecutor::new(
            Arc::clone(&collaborators.executions),
            Arc::clone(&controller),
            standard,
        ));

        let pool = Arc::new(SchedulerPool::new(
            config.pool,
            executor,
            Arc::clone(&collaborators.executions),
            Arc::clone(&controller),
        ));

        let window_dedup = Arc::new(WindowDedup::new(config.dedup_capacity));
        let mut ingress = TriggerIngress::new(
            Arc::clone(&cache),
            Arc::clone(&pool),
            window_dedup,
        )
        .with_tick(Duration::from_secs(config.clock_tick_secs));
        if collaborators.semantic_dedup {
            ingress = ingress.with_semantic_dedup(Arc::new(
                SemanticDedup::new(Arc::clone(&collaborators.agents))
                    .with_timeout(Duration::from_secs(config.semantic_timeout_secs)),
            ));
        }

        Self {
            config,
            cache,
            controller,
            pool,
            ingress: Arc::new(ingress),
            store: collaborators.executions,
        }
    }

    /// Load the cache and start the background machinery: auto-refresh,
    /// worker pool, clock ticker.
    pub async fn start(&self) -> Result<(), StoreError> {
        let robots = self.cache.load().await?;
        self.cache
            .start_auto_refresh(Duration::from_secs(self.config.cache_refresh_secs))
            .await;
        self.pool.start().await;
        self.ingress.start_clock().await;
        info!(robots, "Core system started");
        Ok(())
    }

    /// Stop the ticker, the refresher, and the pool. Queued work is
    /// marked cancelled; no background task survives.
    pub async fn shutdown(&self) {
        self.ingress.stop_clock().await;
        self.cache.stop_auto_refresh().await;
        self.pool.stop().await;
        info!("Core system stopped");
    }

    // -- Trigger API surface --

    pub async fn intervene(
        &self,
        member_id: &str,
        request: InterventionRequest,
    ) -> Result<SubmitOutcome, ExecutionError> {
        self.ingress.intervene(member_id, request).await
    }

    pub async fn event(
        &self,
        member_id: &str,
        request: EventRequest,
    ) -> Result<SubmitOutcome, ExecutionError> {
        self.ingress.event(member_id, request).await
    }

    pub async fn pause(&self, execution_id: &str) -> Result<(), ExecutionError> {
        self.controller.pause(execution_id).await
    }

    pub async fn resume(&self, execution_id: &str) -> Result<(), ExecutionError> {
        self.controller.resume(execution_id).await
    }

    pub async fn stop(&self, execution_id: &str) -> Result<(), ExecutionError> {
        self.controller.stop(execution_id).await
    }

    pub async fn get_execution(&self, execution_id: &str) -> Result<Execution, ExecutionError> {
        self.store
            .get(execution_id)
            .await?
            .ok_or_else(|| ExecutionError::ExecutionNotFound(execution_id.to_string()))
    }

    pub async fn list_executions(
        &self,
        filters: &ExecutionFilters,
    ) -> Result<Vec<Execution>, ExecutionError> {
        Ok(self.store.list(filters).await?)
    }

    pub async fn control_snapshot(&self, execution_id: &str) -> Option<ControlSnapshot> {
        self.controller.snapshot(execution_id).await
    }

    pub async fn stats(&self) -> SystemStats {
        SystemStats {
            cache: self.cache.stats().await,
            pool: self.pool.stats().await,
            tracked_executions: self.controller.tracked_count().await,
        }
    }

    /// The robot cache, for hosts that manage members directly.
    pub fn cache(&self) -> &Arc<RobotCache> {
        &self.cache
    }

    /// One manual ticker pass (scheduling verification in tests).
    pub async fn clock_tick(&self) -> usize {
        self.ingress.clock_tick().await
    }
}
