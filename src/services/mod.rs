//! Core services: the orchestration substrate.

pub mod cache;
pub mod clock;
pub mod controller;
pub mod dedup;
pub mod delivery;
pub mod executor;
pub mod ingress;
pub mod learning;
pub mod scheduler;
pub mod system;
pub mod task_runner;
pub mod validator;

pub use cache::{CacheStats, RobotCache};
pub use clock::{ClockMatch, ClockMatcher};
pub use controller::{ControlSnapshot, ControlState, ExecutionController};
pub use dedup::{DedupDecision, SemanticDedup, WindowDedup};
pub use delivery::{default_email_channel, set_default_email_channel, DeliveryCenter};
pub use executor::{DryRunRunner, PhaseExecutor, PhaseRunner, StandardRunner};
pub use ingress::TriggerIngress;
pub use learning::LearningService;
pub use scheduler::{ExecutionDriver, PoolConfig, PoolStats, SchedulerPool, SubmitOutcome};
pub use system::{Collaborators, CoreSystem, SystemStats};
pub use task_runner::TaskRunner;
pub use validator::{assert_rule, RuleOutcome, Validator};
