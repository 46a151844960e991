//! Domain models.

pub mod config;
pub mod delivery;
pub mod execution;
pub mod learning;
pub mod robot;
pub mod task;
pub mod trigger;
pub mod validation;

pub use config::{
    ClockConfig, ClockMode, Identity, LearnConfig, PhaseAgents, QuotaConfig, ResourceConfig,
    RobotConfig, RunConfig, TriggerSwitches,
};
pub use delivery::{
    AttachmentWrapper, ChannelPreference, ChannelResult, DeliveryContent, DeliveryContext,
    DeliveryRequest, DeliveryResult, DeliveryTarget, DeliveryType,
};
pub use execution::{
    Execution, ExecutionFilters, ExecutionStatus, GoalsOutput, InspirationOutput, LearningOutput,
    Phase, PhaseArtifact, RunOutput, TasksOutput,
};
pub use learning::{private_collection, LearningEntry, LearningKind};
pub use robot::{MemberRecord, Robot, RobotRuntime, RobotStatus};
pub use task::{ExecutorType, TaskResult, TaskSpec, TaskStatus};
pub use trigger::{
    ClockContext, EventRequest, ExecutorMode, InsertPosition, InterventionAction,
    InterventionRequest, TriggerInput, TriggerMessage, TriggerType,
};
pub use validation::{Assertion, ValidationResult, ValidationRule, ValueKind};
