//! Domain error types for the cohort runtime.
//!
//! Each enum covers one concern. Dedup skips and queue rejections are not
//! errors; they are facts returned to the caller.

use thiserror::Error;

use super::models::execution::Phase;

/// Errors found while validating a robot's configuration.
///
/// A robot whose config fails validation is omitted from the cache at load
/// time; the record itself is left untouched in the member store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The mandatory identity role is missing or empty
    #[error("identity.role is required")]
    MissingRole,

    /// The clock block is not one of the three accepted shapes
    #[error("invalid clock mode: {0}")]
    InvalidClockMode(String),

    /// A `times` clock was configured with no times
    #[error("clock times list is empty")]
    EmptyClockTimes,

    /// A time entry is not minute-granular "HH:MM"
    #[error("invalid clock time entry: {0}")]
    InvalidClockTime(String),

    /// An interval clock with a non-positive period
    #[error("clock interval must be positive")]
    NonPositiveInterval,

    /// The configured timezone is not a known IANA name
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    /// Quota priority outside 1..=10
    #[error("invalid quota priority: {0}, must be 1-10")]
    InvalidPriority(u8),

    /// Quota max / queue of zero
    #[error("invalid quota {field}: must be at least 1")]
    InvalidQuota { field: &'static str },

    /// The robot_config blob could not be deserialized
    #[error("malformed robot_config: {0}")]
    Malformed(String),
}

/// Errors raised while validating an incoming trigger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// The robot's trigger switch forbids this trigger type
    #[error("{trigger} triggers are disabled for member {member_id}")]
    Disabled { member_id: String, trigger: String },

    /// The intervention action is outside the configured allow-list
    #[error("action '{0}' is not allowed for this robot")]
    ActionNotAllowed(String),

    /// An intervention arrived without any input message
    #[error("intervention requires at least one message")]
    MissingMessages,

    /// An event arrived without a source or event type
    #[error("event requires {0}")]
    MissingField(&'static str),
}

/// Errors from the persistence layer behind the execution and member stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// The record was not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Serialization or deserialization of a stored record failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backing connection is unavailable
    #[error("store connection failed: {0}")]
    ConnectionFailed(String),
}

impl StoreError {
    /// Returns true if this error is transient and could succeed on retry.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_))
    }
}

/// Errors from the agent runtime collaborator.
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    /// The call itself failed (network, backend, malformed reply)
    #[error("agent call failed: {0}")]
    CallFailed(String),

    /// The call exceeded its deadline
    #[error("agent call timed out after {0} seconds")]
    Timeout(u64),

    /// The agent's reply could not be parsed into the expected shape
    #[error("invalid agent response: {0}")]
    InvalidResponse(String),
}

/// Errors from the MCP executor collaborator.
#[derive(Error, Debug, Clone)]
pub enum McpError {
    /// The server is not known
    #[error("MCP server not found: {0}")]
    ServerNotFound(String),

    /// The tool call failed
    #[error("MCP tool '{tool}' on server '{server}' failed: {message}")]
    ToolCallFailed {
        server: String,
        tool: String,
        message: String,
    },

    /// The executor id could not be split into `server.tool`
    #[error("invalid MCP executor id: {0}")]
    InvalidExecutorId(String),
}

/// Errors from the process registry.
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    /// No process is registered under that name
    #[error("process not found: {0}")]
    NotFound(String),

    /// The process ran and failed
    #[error("process '{name}' failed: {message}")]
    Failed { name: String, message: String },
}

/// Errors from a delivery channel target.
#[derive(Error, Debug, Clone)]
pub enum DeliveryError {
    /// The messenger refused or failed to send
    #[error("email send failed: {0}")]
    Email(String),

    /// The webhook endpoint returned an error status or was unreachable
    #[error("webhook to {url} failed: {message}")]
    Webhook { url: String, message: String },

    /// The delivery process failed
    #[error("delivery process '{name}' failed: {message}")]
    Process { name: String, message: String },

    /// An attachment wrapper could not be resolved
    #[error("attachment '{0}' could not be resolved")]
    Attachment(String),
}

/// Errors governing the lifecycle of a single execution.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// No cached robot under that member id
    #[error("robot not found: {0}")]
    RobotNotFound(String),

    /// No execution record under that id
    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    /// The global queue is at capacity
    #[error("scheduler queue is full")]
    QueueFull,

    /// The robot's own queue cap is reached
    #[error("robot {0} queue is full")]
    RobotQueueFull(String),

    /// The pool is no longer accepting submissions
    #[error("scheduler is shutting down")]
    ShuttingDown,

    /// The execution was cancelled (stop, or deadline expiry)
    #[error("execution cancelled")]
    Cancelled,

    /// The execution exceeded its deadline
    #[error("execution timed out after {0} seconds")]
    Timeout(u64),

    /// A phase failed to produce its required output
    #[error("phase {phase} failed: {message}")]
    Phase { phase: Phase, message: String },

    /// Trigger validation failed
    #[error(transparent)]
    Trigger(#[from] TriggerError),

    /// Downstream agent failure, annotated by the call site
    #[error("agent failure in {site}: {source}")]
    Agent {
        site: String,
        #[source]
        source: AgentError,
    },

    /// Downstream store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ExecutionError {
    /// Wrap a phase failure.
    pub fn phase(phase: Phase, message: impl Into<String>) -> Self {
        Self::Phase {
            phase,
            message: message.into(),
        }
    }

    /// Whether this error should mark the execution `cancelled` rather
    /// than `failed`.
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        assert_eq!(ConfigError::MissingRole.to_string(), "identity.role is required");
        assert_eq!(
            ConfigError::InvalidPriority(12).to_string(),
            "invalid quota priority: 12, must be 1-10"
        );
    }

    #[test]
    fn test_trigger_error_display() {
        let err = TriggerError::Disabled {
            member_id: "r1".to_string(),
            trigger: "clock".to_string(),
        };
        assert_eq!(err.to_string(), "clock triggers are disabled for member r1");
    }

    #[test]
    fn test_store_error_transience() {
        assert!(StoreError::ConnectionFailed("refused".into()).is_transient());
        assert!(!StoreError::NotFound("x".into()).is_transient());
    }

    #[test]
    fn test_execution_error_cancellation() {
        assert!(ExecutionError::Cancelled.is_cancellation());
        assert!(ExecutionError::Timeout(1800).is_cancellation());
        assert!(!ExecutionError::QueueFull.is_cancellation());
    }

    #[test]
    fn test_phase_error_display() {
        let err = ExecutionError::phase(Phase::Tasks, "no tasks produced");
        assert_eq!(err.to_string(), "phase tasks failed: no tasks produced");
    }
}
