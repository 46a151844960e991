//! Agent runtime port - interface to the LLM backend.
//!
//! The core never defines prompt content; it only names agents. Default
//! phase agents are `__yao.{phase}`, overridable per robot through
//! `resources.phases`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::error::AgentError;

/// One message in an agent conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: String,
    pub content: String,
}

impl AgentMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Options for a single agent call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOptions {
    /// Reuse an existing conversation context. The first call of a
    /// multi-turn exchange leaves this unset; the runtime assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    /// Per-call deadline in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl CallOptions {
    pub fn in_context(context_id: impl Into<String>) -> Self {
        Self {
            context_id: Some(context_id.into()),
            timeout_secs: None,
        }
    }
}

/// An agent's reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub content: String,
    /// The conversation context this reply belongs to, when the runtime
    /// keeps one. Must be released through [`AgentRuntime::release`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

/// The LLM backend behind every phase and the semantic validator.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Send messages to the named agent and wait for its reply.
    async fn call(
        &self,
        agent_id: &str,
        messages: &[AgentMessage],
        options: &CallOptions,
    ) -> Result<AgentResponse, AgentError>;

    /// Release the resources held by a conversation context.
    async fn release(&self, context_id: &str) -> Result<(), AgentError>;
}
