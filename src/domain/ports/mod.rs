//! Ports - interfaces to external collaborators.
//!
//! The core talks to every store, backend, and outbound surface through
//! these traits; adapters live in [`crate::infrastructure`] or in the
//! host application.

pub mod agent;
pub mod attachment;
pub mod execution_store;
pub mod knowledge;
pub mod mcp;
pub mod member_store;
pub mod messenger;
pub mod process;
pub mod script;

pub use agent::{AgentMessage, AgentResponse, AgentRuntime, CallOptions};
pub use attachment::{AttachmentInfo, AttachmentService};
pub use execution_store::ExecutionStore;
pub use knowledge::{KnowledgeBase, NullKnowledgeBase};
pub use mcp::McpExecutor;
pub use member_store::MemberStore;
pub use messenger::{EmailAttachment, Messenger, OutboundEmail};
pub use process::{ProcessExecutor, ProcessHandler, ProcessRegistry};
pub use script::ScriptRunner;
