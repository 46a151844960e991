//! MCP executor port.

use async_trait::async_trait;

use crate::domain::error::McpError;

/// A single tool invocation on a named MCP server.
#[async_trait]
pub trait McpExecutor: Send + Sync {
    async fn invoke(
        &self,
        server: &str,
        tool: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, McpError>;
}
