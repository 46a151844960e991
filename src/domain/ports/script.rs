//! Script runner port for the `script` validation operator.

use async_trait::async_trait;

/// Runs a named validation script against a task output.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Returns whether the script judged the output acceptable.
    async fn run(
        &self,
        name: &str,
        output: &str,
        args: Option<&serde_json::Value>,
    ) -> anyhow::Result<bool>;
}
