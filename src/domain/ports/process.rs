//! Process port - the registry of named callables.
//!
//! Processes are looked up by string name in a registry; the registry is
//! the single extension point for host-provided behavior (the task
//! runner's `process` executor and the delivery center's process channel
//! both go through it).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::error::ProcessError;

/// A callable registered under a name. Takes a typed argument vector,
/// returns a typed result.
pub type ProcessHandler =
    Arc<dyn Fn(&[serde_json::Value]) -> Result<serde_json::Value, ProcessError> + Send + Sync>;

/// Invoke a named process.
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    async fn call(
        &self,
        name: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value, ProcessError>;
}

/// The default in-process registry.
#[derive(Default)]
pub struct ProcessRegistry {
    handlers: RwLock<HashMap<String, ProcessHandler>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a name, replacing any previous one.
    pub async fn register<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&[serde_json::Value]) -> Result<serde_json::Value, ProcessError>
            + Send
            + Sync
            + 'static,
    {
        self.handlers
            .write()
            .await
            .insert(name.into(), Arc::new(handler));
    }

    /// Names of all registered processes, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ProcessExecutor for ProcessRegistry {
    async fn call(
        &self,
        name: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value, ProcessError> {
        let handler = self
            .handlers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ProcessError::NotFound(name.to_string()))?;
        handler(args)
    }
}
