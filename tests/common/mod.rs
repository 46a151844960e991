//! Shared fixtures and mock collaborators for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use cohort::domain::error::{AgentError, DeliveryError, McpError, StoreError};
use cohort::domain::models::{LearningEntry, MemberRecord};
use cohort::domain::ports::{
    AgentMessage, AgentResponse, AgentRuntime, AttachmentInfo, AttachmentService, CallOptions,
    ExecutionStore, KnowledgeBase, McpExecutor, Messenger, OutboundEmail, ProcessRegistry,
};
use cohort::infrastructure::config::CoreConfig;
use cohort::infrastructure::memory::{MemoryExecutionStore, MemoryMemberStore};
use cohort::services::{Collaborators, CoreSystem};

/// A member record for an active autonomous robot.
pub fn robot_record(member_id: &str, team_id: &str, config: serde_json::Value) -> MemberRecord {
    MemberRecord {
        member_id: member_id.to_string(),
        team_id: team_id.to_string(),
        member_type: "robot".to_string(),
        status: "active".to_string(),
        autonomous_mode: true,
        display_name: format!("Robot {member_id}"),
        system_prompt: None,
        robot_email: Some(format!("{member_id}@team.example")),
        robot_config: config,
    }
}

/// Scripted agent runtime: per-agent reply queues with an optional
/// per-agent delay. When a queue runs dry the last reply repeats.
pub struct ScriptedAgents {
    replies: Mutex<HashMap<String, Vec<String>>>,
    delays: HashMap<String, Duration>,
    pub calls: AtomicUsize,
    pub releases: AtomicUsize,
    concurrent: Mutex<(usize, usize)>,
}

impl ScriptedAgents {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            delays: HashMap::new(),
            calls: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            concurrent: Mutex::new((0, 0)),
        }
    }

    pub fn reply(mut self, agent_id: &str, content: &str) -> Self {
        self.replies
            .get_mut()
            .entry(agent_id.to_string())
            .or_default()
            .push(content.to_string());
        self
    }

    pub fn delay(mut self, agent_id: &str, delay: Duration) -> Self {
        self.delays.insert(agent_id.to_string(), delay);
        self
    }

    /// Highest number of simultaneous in-flight calls observed.
    pub async fn peak_concurrency(&self) -> usize {
        self.concurrent.lock().await.1
    }
}

impl Default for ScriptedAgents {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentRuntime for ScriptedAgents {
    async fn call(
        &self,
        agent_id: &str,
        _messages: &[AgentMessage],
        _options: &CallOptions,
    ) -> Result<AgentResponse, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut concurrent = self.concurrent.lock().await;
            concurrent.0 += 1;
            concurrent.1 = concurrent.1.max(concurrent.0);
        }
        if let Some(delay) = self.delays.get(agent_id) {
            tokio::time::sleep(*delay).await;
        }

        let content = {
            let mut replies = self.replies.lock().await;
            match replies.get_mut(agent_id) {
                Some(queue) if queue.len() > 1 => queue.remove(0),
                Some(queue) if queue.len() == 1 => queue[0].clone(),
                _ => format!("scripted reply from {agent_id}"),
            }
        };
        self.concurrent.lock().await.0 -= 1;
        Ok(AgentResponse {
            content,
            context_id: Some(format!("ctx-{agent_id}")),
        })
    }

    async fn release(&self, _context_id: &str) -> Result<(), AgentError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Messenger that records every send.
#[derive(Default)]
pub struct RecordingMessenger {
    pub sent: Mutex<Vec<(String, OutboundEmail)>>,
    pub fail_to: Option<String>,
}

impl RecordingMessenger {
    pub fn failing_for(to: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_to: Some(to.to_string()),
        }
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, channel: &str, message: OutboundEmail) -> Result<(), DeliveryError> {
        if self.fail_to.as_deref() == Some(message.to.as_str()) {
            return Err(DeliveryError::Email("mailbox unavailable".to_string()));
        }
        self.sent.lock().await.push((channel.to_string(), message));
        Ok(())
    }
}

/// Attachment service over a static map.
#[derive(Default)]
pub struct StaticAttachments {
    pub files: HashMap<String, (String, Vec<u8>)>,
}

impl StaticAttachments {
    pub fn with_file(mut self, file_id: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.files
            .insert(file_id.to_string(), (content_type.to_string(), bytes.to_vec()));
        self
    }
}

#[async_trait]
impl AttachmentService for StaticAttachments {
    async fn read(&self, file_id: &str) -> Result<Vec<u8>, DeliveryError> {
        self.files
            .get(file_id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| DeliveryError::Attachment(file_id.to_string()))
    }

    async fn info(&self, file_id: &str) -> Result<AttachmentInfo, DeliveryError> {
        self.files
            .get(file_id)
            .map(|(content_type, _)| AttachmentInfo {
                content_type: content_type.clone(),
                filename: Some(file_id.to_string()),
            })
            .ok_or_else(|| DeliveryError::Attachment(file_id.to_string()))
    }
}

/// Knowledge base over a hash map.
#[derive(Default)]
pub struct MemoryKnowledge {
    pub collections: Mutex<HashMap<String, Vec<LearningEntry>>>,
}

#[async_trait]
impl KnowledgeBase for MemoryKnowledge {
    async fn create_collection(&self, name: &str) -> Result<(), StoreError> {
        self.collections
            .lock()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn insert(&self, collection: &str, entry: &LearningEntry) -> Result<(), StoreError> {
        self.collections
            .lock()
            .await
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound(collection.to_string()))?
            .push(entry.clone());
        Ok(())
    }

    async fn search(
        &self,
        collections: &[String],
        _query: &str,
        k: usize,
    ) -> Result<Vec<LearningEntry>, StoreError> {
        let store = self.collections.lock().await;
        Ok(collections
            .iter()
            .filter_map(|c| store.get(c))
            .flatten()
            .take(k)
            .cloned()
            .collect())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
        self.collections.lock().await.remove(name);
        Ok(())
    }

    async fn prune(&self, _collection: &str, _older_than_days: u32) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// MCP executor echoing the call.
pub struct EchoMcp;

#[async_trait]
impl McpExecutor for EchoMcp {
    async fn invoke(
        &self,
        server: &str,
        tool: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        Ok(serde_json::json!({"server": server, "tool": tool, "args": args}))
    }
}

/// Everything a test harness needs to drive a [`CoreSystem`].
pub struct Harness {
    pub system: CoreSystem,
    pub agents: Arc<ScriptedAgents>,
    pub executions: Arc<MemoryExecutionStore>,
    pub members: Arc<MemoryMemberStore>,
    pub messenger: Arc<RecordingMessenger>,
    pub knowledge: Arc<MemoryKnowledge>,
    pub processes: Arc<ProcessRegistry>,
}

impl Harness {
    pub async fn new(records: Vec<MemberRecord>, agents: ScriptedAgents) -> Self {
        Self::with_config(records, agents, CoreConfig::default()).await
    }

    pub async fn with_config(
        records: Vec<MemberRecord>,
        agents: ScriptedAgents,
        config: CoreConfig,
    ) -> Self {
        let agents = Arc::new(agents);
        let executions = Arc::new(MemoryExecutionStore::new());
        let members = Arc::new(MemoryMemberStore::new(records));
        let messenger = Arc::new(RecordingMessenger::default());
        let knowledge = Arc::new(MemoryKnowledge::default());
        let processes = Arc::new(ProcessRegistry::new());

        let system = CoreSystem::new(
            Collaborators {
                members: Arc::clone(&members) as _,
                executions: Arc::clone(&executions) as _,
                agents: Arc::clone(&agents) as _,
                mcp: Arc::new(EchoMcp),
                processes: Arc::clone(&processes) as _,
                messenger: Arc::clone(&messenger) as _,
                attachments: Arc::new(StaticAttachments::default()),
                knowledge: Arc::clone(&knowledge) as _,
                script_runner: None,
                executor_catalog: vec!["assistant".to_string(), "process".to_string()],
                semantic_dedup: false,
            },
            config,
        );

        Self {
            system,
            agents,
            executions,
            members,
            messenger,
            knowledge,
            processes,
        }
    }

    /// Wait until the execution reaches a terminal status.
    pub async fn await_terminal(&self, execution_id: &str) -> cohort::domain::models::Execution {
        for _ in 0..200 {
            if let Some(execution) = self.executions.get(execution_id).await.unwrap() {
                if execution.status.is_terminal() {
                    return execution;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("execution {execution_id} did not reach a terminal status");
    }
}
