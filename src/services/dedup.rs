//! Deduplication - fast time-window layer plus a semantic hook.
//!
//! The window layer keeps a bounded map from
//! `member_id:trigger:window_label` to an expiry instant. The semantic
//! layer asks an agent whether new work duplicates recent work; it is
//! fail-open so an unreachable agent never starves a robot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::models::TriggerType;
use crate::domain::ports::{AgentMessage, AgentRuntime, CallOptions};

/// What the dedup layer decided about a prospective submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    /// A duplicate; do not submit
    Skip,
    /// Fold into existing work (semantic layer only)
    Merge,
    /// Not a duplicate
    Proceed,
}

/// Default capacity of the window map.
pub const DEFAULT_WINDOW_CAPACITY: usize = 4096;

/// The fast time-window layer.
pub struct WindowDedup {
    capacity: usize,
    marks: Mutex<HashMap<String, Instant>>,
}

impl WindowDedup {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            marks: Mutex::new(HashMap::new()),
        }
    }

    fn key(member_id: &str, trigger: TriggerType, window_label: &str) -> String {
        format!("{member_id}:{}:{window_label}", trigger.as_str())
    }

    /// Check for a live mark. Expired entries are purged as a side
    /// effect.
    pub async fn check(
        &self,
        member_id: &str,
        trigger: TriggerType,
        window_label: &str,
    ) -> DedupDecision {
        let key = Self::key(member_id, trigger, window_label);
        let mut marks = self.marks.lock().await;
        let now = Instant::now();
        marks.retain(|_, expiry| *expiry > now);
        if marks.contains_key(&key) {
            DedupDecision::Skip
        } else {
            DedupDecision::Proceed
        }
    }

    /// Record a mark expiring after `window`.
    pub async fn mark(
        &self,
        member_id: &str,
        trigger: TriggerType,
        window_label: &str,
        window: Duration,
    ) {
        let key = Self::key(member_id, trigger, window_label);
        let mut marks = self.marks.lock().await;
        let now = Instant::now();
        marks.retain(|_, expiry| *expiry > now);

        // Bounded: when full after purging, drop the entry closest to
        // expiry to make room.
        if marks.len() >= self.capacity && !marks.contains_key(&key) {
            if let Some(oldest) = marks
                .iter()
                .min_by_key(|(_, expiry)| **expiry)
                .map(|(k, _)| k.clone())
            {
                marks.remove(&oldest);
            }
        }
        marks.insert(key, now + window);
    }

    /// Number of live marks.
    pub async fn len(&self) -> usize {
        let mut marks = self.marks.lock().await;
        let now = Instant::now();
        marks.retain(|_, expiry| *expiry > now);
        marks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for WindowDedup {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

/// Default agent consulted by the semantic layer.
pub const DEFAULT_DEDUP_AGENT: &str = "__yao.dedup";

/// Default deadline for a semantic check.
pub const DEFAULT_SEMANTIC_TIMEOUT: Duration = Duration::from_secs(10);

/// The semantic layer: asks an agent whether new goals or tasks repeat
/// recent ones.
pub struct SemanticDedup {
    agents: Arc<dyn AgentRuntime>,
    agent_id: String,
    timeout: Duration,
}

impl SemanticDedup {
    pub fn new(agents: Arc<dyn AgentRuntime>) -> Self {
        Self {
            agents,
            agent_id: DEFAULT_DEDUP_AGENT.to_string(),
            timeout: DEFAULT_SEMANTIC_TIMEOUT,
        }
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask the agent to judge `candidate` against a compact history.
    /// Timeouts and failures proceed (fail-open).
    pub async fn evaluate(&self, candidate: &str, history: &[String]) -> DedupDecision {
        let prompt = format!(
            "Recent work:\n{}\n\nCandidate:\n{candidate}\n\nAnswer with one word: skip, merge, or proceed.",
            history.join("\n"),
        );
        let messages = [AgentMessage::user(prompt)];

        let call_options = CallOptions::default();
        let call = self.agents.call(&self.agent_id, &messages, &call_options);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => {
                let verdict = response.content.trim().to_lowercase();
                let decision = if verdict.starts_with("skip") {
                    DedupDecision::Skip
                } else if verdict.starts_with("merge") {
                    DedupDecision::Merge
                } else {
                    DedupDecision::Proceed
                };
                debug!(agent = %self.agent_id, ?decision, "Semantic dedup verdict");
                decision
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Semantic dedup failed, proceeding");
                DedupDecision::Proceed
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Semantic dedup timed out, proceeding");
                DedupDecision::Proceed
            }
        }
    }
}
