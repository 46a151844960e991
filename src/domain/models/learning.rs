//! Learning entries written to a robot's private knowledge collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What kind of learning an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningKind {
    /// Distilled from a completed execution
    Execution,
    /// Derived from human feedback
    Feedback,
    /// A standalone insight worth keeping
    Insight,
}

impl LearningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Execution => "execution",
            Self::Feedback => "feedback",
            Self::Insight => "insight",
        }
    }
}

/// One entry appended to the robot's private collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEntry {
    pub kind: LearningKind,
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl LearningEntry {
    pub fn new(kind: LearningKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }
}

/// Name of a robot's private knowledge collection.
pub fn private_collection(team_id: &str, member_id: &str) -> String {
    format!("robot_{team_id}_{member_id}_kb")
}
