//! Validation rules and results.
//!
//! A rule is either a natural-language string or a structured assertion
//! with a tagged `type`. Strings are lowered to agent assertions at parse
//! time so the asserter only ever sees the structured sum.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The value kind accepted by the `type` assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Null,
}

impl ValueKind {
    /// Classify a JSON value.
    pub fn of(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(_) => Self::String,
            serde_json::Value::Number(_) => Self::Number,
            serde_json::Value::Bool(_) => Self::Boolean,
            serde_json::Value::Array(_) => Self::Array,
            serde_json::Value::Object(_) => Self::Object,
            serde_json::Value::Null => Self::Null,
        }
    }
}

/// A structured assertion over a task's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Assertion {
    /// Output equals the expected value (string or JSON compare)
    Equals { expected: serde_json::Value },
    /// Output contains the substring
    Contains { value: String },
    /// Output does not contain the substring
    NotContains { value: String },
    /// Extract by dotted path from JSON output, then compare
    JsonPath {
        path: String,
        expected: serde_json::Value,
    },
    /// Output matches the regular expression
    Regex { pattern: String },
    /// The JSON output is of this value kind
    Type { expected: ValueKind },
    /// Run the named script through the pluggable runner
    Script {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<serde_json::Value>,
    },
    /// Delegate the judgement to the semantic validator agent
    Agent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        instruction: Option<String>,
    },
}

/// A rule as written on a planned task: a bare string or an assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValidationRule {
    Text(String),
    Assert(Assertion),
}

impl ValidationRule {
    /// Lower to the structured sum. Natural-language strings become agent
    /// assertions carrying the string as the instruction.
    pub fn lowered(&self) -> Assertion {
        match self {
            Self::Text(s) => Assertion::Agent {
                instruction: Some(s.clone()),
            },
            Self::Assert(a) => a.clone(),
        }
    }
}

/// The validator's verdict on a task output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ValidationResult {
    pub passed: bool,
    /// Confidence in `[0, 1]`
    pub score: f64,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
    /// Is the expected outcome obtained
    #[serde(default)]
    pub complete: bool,
    /// Should the assistant be asked again
    #[serde(default)]
    pub need_reply: bool,
    /// Follow-up message body when `need_reply`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_content: Option<String>,
}

impl ValidationResult {
    /// A passing result with full confidence.
    pub fn passing() -> Self {
        Self {
            passed: true,
            score: 1.0,
            complete: true,
            ..Self::default()
        }
    }

    /// A failing result carrying one issue.
    pub fn failing(issue: impl Into<String>) -> Self {
        Self {
            passed: false,
            score: 0.0,
            issues: vec![issue.into()],
            complete: false,
            ..Self::default()
        }
    }

    /// Enforce the control-field invariant: a complete, passing result
    /// never asks for another turn. Also clamps the score into `[0, 1]`.
    pub fn normalized(mut self) -> Self {
        self.score = self.score.clamp(0.0, 1.0);
        if self.complete && self.passed {
            self.need_reply = false;
            self.reply_content = None;
        }
        self
    }
}
