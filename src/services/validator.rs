//! Two-layer task validation.
//!
//! The rule layer is a pure asserter over the structured operators
//! (equals, contains, not_contains, json_path, regex, type) plus the
//! pluggable script runner. Agent assertions and natural-language rules
//! go to the semantic layer: a validator agent that scores the output
//! and decides whether the conversation must continue. The validator is
//! the sole authority on task completion.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::models::{RunConfig, TaskSpec, ValidationResult, Assertion, ValueKind};
use crate::domain::ports::{AgentMessage, AgentRuntime, CallOptions, ScriptRunner};

/// Default semantic validator agent.
pub const DEFAULT_VALIDATOR_AGENT: &str = "__yao.validator";

/// Outcome of one structured rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub passed: bool,
    pub issue: Option<String>,
}

impl RuleOutcome {
    fn pass() -> Self {
        Self {
            passed: true,
            issue: None,
        }
    }

    fn fail(issue: impl Into<String>) -> Self {
        Self {
            passed: false,
            issue: Some(issue.into()),
        }
    }
}

/// Evaluate one pure assertion against a task output.
///
/// Returns `None` for `script` and `agent` assertions; those are not
/// pure and are dispatched by the [`Validator`].
pub fn assert_rule(assertion: &Assertion, output: &str) -> Option<RuleOutcome> {
    let outcome = match assertion {
        Assertion::Equals { expected } => {
            let matches = match expected {
                serde_json::Value::String(s) => output == s,
                other => serde_json::from_str::<serde_json::Value>(output)
                    .map(|v| &v == other)
                    .unwrap_or(false),
            };
            if matches {
                RuleOutcome::pass()
            } else {
                RuleOutcome::fail(format!("output does not equal {expected}"))
            }
        }
        Assertion::Contains { value } => {
            if output.contains(value.as_str()) {
                RuleOutcome::pass()
            } else {
                RuleOutcome::fail(format!("output does not contain '{value}'"))
            }
        }
        Assertion::NotContains { value } => {
            if output.contains(value.as_str()) {
                RuleOutcome::fail(format!("output must not contain '{value}'"))
            } else {
                RuleOutcome::pass()
            }
        }
        Assertion::JsonPath { path, expected } => match extract_json(output) {
            Some(value) => match walk_path(&value, path) {
                Some(found) if &found == expected => RuleOutcome::pass(),
                Some(found) => {
                    RuleOutcome::fail(format!("{path} is {found}, expected {expected}"))
                }
                None => RuleOutcome::fail(format!("path '{path}' not found in output")),
            },
            None => RuleOutcome::fail("output is not JSON"),
        },
        Assertion::Regex { pattern } => match regex::Regex::new(pattern) {
            Ok(re) => {
                if re.is_match(output) {
                    RuleOutcome::pass()
                } else {
                    RuleOutcome::fail(format!("output does not match /{pattern}/"))
                }
            }
            Err(e) => RuleOutcome::fail(format!("invalid pattern /{pattern}/: {e}")),
        },
        Assertion::Type { expected } => match extract_json(output) {
            Some(value) if ValueKind::of(&value) == *expected => RuleOutcome::pass(),
            Some(value) => RuleOutcome::fail(format!(
                "output is {:?}, expected {:?}",
                ValueKind::of(&value),
                expected
            )),
            None if *expected == ValueKind::String => RuleOutcome::pass(),
            None => RuleOutcome::fail(format!("output is plain text, expected {expected:?}")),
        },
        Assertion::Script { .. } | Assertion::Agent { .. } => return None,
    };
    Some(outcome)
}

/// Extract a JSON value from agent output: direct parse first, then the
/// outermost braced region (agents often wrap JSON in prose or fences).
pub fn extract_json(output: &str) -> Option<serde_json::Value> {
    let trimmed = output.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    let start = trimmed.find(['{', '['])?;
    let end = trimmed.rfind(['}', ']'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

/// Walk a dotted path through a JSON value. Numeric segments index
/// arrays.
fn walk_path(value: &serde_json::Value, path: &str) -> Option<serde_json::Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            serde_json::Value::Object(map) => map.get(segment)?,
            serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

/// The semantic verdict shape returned by the validator agent.
#[derive(Debug, Deserialize)]
struct SemanticVerdict {
    #[serde(default)]
    passed: bool,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    details: std::collections::BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    complete: bool,
    #[serde(default)]
    need_reply: bool,
    #[serde(default)]
    reply_content: Option<String>,
}

/// The two-layer validator.
pub struct Validator {
    agents: Arc<dyn AgentRuntime>,
    agent_id: String,
    script_runner: Option<Arc<dyn ScriptRunner>>,
}

impl Validator {
    pub fn new(agents: Arc<dyn AgentRuntime>) -> Self {
        Self {
            agents,
            agent_id: DEFAULT_VALIDATOR_AGENT.to_string(),
            script_runner: None,
        }
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    pub fn with_script_runner(mut self, runner: Arc<dyn ScriptRunner>) -> Self {
        self.script_runner = Some(runner);
        self
    }

    /// Validate a task output.
    ///
    /// Structured rules run first; agent rules, natural-language rules,
    /// an `expected_output`, or a silent rule layer pull in the semantic
    /// layer. When the rule layer was silent, the semantic score must
    /// reach `run.validation_threshold` for a pass.
    pub async fn validate(
        &self,
        task: &TaskSpec,
        output: &str,
        run: &RunConfig,
    ) -> ValidationResult {
        let mut issues = Vec::new();
        let mut rules_passed = true;
        let mut structural_rules = 0usize;
        let mut agent_instructions = Vec::new();

        for rule in &task.validation_rules {
            match rule.lowered() {
                Assertion::Agent { instruction } => {
                    if let Some(text) = instruction {
                        agent_instructions.push(text);
                    }
                }
                Assertion::Script { name, args } => {
                    structural_rules += 1;
                    match &self.script_runner {
                        Some(runner) => match runner.run(&name, output, args.as_ref()).await {
                            Ok(true) => {}
                            Ok(false) => {
                                rules_passed = false;
                                issues.push(format!("script '{name}' rejected the output"));
                            }
                            Err(e) => {
                                rules_passed = false;
                                issues.push(format!("script '{name}' failed: {e}"));
                            }
                        },
                        None => {
                            rules_passed = false;
                            issues.push(format!("script '{name}' has no configured runner"));
                        }
                    }
                }
                pure => {
                    structural_rules += 1;
                    if let Some(outcome) = assert_rule(&pure, output) {
                        if !outcome.passed {
                            rules_passed = false;
                            if let Some(issue) = outcome.issue {
                                issues.push(issue);
                            }
                        }
                    }
                }
            }
        }

        let rule_layer_silent = structural_rules == 0;
        let needs_semantic = !agent_instructions.is_empty()
            || task.expected_output.is_some()
            || rule_layer_silent;

        if !needs_semantic {
            return ValidationResult {
                passed: rules_passed,
                score: if rules_passed { 1.0 } else { 0.0 },
                issues,
                complete: true,
                ..ValidationResult::default()
            }
            .normalized();
        }

        match self.semantic(task, output, &agent_instructions).await {
            Ok(verdict) => {
                let semantic_passed = if rule_layer_silent {
                    verdict.passed && verdict.score >= run.validation_threshold
                } else {
                    verdict.passed
                };
                let mut all_issues = issues;
                all_issues.extend(verdict.issues);
                ValidationResult {
                    passed: rules_passed && semantic_passed,
                    score: verdict.score,
                    issues: all_issues,
                    suggestions: verdict.suggestions,
                    details: verdict.details,
                    complete: verdict.complete,
                    need_reply: verdict.need_reply,
                    reply_content: verdict.reply_content,
                }
                .normalized()
            }
            Err(reason) => {
                warn!(task_id = %task.task_id, reason = %reason, "Semantic validation unavailable");
                let mut all_issues = issues;
                all_issues.push(reason);
                ValidationResult {
                    passed: false,
                    score: 0.0,
                    issues: all_issues,
                    complete: false,
                    ..ValidationResult::default()
                }
                .normalized()
            }
        }
    }

    async fn semantic(
        &self,
        task: &TaskSpec,
        output: &str,
        instructions: &[String],
    ) -> Result<SemanticVerdict, String> {
        let mut prompt = String::new();
        if let Some(description) = &task.description {
            prompt.push_str(&format!("Task:\n{description}\n\n"));
        }
        if let Some(expected) = &task.expected_output {
            prompt.push_str(&format!("Expected output:\n{expected}\n\n"));
        }
        if !instructions.is_empty() {
            prompt.push_str(&format!("Checks:\n- {}\n\n", instructions.join("\n- ")));
        }
        prompt.push_str(&format!(
            "Actual output:\n{output}\n\nReply with JSON: {{\"passed\", \"score\", \"issues\", \
             \"suggestions\", \"details\", \"complete\", \"need_reply\", \"reply_content\"}}."
        ));

        let messages = [AgentMessage::user(prompt)];
        let response = self
            .agents
            .call(&self.agent_id, &messages, &CallOptions::default())
            .await
            .map_err(|e| format!("validator agent failed: {e}"))?;

        let value = extract_json(&response.content)
            .ok_or_else(|| "validator agent returned no JSON".to_string())?;
        let verdict: SemanticVerdict = serde_json::from_value(value)
            .map_err(|e| format!("validator verdict malformed: {e}"))?;
        debug!(
            task_id = %task.task_id,
            passed = verdict.passed,
            score = verdict.score,
            need_reply = verdict.need_reply,
            "Semantic verdict"
        );
        Ok(verdict)
    }
}
