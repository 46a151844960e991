//! Trigger domain model.
//!
//! A trigger is the cause of an execution: a clock tick that matched the
//! robot's schedule, a human intervention, or an external event.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// The cause of an execution. Wire-stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Fired by the internal clock ticker
    Clock,
    /// Submitted by a human intervention
    Human,
    /// Submitted by an external event
    Event,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clock => "clock",
            Self::Human => "human",
            Self::Event => "event",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "clock" => Some(Self::Clock),
            "human" => Some(Self::Human),
            "event" => Some(Self::Event),
            _ => None,
        }
    }

    /// Scheduling weight of this trigger type. Human interventions beat
    /// events, events beat clock firings.
    pub const fn weight(&self) -> u32 {
        match self {
            Self::Human => 10,
            Self::Event => 5,
            Self::Clock => 1,
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a human intervention asks the robot to do. Wire-stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterventionAction {
    #[serde(rename = "task.add")]
    TaskAdd,
    #[serde(rename = "task.cancel")]
    TaskCancel,
    #[serde(rename = "task.update")]
    TaskUpdate,
    #[serde(rename = "goal.add")]
    GoalAdd,
    #[serde(rename = "goal.adjust")]
    GoalAdjust,
    #[serde(rename = "goal.complete")]
    GoalComplete,
    #[serde(rename = "goal.cancel")]
    GoalCancel,
    #[serde(rename = "plan.add")]
    PlanAdd,
    #[serde(rename = "plan.remove")]
    PlanRemove,
    #[serde(rename = "plan.update")]
    PlanUpdate,
    #[serde(rename = "instruct")]
    Instruct,
}

impl InterventionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskAdd => "task.add",
            Self::TaskCancel => "task.cancel",
            Self::TaskUpdate => "task.update",
            Self::GoalAdd => "goal.add",
            Self::GoalAdjust => "goal.adjust",
            Self::GoalComplete => "goal.complete",
            Self::GoalCancel => "goal.cancel",
            Self::PlanAdd => "plan.add",
            Self::PlanRemove => "plan.remove",
            Self::PlanUpdate => "plan.update",
            Self::Instruct => "instruct",
        }
    }
}

/// Where an intervention-created task lands relative to existing work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertPosition {
    First,
    Last,
    /// Right after the currently-running task. Degrades to `First` when
    /// nothing is running.
    Next,
    /// At an explicit index carried alongside in the request
    At,
}

/// How the phase executor runs an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorMode {
    #[serde(rename = "standard")]
    Standard,
    #[serde(rename = "dryrun")]
    DryRun,
    /// Reserved; currently served by the DryRun runner
    #[serde(rename = "sandbox")]
    Sandbox,
}

impl Default for ExecutorMode {
    fn default() -> Self {
        Self::Standard
    }
}

impl ExecutorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::DryRun => "dryrun",
            Self::Sandbox => "sandbox",
        }
    }
}

/// A single input message carried by an intervention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerMessage {
    pub role: String,
    pub content: String,
}

impl TriggerMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A human intervention request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionRequest {
    pub action: InterventionAction,
    pub messages: Vec<TriggerMessage>,
    /// Defer the work until this instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_at: Option<InsertPosition>,
    /// Explicit index, meaningful with `InsertPosition::At`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_mode: Option<ExecutorMode>,
}

/// An external event submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRequest {
    pub source: String,
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_mode: Option<ExecutorMode>,
}

/// Calendar context handed to the inspiration phase of clock executions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockContext {
    pub now: DateTime<Utc>,
    pub hour: u32,
    pub weekday: String,
    pub day_of_month: u32,
    pub is_weekend: bool,
    pub is_month_start: bool,
    pub is_month_end: bool,
    pub is_quarter_end: bool,
    pub is_year_end: bool,
    pub timezone: String,
}

impl ClockContext {
    /// Build the context from a local wall-clock instant.
    pub fn from_local<Tz: TimeZone>(local: &DateTime<Tz>, timezone: impl Into<String>) -> Self {
        let weekday = local.weekday();
        let day = local.day();
        let month = local.month();
        let last_day = days_in_month(local.year(), month);
        let is_month_end = day == last_day;
        Self {
            now: local.with_timezone(&Utc),
            hour: local.hour(),
            weekday: weekday.to_string(),
            day_of_month: day,
            is_weekend: matches!(weekday, chrono::Weekday::Sat | chrono::Weekday::Sun),
            is_month_start: day == 1,
            is_month_end,
            is_quarter_end: is_month_end && matches!(month, 3 | 6 | 9 | 12),
            is_year_end: month == 12 && day == 31,
            timezone: timezone.into(),
        }
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_y, next_m) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    chrono::NaiveDate::from_ymd_opt(next_y, next_m, 1)
        .and_then(|d| d.pred_opt())
        .map_or(31, |d| d.day())
}

/// The validated input carried by an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum TriggerInput {
    Clock(ClockContext),
    Human(InterventionRequest),
    Event(EventRequest),
}

impl TriggerInput {
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            Self::Clock(_) => TriggerType::Clock,
            Self::Human(_) => TriggerType::Human,
            Self::Event(_) => TriggerType::Event,
        }
    }

    /// Per-submission executor-mode override, when the caller asked for one.
    pub fn executor_mode(&self) -> Option<ExecutorMode> {
        match self {
            Self::Clock(_) => None,
            Self::Human(req) => req.executor_mode,
            Self::Event(req) => req.executor_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use chrono_tz::Tz;

    #[test]
    fn test_trigger_weights() {
        assert!(TriggerType::Human.weight() > TriggerType::Event.weight());
        assert!(TriggerType::Event.weight() > TriggerType::Clock.weight());
    }

    #[test]
    fn test_intervention_action_wire_names() {
        let json = serde_json::to_string(&InterventionAction::TaskAdd).unwrap();
        assert_eq!(json, "\"task.add\"");
        let back: InterventionAction = serde_json::from_str("\"goal.adjust\"").unwrap();
        assert_eq!(back, InterventionAction::GoalAdjust);
    }

    #[test]
    fn test_executor_mode_wire_names() {
        assert_eq!(serde_json::to_string(&ExecutorMode::DryRun).unwrap(), "\"dryrun\"");
        let back: ExecutorMode = serde_json::from_str("\"sandbox\"").unwrap();
        assert_eq!(back, ExecutorMode::Sandbox);
    }

    fn local(tz: Tz, y: i32, m: u32, d: u32, h: u32, min: u32) -> chrono::DateTime<Tz> {
        tz.from_local_datetime(
            &NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_clock_context_calendar_flags() {
        let tz: Tz = "Asia/Shanghai".parse().unwrap();

        // Monday 2024-09-30 is a quarter end and a month end, not year end
        let ctx = ClockContext::from_local(&local(tz, 2024, 9, 30, 9, 0), "Asia/Shanghai");
        assert_eq!(ctx.weekday, "Mon");
        assert!(ctx.is_month_end);
        assert!(ctx.is_quarter_end);
        assert!(!ctx.is_year_end);
        assert!(!ctx.is_weekend);

        // December 31st is all three
        let ctx = ClockContext::from_local(&local(tz, 2024, 12, 31, 23, 59), "Asia/Shanghai");
        assert!(ctx.is_month_end && ctx.is_quarter_end && ctx.is_year_end);

        // First of the month, a Saturday
        let ctx = ClockContext::from_local(&local(tz, 2024, 6, 1, 0, 0), "Asia/Shanghai");
        assert!(ctx.is_month_start);
        assert!(ctx.is_weekend);

        // Leap-year February end
        let ctx = ClockContext::from_local(&local(tz, 2024, 2, 29, 12, 0), "Asia/Shanghai");
        assert!(ctx.is_month_end);
        assert!(!ctx.is_quarter_end);
    }

    #[test]
    fn test_trigger_input_round_trip() {
        let input = TriggerInput::Event(EventRequest {
            source: "webhook".to_string(),
            event_type: "lead.created".to_string(),
            data: serde_json::json!({"name": "John", "email": "j@x.com"}),
            executor_mode: None,
        });
        let json = serde_json::to_string(&input).unwrap();
        let back: TriggerInput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, input);
        assert_eq!(back.trigger_type(), TriggerType::Event);
    }
}
