//! Clock matcher - decides which robots fire on a ticker tick.
//!
//! Clocks use a small restricted vocabulary (`times`, `interval`,
//! `daemon`), all evaluated in the robot's configured timezone at
//! minute granularity.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use chrono_tz::Tz;

use crate::domain::models::{ClockContext, ClockMode, Robot, TriggerType};

/// A positive match for one robot on one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockMatch {
    pub context: ClockContext,
    /// Window label for the dedup key (`HH:MM` for times mode)
    pub window_label: String,
}

/// Stateless clock matching over the restricted vocabulary.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClockMatcher;

impl ClockMatcher {
    /// Decide whether `robot` matches at `now`, returning the clock
    /// context when it does.
    ///
    /// Skips robots without a clock, with the clock trigger disabled, or
    /// not accepting work.
    pub async fn matches(robot: &Robot, now: DateTime<Utc>) -> Option<ClockMatch> {
        if !robot.status.accepts_work() || !robot.config.trigger_enabled(TriggerType::Clock) {
            return None;
        }
        let clock = robot.config.clock.as_ref()?;

        let tz_name = match &clock.mode {
            ClockMode::Times { timezone, .. } => {
                timezone.clone().unwrap_or_else(|| "UTC".to_string())
            }
            _ => "UTC".to_string(),
        };
        let tz: Tz = tz_name.parse().unwrap_or(chrono_tz::UTC);
        let local = now.with_timezone(&tz);

        let label = match &clock.mode {
            ClockMode::Times { times, days, .. } => {
                let hhmm = local.format("%H:%M").to_string();
                if !times.contains(&hhmm) || !weekday_allowed(&local, days) {
                    return None;
                }
                hhmm
            }
            ClockMode::Interval { every_secs } => {
                match robot.runtime.last_run().await {
                    None => {}
                    Some(last) => {
                        let elapsed = now.signed_duration_since(last);
                        if elapsed < ChronoDuration::seconds(i64::try_from(*every_secs).unwrap_or(i64::MAX)) {
                            return None;
                        }
                    }
                }
                "interval".to_string()
            }
            ClockMode::Daemon => {
                if robot.runtime.running_count().await > 0 {
                    return None;
                }
                "daemon".to_string()
            }
        };

        Some(ClockMatch {
            context: ClockContext::from_local(&local, tz_name),
            window_label: label,
        })
    }
}

/// Whether the local weekday is in the configured day set.
/// `["*"]` (or an empty set) allows every day; entries match on their
/// first three letters, case-insensitive ("mon", "Monday", "MON").
fn weekday_allowed<TzT: TimeZone>(local: &DateTime<TzT>, days: &[String]) -> bool {
    if days.is_empty() || days.iter().any(|d| d == "*") {
        return true;
    }
    let today = chrono::Datelike::weekday(local).to_string().to_lowercase();
    days.iter().any(|d| {
        let d = d.trim().to_lowercase();
        d.len() >= 3 && today.starts_with(&d[..3])
    })
}
