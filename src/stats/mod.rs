//! Derived statistics; pure functions of the rows, live snapshot and `now`.

use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Serialize, Serializer};

use crate::model::{count_delta, HistoryRow, Snapshot};

pub mod window;

pub use window::{
    peak_hour, total_today, window_rate, DAY_WINDOW, HOUR_WINDOW, MINUTE_WINDOW, SECOND_WINDOW,
};

/// Each rate is measured over its own window (30s, 5min, 1h, 24h).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rates {
    pub per_second: f64,
    pub per_minute: f64,
    pub per_hour: f64,
    pub per_day: f64,
}

impl Rates {
    pub fn from_history(rows: &[HistoryRow], now: DateTime<Utc>) -> Self {
        Self {
            per_second: window_rate(rows, now, SECOND_WINDOW),
            per_minute: window_rate(rows, now, MINUTE_WINDOW) * 60.0,
            per_hour: window_rate(rows, now, HOUR_WINDOW) * 3_600.0,
            per_day: window_rate(rows, now, DAY_WINDOW) * 86_400.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActivityLevel {
    High,
    Medium,
    Low,
    Minimal,
}

impl ActivityLevel {
    pub fn classify(rates: &Rates) -> Self {
        if rates.per_second > 0.1 {
            ActivityLevel::High
        } else if rates.per_minute > 1.0 {
            ActivityLevel::Medium
        } else if rates.per_hour > 10.0 {
            ActivityLevel::Low
        } else {
            ActivityLevel::Minimal
        }
    }
}

/// Estimated time until the goal is met. Serialised as display text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeToGoal {
    Reached,
    NoRecentActivity,
    Eta { seconds: f64 },
}

impl TimeToGoal {
    pub fn estimate(remaining: i64, rates: &Rates) -> Self {
        if remaining <= 0 {
            return TimeToGoal::Reached;
        }

        let per_second = if rates.per_second > 0.1 {
            rates.per_second
        } else if rates.per_minute > 0.1 {
            rates.per_minute / 60.0
        } else if rates.per_hour > 0.1 {
            rates.per_hour / 3_600.0
        } else if rates.per_day > 0.0 {
            rates.per_day / 86_400.0
        } else {
            return TimeToGoal::NoRecentActivity;
        };

        TimeToGoal::Eta {
            seconds: remaining as f64 / per_second,
        }
    }
}

impl fmt::Display for TimeToGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TimeToGoal::Reached => f.write_str("goal reached"),
            TimeToGoal::NoRecentActivity => f.write_str("no recent activity"),
            TimeToGoal::Eta { seconds } => {
                let (value, unit) = if seconds < 60.0 {
                    (seconds, "second")
                } else if seconds < 3_600.0 {
                    (seconds / 60.0, "minute")
                } else if seconds < 86_400.0 {
                    (seconds / 3_600.0, "hour")
                } else {
                    (seconds / 86_400.0, "day")
                };
                let value = value.round().max(1.0) as u64;
                let plural = if value == 1 { "" } else { "s" };
                write!(f, "{value} {unit}{plural}")
            }
        }
    }
}

impl Serialize for TimeToGoal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub sec_rate: f64,
    pub min_rate: f64,
    pub hourly_rate: u64,
    pub daily_rate: u64,
    /// Formatted as `HH:00` in the reference timezone.
    pub peak_hour: Option<String>,
    pub total_today: u64,
    pub time_to_goal: TimeToGoal,
    pub activity_level: ActivityLevel,
    pub current_signatures: u64,
    pub goal: u64,
}

/// Larger of the last persisted count and the live count.
pub fn resolve_current_count(rows: &[HistoryRow], live: Option<&Snapshot>) -> u64 {
    let persisted = rows.last().map(|row| row.signature_count);
    let live = live.map(|snapshot| snapshot.signature_count);
    persisted.max(live).unwrap_or(0)
}

pub fn compute(
    rows: &[HistoryRow],
    live: Option<&Snapshot>,
    goal: u64,
    now: DateTime<Utc>,
    tz: &FixedOffset,
) -> Stats {
    let rates = Rates::from_history(rows, now);
    let current = resolve_current_count(rows, live);
    let remaining = count_delta(current, goal);

    Stats {
        sec_rate: round_to(rates.per_second, 2),
        min_rate: round_to(rates.per_minute, 1),
        hourly_rate: rates.per_hour.round() as u64,
        daily_rate: rates.per_day.round() as u64,
        peak_hour: peak_hour(rows, now, tz).map(|hour| format!("{hour:02}:00")),
        total_today: total_today(rows, now),
        time_to_goal: TimeToGoal::estimate(remaining, &rates),
        activity_level: ActivityLevel::classify(&rates),
        current_signatures: current,
        goal,
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
