use std::time::Duration;

use chrono::{DateTime, FixedOffset, Timelike, Utc};

use crate::model::HistoryRow;
use crate::utils::chrono_duration;

pub const SECOND_WINDOW: Duration = Duration::from_secs(30);
pub const MINUTE_WINDOW: Duration = Duration::from_secs(5 * 60);
pub const HOUR_WINDOW: Duration = Duration::from_secs(60 * 60);
pub const DAY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Rows whose timestamp lies in `[now - window, now]`.
fn in_window<'a>(
    rows: &'a [HistoryRow],
    now: DateTime<Utc>,
    window: Duration,
) -> impl Iterator<Item = &'a HistoryRow> + 'a {
    let start = now - chrono_duration(window);
    rows.iter()
        .filter(move |row| row.timestamp >= start && row.timestamp <= now)
}

/// New signatures per second over the trailing `window`.
///
/// The divisor is the span covered by data, clamped to `[1s, window]`.
pub fn window_rate(rows: &[HistoryRow], now: DateTime<Utc>, window: Duration) -> f64 {
    let mut earliest: Option<DateTime<Utc>> = None;
    let mut added = 0u64;
    for row in in_window(rows, now, window) {
        earliest = Some(earliest.map_or(row.timestamp, |seen| seen.min(row.timestamp)));
        added += row.positive_change();
    }

    let Some(earliest) = earliest else {
        return 0.0;
    };

    let covered = (now - earliest).num_milliseconds() as f64 / 1000.0;
    let span = covered.min(window.as_secs_f64()).max(1.0);
    added as f64 / span
}

/// Positive changes over the trailing 24 hours.
pub fn total_today(rows: &[HistoryRow], now: DateTime<Utc>) -> u64 {
    in_window(rows, now, DAY_WINDOW)
        .map(HistoryRow::positive_change)
        .sum()
}

/// Busiest hour of day in `tz` over the last 24 hours; ties go to the lowest.
pub fn peak_hour(rows: &[HistoryRow], now: DateTime<Utc>, tz: &FixedOffset) -> Option<u32> {
    let mut buckets = [0u64; 24];
    for row in in_window(rows, now, DAY_WINDOW) {
        let hour = row.timestamp.with_timezone(tz).hour() as usize;
        buckets[hour] += row.positive_change();
    }

    let mut best: Option<(u32, u64)> = None;
    for (hour, &sum) in buckets.iter().enumerate() {
        if sum > 0 && best.map_or(true, |(_, top)| sum > top) {
            best = Some((hour as u32, sum));
        }
    }
    best.map(|(hour, _)| hour)
}
