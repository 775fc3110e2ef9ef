use chrono::{DateTime, Utc};
use std::time::Duration;

/// Milliseconds since the Unix epoch, as used on the wire.
pub fn epoch_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub fn current_epoch_millis() -> i64 {
    epoch_millis(Utc::now())
}

/// `chrono::Duration` from a std duration, saturating instead of failing.
pub fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::max_value())
}
