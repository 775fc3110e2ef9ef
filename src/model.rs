//! Records shared by the poller, the history store and the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub signature_count: u64,
    pub goal: u64,
}

impl Snapshot {
    pub fn new(signature_count: u64, goal: u64) -> Self {
        Self {
            signature_count,
            goal,
        }
    }
}

/// Largest count accepted from upstream; deltas between counts fit in `i64`.
pub const MAX_COUNT: u64 = i64::MAX as u64;

/// `to - from`, saturated to the `i64` range.
pub fn count_delta(from: u64, to: u64) -> i64 {
    let delta = i128::from(to) - i128::from(from);
    delta.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// One persisted change of the signature count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRow {
    pub timestamp: DateTime<Utc>,
    pub signature_count: u64,
    pub goal: u64,
    /// May be zero or negative when upstream corrects itself.
    pub change_amount: i64,
}

impl HistoryRow {
    pub fn positive_change(&self) -> u64 {
        self.change_amount.max(0) as u64
    }
}

/// Insert payload for the history store; the store stamps the time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewHistoryRow {
    pub signature_count: u64,
    pub goal: u64,
    pub change_amount: i64,
}

impl NewHistoryRow {
    pub fn stamped(self, timestamp: DateTime<Utc>) -> HistoryRow {
        HistoryRow {
            timestamp,
            signature_count: self.signature_count,
            goal: self.goal,
            change_amount: self.change_amount,
        }
    }
}
