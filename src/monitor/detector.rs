use log::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::model::{count_delta, NewHistoryRow, Snapshot};

use super::Monitor;

/// What a single poll observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Initial(Snapshot),
    Changed {
        previous: u64,
        snapshot: Snapshot,
        change: i64,
    },
    Unchanged(Snapshot),
}

impl PollOutcome {
    pub fn snapshot(&self) -> Snapshot {
        match self {
            PollOutcome::Initial(snapshot)
            | PollOutcome::Unchanged(snapshot)
            | PollOutcome::Changed { snapshot, .. } => *snapshot,
        }
    }
}

/// Delta to record for `current`, or `None` when nothing moved.
pub fn detect_change(previous: Option<u64>, current: u64) -> Option<i64> {
    match previous {
        None => Some(0),
        Some(previous) if previous == current => None,
        Some(previous) => Some(count_delta(previous, current)),
    }
}

impl Monitor {
    /// Errors only for fetch/decode failures; storage trouble is just logged.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let _tick = self.tick_lock.lock().await;

        let raw = self.source.fetch().await?;
        let snapshot = self.goal.apply(raw);

        let previous = self.live().last_signature_count;
        let Some(change) = detect_change(previous, snapshot.signature_count) else {
            self.live().cached = Some(snapshot);
            debug!("Signature count unchanged at {}", snapshot.signature_count);
            return Ok(PollOutcome::Unchanged(snapshot));
        };

        self.persist(NewHistoryRow {
            signature_count: snapshot.signature_count,
            goal: snapshot.goal,
            change_amount: change,
        })
        .await;

        let delivered = self.publish(snapshot);

        let outcome = match previous {
            None => PollOutcome::Initial(snapshot),
            Some(previous) => PollOutcome::Changed {
                previous,
                snapshot,
                change,
            },
        };
        info!(
            "Signature count {} ({:+}), notified {} subscriber(s)",
            snapshot.signature_count, change, delivered
        );
        Ok(outcome)
    }

    /// Poll and log the result; failures never escape a scheduled tick.
    pub(crate) async fn run_tick(&self) {
        if let Err(err) = self.poll_once().await {
            warn!("Poll failed: {err}");
        }
    }

    async fn persist(&self, row: NewHistoryRow) {
        match tokio::time::timeout(self.storage_timeout, self.store.insert(row)).await {
            Ok(Ok(stored)) => debug!(
                "Persisted change {} at {}",
                stored.change_amount, stored.timestamp
            ),
            Ok(Err(AppError::StorageUnavailable)) => {
                debug!("Storage disabled; change not persisted")
            }
            Ok(Err(err)) => warn!("Failed to persist change: {err}"),
            Err(_) => warn!(
                "Persisting change timed out after {:?}",
                self.storage_timeout
            ),
        }
    }

    /// Update the live state and fan out while it is still locked.
    fn publish(&self, snapshot: Snapshot) -> usize {
        let mut live = self.live();
        live.cached = Some(snapshot);
        live.last_signature_count = Some(snapshot.signature_count);
        self.subscribers.notify(&snapshot)
    }
}
