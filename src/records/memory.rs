use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture};

use crate::error::{AppError, Result};
use crate::model::{HistoryRow, NewHistoryRow};

use super::{rows_since, HistoryStore};

/// Volatile history, shared by clones. Used by tests and short-lived runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    rows: Arc<Mutex<Vec<HistoryRow>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with pre-stamped rows; they are kept in timestamp order.
    pub fn with_rows(mut rows: Vec<HistoryRow>) -> Self {
        rows.sort_by_key(|row| row.timestamp);
        Self {
            rows: Arc::new(Mutex::new(rows)),
        }
    }

    pub fn rows(&self) -> Vec<HistoryRow> {
        self.rows
            .lock()
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MemoryHistoryStore {
    fn append(&self, row: NewHistoryRow) -> Result<HistoryRow> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| AppError::storage("history lock poisoned"))?;
        // Keep timestamps non-decreasing even if the wall clock steps back.
        let now = Utc::now();
        let timestamp = rows
            .last()
            .map(|last| last.timestamp.max(now))
            .unwrap_or(now);
        let stored = row.stamped(timestamp);
        rows.push(stored.clone());
        Ok(stored)
    }

    fn select(&self, since: Option<DateTime<Utc>>) -> Result<Vec<HistoryRow>> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| AppError::storage("history lock poisoned"))?;
        Ok(rows_since(&rows, since))
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn insert(&self, row: NewHistoryRow) -> BoxFuture<'_, Result<HistoryRow>> {
        Box::pin(future::ready(self.append(row)))
    }

    fn query(&self, since: Option<DateTime<Utc>>) -> BoxFuture<'_, Result<Vec<HistoryRow>>> {
        Box::pin(future::ready(self.select(since)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn insert_then_query_in_order() {
        let store = MemoryHistoryStore::new();
        for (count, change) in [(100, 0), (105, 5), (103, -2)] {
            store
                .insert(NewHistoryRow {
                    signature_count: count,
                    goal: 1000,
                    change_amount: change,
                })
                .await
                .unwrap();
        }

        let rows = store.query(None).await.unwrap();
        let counts: Vec<u64> = rows.iter().map(|row| row.signature_count).collect();
        assert_eq!(counts, vec![100, 105, 103]);
        assert!(rows.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(store.latest().await.unwrap().unwrap().signature_count, 103);
    }

    #[tokio::test]
    async fn query_filters_by_lower_bound() {
        let now = Utc::now();
        let row = |minutes: i64, count: u64| HistoryRow {
            timestamp: now - Duration::minutes(minutes),
            signature_count: count,
            goal: 1000,
            change_amount: 1,
        };
        let store = MemoryHistoryStore::with_rows(vec![row(5, 3), row(90, 1), row(30, 2)]);

        let recent = store
            .query(Some(now - Duration::hours(1)))
            .await
            .unwrap();
        let counts: Vec<u64> = recent.iter().map(|row| row.signature_count).collect();
        assert_eq!(counts, vec![2, 3]);
    }
}
