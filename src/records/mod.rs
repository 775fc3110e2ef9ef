use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use log::info;

use crate::config::StorageConfig;
use crate::error::{AppError, Result};
use crate::model::{HistoryRow, NewHistoryRow};

pub mod csv_store;
pub mod memory;

pub use csv_store::CsvHistoryStore;
pub use memory::MemoryHistoryStore;

/// Append-only store of detected count changes, queried oldest first.
pub trait HistoryStore: Send + Sync {
    fn insert(&self, row: NewHistoryRow) -> BoxFuture<'_, Result<HistoryRow>>;

    fn query(&self, since: Option<DateTime<Utc>>) -> BoxFuture<'_, Result<Vec<HistoryRow>>>;

    fn latest(&self) -> BoxFuture<'_, Result<Option<HistoryRow>>> {
        Box::pin(async move { self.query(None).await.map(|mut rows| rows.pop()) })
    }
}

/// Used when no storage is configured; queries report `StorageUnavailable`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledStore;

impl HistoryStore for DisabledStore {
    fn insert(&self, _row: NewHistoryRow) -> BoxFuture<'_, Result<HistoryRow>> {
        Box::pin(async { Err(AppError::StorageUnavailable) })
    }

    fn query(&self, _since: Option<DateTime<Utc>>) -> BoxFuture<'_, Result<Vec<HistoryRow>>> {
        Box::pin(async { Err(AppError::StorageUnavailable) })
    }
}

/// Open the store described by the config, or the disabled stand-in.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn HistoryStore>> {
    match &config.path {
        Some(path) => {
            let store = CsvHistoryStore::open(path)?;
            info!("Persisting history to {}", path.display());
            Ok(Arc::new(store))
        }
        None => {
            info!("No storage configured; history persistence is disabled");
            Ok(Arc::new(DisabledStore))
        }
    }
}

/// Keep rows at or after `since`, preserving order.
pub(crate) fn rows_since(rows: &[HistoryRow], since: Option<DateTime<Utc>>) -> Vec<HistoryRow> {
    match since {
        Some(since) => rows
            .iter()
            .filter(|row| row.timestamp >= since)
            .cloned()
            .collect(),
        None => rows.to_vec(),
    }
}
