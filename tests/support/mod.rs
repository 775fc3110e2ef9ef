#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture};

use petition_monitor::fetch::{FetchResult, ProgressSource, RawSnapshot};
use petition_monitor::goal::GoalOverride;
use petition_monitor::model::{HistoryRow, NewHistoryRow, Snapshot};
use petition_monitor::monitor::{DeliveryError, Monitor};
use petition_monitor::records::{HistoryStore, MemoryHistoryStore};
use petition_monitor::{AppError, Result};

/// Upstream stand-in replaying a fixed script of responses.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<FetchResult<RawSnapshot>>>,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    pub fn counts(goal: u64, counts: &[u64]) -> Arc<Self> {
        let source = Self::default();
        for &count in counts {
            source.push(count, goal);
        }
        Arc::new(source)
    }

    pub fn push(&self, signature_count: u64, goal: u64) {
        self.script.lock().unwrap().push_back(Ok(RawSnapshot {
            signature_count,
            goal,
        }));
    }

    pub fn push_failure(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(AppError::upstream(message)));
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ProgressSource for ScriptedSource {
    fn fetch(&self) -> BoxFuture<'_, FetchResult<RawSnapshot>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::upstream("script exhausted")));
        Box::pin(future::ready(next))
    }
}

/// Store whose every operation fails.
pub struct BrokenStore;

impl HistoryStore for BrokenStore {
    fn insert(&self, _row: NewHistoryRow) -> BoxFuture<'_, Result<HistoryRow>> {
        Box::pin(future::ready(Err(AppError::storage("disk on fire"))))
    }

    fn query(&self, _since: Option<DateTime<Utc>>) -> BoxFuture<'_, Result<Vec<HistoryRow>>> {
        Box::pin(future::ready(Err(AppError::storage("disk on fire"))))
    }
}

/// Store whose inserts take far longer than any sane timeout.
pub struct StalledStore;

impl HistoryStore for StalledStore {
    fn insert(&self, row: NewHistoryRow) -> BoxFuture<'_, Result<HistoryRow>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(row.stamped(Utc::now()))
        })
    }

    fn query(&self, _since: Option<DateTime<Utc>>) -> BoxFuture<'_, Result<Vec<HistoryRow>>> {
        Box::pin(future::ready(Ok(Vec::new())))
    }
}

pub fn monitor_with(
    source: Arc<ScriptedSource>,
    store: Arc<dyn HistoryStore>,
    goal: Option<u64>,
) -> Arc<Monitor> {
    Arc::new(Monitor::new(source, store, GoalOverride::new(goal)))
}

pub fn memory_monitor(
    source: Arc<ScriptedSource>,
    goal: Option<u64>,
) -> (Arc<Monitor>, MemoryHistoryStore) {
    let store = MemoryHistoryStore::new();
    let monitor = monitor_with(source, Arc::new(store.clone()), goal);
    (monitor, store)
}

/// Subscriber recording everything it receives.
pub fn recorder() -> (
    Arc<Mutex<Vec<Snapshot>>>,
    impl Fn(&Snapshot) -> std::result::Result<(), DeliveryError> + Send + Sync + 'static,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |snapshot: &Snapshot| {
        sink.lock().unwrap().push(*snapshot);
        Ok(())
    })
}
