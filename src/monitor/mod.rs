//! Process-wide live-data monitor. Only the poll tick writes the live state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::{Config, DEFAULT_STORAGE_TIMEOUT};
use crate::error::Result;
use crate::fetch::{ProgressSource, UpstreamClient};
use crate::goal::GoalOverride;
use crate::model::Snapshot;
use crate::records::{open_store, HistoryStore};

pub mod detector;
pub mod scheduler;
pub mod subscribers;

pub use detector::{detect_change, PollOutcome};
pub use subscribers::{ChannelSubscriber, DeliveryError, Subscriber, SubscriberSet, Subscription};

use scheduler::Scheduler;

#[derive(Debug, Default)]
pub(crate) struct LiveState {
    cached: Option<Snapshot>,
    last_signature_count: Option<u64>,
}

pub struct Monitor {
    source: Arc<dyn ProgressSource>,
    store: Arc<dyn HistoryStore>,
    goal: GoalOverride,
    storage_timeout: Duration,
    live: Mutex<LiveState>,
    subscribers: SubscriberSet,
    /// Serialises ticks so at most one poll is ever in flight.
    tick_lock: tokio::sync::Mutex<()>,
    scheduler: Scheduler,
    connections: AtomicUsize,
}

impl Monitor {
    pub fn new(
        source: Arc<dyn ProgressSource>,
        store: Arc<dyn HistoryStore>,
        goal: GoalOverride,
    ) -> Self {
        Self {
            source,
            store,
            goal,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
            live: Mutex::new(LiveState::default()),
            subscribers: SubscriberSet::new(),
            tick_lock: tokio::sync::Mutex::new(()),
            scheduler: Scheduler::default(),
            connections: AtomicUsize::new(0),
        }
    }

    /// Upper bound on a single history insert before the tick moves on.
    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let source = UpstreamClient::from_config(&config.upstream)?;
        let store = open_store(&config.storage)?;
        Ok(Self::new(
            Arc::new(source),
            store,
            GoalOverride::new(config.goal_override),
        )
        .with_storage_timeout(config.monitor.storage_timeout))
    }

    pub fn store(&self) -> Arc<dyn HistoryStore> {
        Arc::clone(&self.store)
    }

    pub fn goal_override(&self) -> GoalOverride {
        self.goal
    }

    /// The goal-overridden snapshot from the last successful poll.
    pub fn current(&self) -> Option<Snapshot> {
        self.live().cached
    }

    pub fn last_signature_count(&self) -> Option<u64> {
        self.live().last_signature_count
    }

    /// Registers under the live lock, so a racing tick's snapshot arrives
    /// exactly once: as the initial value or via notify.
    pub fn subscribe<S>(&self, subscriber: S) -> Subscription
    where
        S: Subscriber + 'static,
    {
        let live = self.live();
        self.subscribers
            .subscribe(Box::new(subscriber), live.cached.as_ref())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Evict every subscriber so open streams end.
    pub fn disconnect_all(&self) -> usize {
        self.subscribers.clear()
    }

    pub fn connection_opened(&self) -> usize {
        self.connections.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn connection_closed(&self) -> usize {
        self.connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .map(|previous| previous.saturating_sub(1))
            .unwrap_or_default()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub(crate) fn live(&self) -> MutexGuard<'_, LiveState> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
