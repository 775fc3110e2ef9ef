//! Subscriber set. A failing or panicking subscriber is evicted alone.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::{debug, warn};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::model::Snapshot;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("subscriber channel is closed")]
    Closed,
    #[error("subscriber is not keeping up")]
    Lagging,
    #[error("subscriber panicked")]
    Panicked,
    #[error("{0}")]
    Rejected(String),
}

/// `deliver` runs on the notifying task and must not call back into the monitor.
pub trait Subscriber: Send + Sync {
    fn deliver(&self, snapshot: &Snapshot) -> Result<(), DeliveryError>;
}

impl<F> Subscriber for F
where
    F: Fn(&Snapshot) -> Result<(), DeliveryError> + Send + Sync,
{
    fn deliver(&self, snapshot: &Snapshot) -> Result<(), DeliveryError> {
        self(snapshot)
    }
}

/// Forwards snapshots into a bounded channel; a full queue evicts it.
pub struct ChannelSubscriber<T> {
    tx: mpsc::Sender<T>,
}

impl<T> ChannelSubscriber<T> {
    pub fn new(tx: mpsc::Sender<T>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

impl<T> Subscriber for ChannelSubscriber<T>
where
    T: From<Snapshot> + Send,
{
    fn deliver(&self, snapshot: &Snapshot) -> Result<(), DeliveryError> {
        self.tx
            .try_send(T::from(*snapshot))
            .map_err(|err| match err {
                TrySendError::Full(_) => DeliveryError::Lagging,
                TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }
}

type SubscriberId = u64;

struct Slot {
    subscriber: Box<dyn Subscriber>,
    /// Held for the duration of each delivery; `false` once unsubscribed.
    open: Mutex<bool>,
}

enum Dispatch {
    Delivered,
    Skipped,
    Failed(DeliveryError),
}

impl Slot {
    fn new(subscriber: Box<dyn Subscriber>) -> Self {
        Self {
            subscriber,
            open: Mutex::new(true),
        }
    }

    fn dispatch(&self, snapshot: &Snapshot) -> Dispatch {
        let mut open = lock(&self.open);
        if !*open {
            return Dispatch::Skipped;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.subscriber.deliver(snapshot)))
            .unwrap_or(Err(DeliveryError::Panicked));

        match outcome {
            Ok(()) => Dispatch::Delivered,
            Err(err) => {
                *open = false;
                Dispatch::Failed(err)
            }
        }
    }

    /// Waits for an in-flight delivery to finish, then refuses further ones.
    fn close(&self) {
        *lock(&self.open) = false;
    }
}

struct Registry {
    slots: Mutex<HashMap<SubscriberId, Arc<Slot>>>,
    next_id: AtomicU64,
}

impl Registry {
    fn remove(&self, id: SubscriberId) -> bool {
        let slot = lock(&self.slots).remove(&id);
        match slot {
            Some(slot) => {
                slot.close();
                true
            }
            None => false,
        }
    }
}

pub struct SubscriberSet {
    registry: Arc<Registry>,
}

impl Default for SubscriberSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                slots: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// A subscriber that fails its `initial` delivery is never registered.
    pub fn subscribe(
        &self,
        subscriber: Box<dyn Subscriber>,
        initial: Option<&Snapshot>,
    ) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(Slot::new(subscriber));

        if let Some(snapshot) = initial {
            if let Dispatch::Failed(err) = slot.dispatch(snapshot) {
                warn!("Subscriber {id} rejected the current snapshot: {err}");
                return Subscription::detached(id);
            }
        }

        lock(&self.registry.slots).insert(id, slot);
        debug!("Subscriber {id} registered");

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn notify(&self, snapshot: &Snapshot) -> usize {
        let targets: Vec<(SubscriberId, Arc<Slot>)> = lock(&self.registry.slots)
            .iter()
            .map(|(id, slot)| (*id, Arc::clone(slot)))
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();

        for (id, slot) in targets {
            match slot.dispatch(snapshot) {
                Dispatch::Delivered => delivered += 1,
                Dispatch::Skipped => {}
                Dispatch::Failed(err) => {
                    warn!("Dropping subscriber {id}: {err}");
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut slots = lock(&self.registry.slots);
            for id in failed {
                slots.remove(&id);
            }
        }

        delivered
    }

    /// Drop every subscriber at once; their handles become inactive.
    pub fn clear(&self) -> usize {
        let slots: Vec<Arc<Slot>> = lock(&self.registry.slots)
            .drain()
            .map(|(_, slot)| slot)
            .collect();
        for slot in &slots {
            slot.close();
        }
        slots.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.registry.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Membership handle returned by `subscribe`. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: SubscriberId,
    registry: Weak<Registry>,
}

impl Subscription {
    fn detached(id: SubscriberId) -> Self {
        Self {
            id,
            registry: Weak::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| lock(&registry.slots).contains_key(&self.id))
            .unwrap_or(false)
    }

    /// Remove the subscriber. Safe to call repeatedly.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(self.id) {
                debug!("Subscriber {} unsubscribed", self.id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting() -> (Arc<AtomicUsize>, Box<dyn Subscriber>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let subscriber = move |_: &Snapshot| -> Result<(), DeliveryError> {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        (hits, Box::new(subscriber))
    }

    fn failing(calls: Arc<AtomicUsize>) -> Box<dyn Subscriber> {
        Box::new(move |_: &Snapshot| -> Result<(), DeliveryError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DeliveryError::Rejected("boom".into()))
        })
    }

    #[test]
    fn notify_without_subscribers_is_noop() {
        let set = SubscriberSet::new();
        assert_eq!(set.notify(&Snapshot::new(1, 10)), 0);
    }

    #[test]
    fn delivers_to_every_subscriber() {
        let set = SubscriberSet::new();
        let (a, sub_a) = counting();
        let (b, sub_b) = counting();
        let _ha = set.subscribe(sub_a, None);
        let _hb = set.subscribe(sub_b, None);

        assert_eq!(set.notify(&Snapshot::new(5, 10)), 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_joiner_receives_initial_snapshot() {
        let set = SubscriberSet::new();
        let (hits, sub) = counting();
        let _handle = set.subscribe(sub, Some(&Snapshot::new(3, 10)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_subscriber_is_evicted_once() {
        let set = SubscriberSet::new();
        let bad_calls = Arc::new(AtomicUsize::new(0));
        let (good, sub) = counting();
        let bad = set.subscribe(failing(Arc::clone(&bad_calls)), None);
        let _good = set.subscribe(sub, None);

        for count in 0..3 {
            set.notify(&Snapshot::new(count, 10));
        }

        assert_eq!(bad_calls.load(Ordering::SeqCst), 1);
        assert_eq!(good.load(Ordering::SeqCst), 3);
        assert!(!bad.is_active());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn panicking_subscriber_is_isolated() {
        let set = SubscriberSet::new();
        let (good, sub) = counting();
        let _bad = set.subscribe(
            Box::new(|_: &Snapshot| -> Result<(), DeliveryError> { panic!("viewer bug") }),
            None,
        );
        let _good = set.subscribe(sub, None);

        set.notify(&Snapshot::new(1, 10));
        set.notify(&Snapshot::new(2, 10));

        assert_eq!(good.load(Ordering::SeqCst), 2);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn failed_initial_delivery_is_not_registered() {
        let set = SubscriberSet::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = set.subscribe(failing(Arc::clone(&calls)), Some(&Snapshot::new(1, 10)));

        assert!(!handle.is_active());
        set.notify(&Snapshot::new(2, 10));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_final() {
        let set = SubscriberSet::new();
        let (hits, sub) = counting();
        let handle = set.subscribe(sub, None);

        handle.unsubscribe();
        handle.unsubscribe();
        set.notify(&Snapshot::new(1, 10));

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(set.is_empty());
    }

    #[test]
    fn dropping_handle_unsubscribes() {
        let set = SubscriberSet::new();
        let (hits, sub) = counting();
        drop(set.subscribe(sub, None));

        set.notify(&Snapshot::new(1, 10));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn channel_subscriber_reports_lag_and_close() {
        let (subscriber, mut rx) = ChannelSubscriber::<Snapshot>::channel(1);
        assert_eq!(subscriber.deliver(&Snapshot::new(1, 10)), Ok(()));
        assert_eq!(
            subscriber.deliver(&Snapshot::new(2, 10)),
            Err(DeliveryError::Lagging)
        );
        assert_eq!(rx.try_recv().unwrap(), Snapshot::new(1, 10));

        drop(rx);
        assert_eq!(
            subscriber.deliver(&Snapshot::new(3, 10)),
            Err(DeliveryError::Closed)
        );
    }

    #[test]
    fn unsubscribe_during_notify_blocks_until_delivery_ends() {
        use std::sync::Barrier;
        use std::thread;
        use std::time::Duration;

        let set = Arc::new(SubscriberSet::new());
        let entered = Arc::new(Barrier::new(2));
        let hits = Arc::new(AtomicUsize::new(0));

        let gate = Arc::clone(&entered);
        let seen = Arc::clone(&hits);
        let handle = set.subscribe(
            Box::new(move |_: &Snapshot| -> Result<(), DeliveryError> {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    gate.wait();
                    thread::sleep(Duration::from_millis(50));
                }
                Ok(())
            }),
            None,
        );

        let notifier = {
            let set = Arc::clone(&set);
            thread::spawn(move || set.notify(&Snapshot::new(1, 10)))
        };

        entered.wait();
        handle.unsubscribe();
        // Delivery had already started, so it completes; nothing after it does.
        assert_eq!(notifier.join().unwrap(), 1);
        set.notify(&Snapshot::new(2, 10));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
