use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use log::{debug, error, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::Monitor;

struct Control {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub(crate) struct Scheduler {
    control: Mutex<Option<Control>>,
}

impl Scheduler {
    fn control(&self) -> MutexGuard<'_, Option<Control>> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Monitor {
    /// Start polling every `interval`, first tick immediately. Returns false if already running.
    pub fn start(self: &Arc<Self>, interval: Duration) -> bool {
        let mut control = self.scheduler.control();
        if control
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
        {
            return false;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(poll_loop(Arc::clone(self), interval, stop_rx));
        *control = Some(Control { stop_tx, handle });
        info!("Monitoring started, polling every {:?}", interval);
        true
    }

    /// Stop the poll loop after any in-flight tick. Returns false if idle.
    pub fn stop(&self) -> bool {
        match self.scheduler.control().take() {
            Some(control) => {
                let _ = control.stop_tx.send(true);
                info!("Monitoring stopped");
                true
            }
            None => false,
        }
    }

    /// Stop and wait for the loop task to exit.
    pub async fn shutdown(&self) {
        let control = self.scheduler.control().take();
        if let Some(control) = control {
            let _ = control.stop_tx.send(true);
            if let Err(err) = control.handle.await {
                debug!("Poll loop ended abnormally: {err}");
            }
            info!("Monitoring stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler
            .control()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }
}

async fn poll_loop(monitor: Arc<Monitor>, period: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if AssertUnwindSafe(monitor.run_tick()).catch_unwind().await.is_err() {
                    error!("Poll tick panicked; continuing with the next tick");
                }
            }
        }
    }
    debug!("Poll loop exited");
}
