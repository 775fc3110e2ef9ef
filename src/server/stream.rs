//! Long-lived NDJSON stream of snapshot updates.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::Stream;
use log::{debug, info};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::model::Snapshot;
use crate::monitor::{ChannelSubscriber, Monitor, Subscription};
use crate::utils::current_epoch_millis;

use super::AppState;

pub const CONTENT_TYPE: &str = "application/x-ndjson";

/// One line on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StreamMessage {
    Update { data: Snapshot, timestamp: i64 },
    Heartbeat {
        #[serde(rename = "type")]
        kind: &'static str,
        timestamp: i64,
    },
}

impl StreamMessage {
    pub fn heartbeat() -> Self {
        StreamMessage::Heartbeat {
            kind: "heartbeat",
            timestamp: current_epoch_millis(),
        }
    }

    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

impl From<Snapshot> for StreamMessage {
    fn from(data: Snapshot) -> Self {
        StreamMessage::Update {
            data,
            timestamp: current_epoch_millis(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Per-viewer bookkeeping: counter, subscription and lifecycle state.
pub struct Connection {
    monitor: Arc<Monitor>,
    subscription: Option<Subscription>,
    state: ConnectionState,
}

impl Connection {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self {
            monitor,
            subscription: None,
            state: ConnectionState::Connecting,
        }
    }

    /// Register with the monitor; the cached snapshot is queued right away.
    pub fn open(&mut self, buffer: usize) -> mpsc::Receiver<StreamMessage> {
        let (subscriber, rx) = ChannelSubscriber::<StreamMessage>::channel(buffer);
        if self.state != ConnectionState::Connecting {
            return rx;
        }

        let active = self.monitor.connection_opened();
        self.subscription = Some(self.monitor.subscribe(subscriber));
        self.state = ConnectionState::Open;
        info!("Stream connected ({active} active)");
        rx
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Tear down once; later calls do nothing.
    pub fn close(&mut self) {
        let was_open = match self.state {
            ConnectionState::Closed => return,
            ConnectionState::Open => true,
            ConnectionState::Connecting => false,
        };
        self.state = ConnectionState::Closed;

        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        if was_open {
            let active = self.monitor.connection_closed();
            info!("Stream disconnected ({active} active)");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Snapshot updates merged with heartbeats. Ends when the subscriber is evicted.
pub struct EventStream {
    rx: mpsc::Receiver<StreamMessage>,
    heartbeat: Interval,
    connection: Connection,
}

impl EventStream {
    pub fn new(connection: Connection, rx: mpsc::Receiver<StreamMessage>, every: Duration) -> Self {
        let every = every.max(Duration::from_millis(1));
        let mut heartbeat = time::interval_at(Instant::now() + every, every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            rx,
            heartbeat,
            connection,
        }
    }

    pub fn connect(monitor: Arc<Monitor>, buffer: usize, every: Duration) -> Self {
        let mut connection = Connection::new(monitor);
        let rx = connection.open(buffer);
        Self::new(connection, rx, every)
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn encode(message: &StreamMessage) -> io::Result<String> {
        message
            .to_line()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

impl Stream for EventStream {
    type Item = io::Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.connection.state() == ConnectionState::Closed {
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(message)) => return Poll::Ready(Some(Self::encode(&message))),
            Poll::Ready(None) => {
                debug!("Stream subscriber dropped by monitor");
                this.connection.close();
                return Poll::Ready(None);
            }
            Poll::Pending => {}
        }

        if this.heartbeat.poll_tick(cx).is_ready() {
            debug!("Stream heartbeat");
            return Poll::Ready(Some(Self::encode(&StreamMessage::heartbeat())));
        }
        Poll::Pending
    }
}

pub async fn stream(State(state): State<AppState>) -> Response {
    let events = EventStream::connect(
        Arc::clone(&state.monitor),
        state.stream_buffer,
        state.heartbeat,
    );

    (
        [
            (header::CONTENT_TYPE, CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(events),
    )
        .into_response()
}
