//! HTTP surface: live stream, stats, history, current snapshot and health.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{FixedOffset, Offset, Utc};
use serde_json::json;
use thiserror::Error;

use crate::config::{Config, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_STREAM_BUFFER};
use crate::monitor::Monitor;

pub mod handlers;
pub mod stream;

pub use stream::{Connection, ConnectionState, EventStream, StreamMessage};

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub heartbeat: Duration,
    pub stream_buffer: usize,
    pub timezone: FixedOffset,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self {
            monitor,
            heartbeat: DEFAULT_HEARTBEAT_INTERVAL,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            timezone: Utc.fix(),
        }
    }

    pub fn from_config(monitor: Arc<Monitor>, config: &Config) -> Self {
        Self {
            monitor,
            heartbeat: config.monitor.heartbeat_interval,
            stream_buffer: config.monitor.stream_buffer,
            timezone: config.stats.timezone(),
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/stream", get(stream::stream))
        .route("/api/stats", get(handlers::stats))
        .route("/api/history", get(handlers::history))
        .route("/api/current", get(handlers::current))
        .route("/healthz", get(handlers::health))
        .with_state(state)
}

/// Failures surfaced to HTTP clients as `{"error": message}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
