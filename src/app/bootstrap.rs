use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use tokio::net::TcpListener;

use crate::config::Config;
use crate::error::{AppError, Context, Result};
use crate::fetch::UpstreamClient;
use crate::goal::GoalOverride;
use crate::model::Snapshot;
use crate::monitor::Monitor;
use crate::records::open_store;
use crate::server::{router, AppState};
use crate::stats::{self, Stats};

/// Run the monitor and HTTP server until Ctrl-C.
pub async fn run_server(config: Config) -> Result<()> {
    let monitor = Arc::new(Monitor::from_config(&config)?);
    monitor.start(config.monitor.poll_interval);

    let state = AppState::from_config(Arc::clone(&monitor), &config);
    let listener = TcpListener::bind(config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&monitor)))
        .await
        .context("HTTP server failed")?;

    monitor.shutdown().await;
    Ok(())
}

async fn shutdown_signal(monitor: Arc<Monitor>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
    monitor.shutdown().await;
    let dropped = monitor.disconnect_all();
    if dropped > 0 {
        info!("Closed {dropped} stream subscriber(s)");
    }
}

/// Fetch the upstream once and apply the goal override.
pub async fn check_once(config: &Config) -> Result<Snapshot> {
    let client = UpstreamClient::from_config(&config.upstream)?;
    info!("Fetching {}", client.url());
    let raw = client.fetch_progress().await?;
    Ok(GoalOverride::new(config.goal_override).apply(raw))
}

/// Stats computed from persisted history alone.
pub async fn report_stats(config: &Config) -> Result<Stats> {
    let store = open_store(&config.storage)?;
    let rows = GoalOverride::new(config.goal_override).apply_rows(store.query(None).await?);
    let goal = rows
        .last()
        .map(|row| row.goal)
        .ok_or_else(|| AppError::message("history is empty; run the monitor first"))?;

    Ok(stats::compute(
        &rows,
        None,
        goal,
        Utc::now(),
        &config.stats.timezone(),
    ))
}
