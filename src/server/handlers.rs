use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use log::warn;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::model::{HistoryRow, Snapshot};
use crate::records::HistoryStore;
use crate::stats::{self, Stats, DAY_WINDOW};
use crate::utils::chrono_duration;

use super::{ApiError, AppState};

pub async fn stats(State(state): State<AppState>) -> Result<Json<Stats>, ApiError> {
    let now = Utc::now();
    let monitor = &state.monitor;
    let live = monitor.current();

    let rows = match stats_rows(monitor.store().as_ref(), now).await {
        Ok(rows) => monitor.goal_override().apply_rows(rows),
        Err(err) if live.is_some() => {
            warn!("History unavailable for stats, using live snapshot: {err}");
            Vec::new()
        }
        Err(err) => return Err(ApiError::Unavailable(err.to_string())),
    };

    let goal = live
        .map(|snapshot| snapshot.goal)
        .or_else(|| rows.last().map(|row| row.goal))
        .ok_or_else(|| ApiError::Unavailable("no signature data available yet".into()))?;

    Ok(Json(stats::compute(
        &rows,
        live.as_ref(),
        goal,
        now,
        &state.timezone,
    )))
}

/// Last 24 hours, or the most recent row when that window is empty.
async fn stats_rows(
    store: &dyn HistoryStore,
    now: DateTime<Utc>,
) -> crate::error::Result<Vec<HistoryRow>> {
    let rows = store.query(Some(now - chrono_duration(DAY_WINDOW))).await?;
    if !rows.is_empty() {
        return Ok(rows);
    }
    Ok(store.latest().await?.into_iter().collect())
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub hours: Option<String>,
}

/// `None` means every row; otherwise a positive whole number of hours.
pub fn parse_hours(raw: Option<&str>) -> Result<Option<u32>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) if value.eq_ignore_ascii_case("all") => Ok(None),
        Some(value) => match value.parse::<u32>() {
            Ok(hours) if hours > 0 => Ok(Some(hours)),
            _ => Err(ApiError::BadRequest(format!(
                "hours must be a positive integer or \"all\", got {value:?}"
            ))),
        },
    }
}

pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistoryRow>>, ApiError> {
    let hours = parse_hours(params.hours.as_deref())?;
    let now = Utc::now();
    let since = hours.map(|hours| now - Duration::hours(i64::from(hours)));
    let monitor = &state.monitor;

    match monitor.store().query(since).await {
        Ok(rows) => Ok(Json(monitor.goal_override().apply_rows(rows))),
        Err(err) => match monitor.current() {
            Some(snapshot) => {
                warn!("History unavailable, serving live snapshot: {err}");
                Ok(Json(vec![live_row(snapshot, now)]))
            }
            None => Err(ApiError::Unavailable(err.to_string())),
        },
    }
}

fn live_row(snapshot: Snapshot, now: DateTime<Utc>) -> HistoryRow {
    HistoryRow {
        timestamp: now,
        signature_count: snapshot.signature_count,
        goal: snapshot.goal,
        change_amount: 0,
    }
}

pub async fn current(
    State(state): State<AppState>,
) -> Result<Json<Snapshot>, ApiError> {
    if let Some(snapshot) = state.monitor.current() {
        return Ok(Json(snapshot));
    }
    // The running poller owns upstream traffic; readers never add fetches.
    if state.monitor.is_running() {
        return Err(ApiError::Unavailable(
            "no signature data available yet".into(),
        ));
    }

    let outcome = state
        .monitor
        .poll_once()
        .await
        .map_err(|err| ApiError::Upstream(err.to_string()))?;
    Ok(Json(outcome.snapshot()))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let monitor = &state.monitor;
    Json(json!({
        "status": "ok",
        "monitoring": monitor.is_running(),
        "connections": monitor.connections(),
        "subscribers": monitor.subscriber_count(),
        "lastSignatureCount": monitor.last_signature_count(),
    }))
}
