use std::time::Duration;

use crate::error::{AppError, Result};
use crate::model::MAX_COUNT;

use super::{Config, MonitorConfig, UpstreamConfig};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Validate a fully assembled configuration and surface every issue at once.
pub fn validate_config(config: &Config) -> Result<()> {
    let mut issues = Vec::new();

    validate_upstream(&config.upstream, &mut issues);
    validate_monitor(&config.monitor, &mut issues);

    match config.goal_override {
        Some(0) => issues.push("goal_override must be greater than zero".to_string()),
        Some(goal) if goal > MAX_COUNT => {
            issues.push(format!("goal_override must not exceed {MAX_COUNT}"))
        }
        _ => {}
    }

    if config.stats.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        issues.push(format!(
            "stats.utc_offset_minutes {} is outside +/-{MAX_UTC_OFFSET_MINUTES}",
            config.stats.utc_offset_minutes
        ));
    }

    if let Some(path) = &config.storage.path {
        if path.as_os_str().is_empty() {
            issues.push("storage.path must not be empty when set".to_string());
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "\n  - {}",
            issues.join("\n  - ")
        )))
    }
}

fn validate_upstream(upstream: &UpstreamConfig, issues: &mut Vec<String>) {
    let url = upstream.url.trim();
    if url.is_empty() {
        issues.push("upstream.url must not be empty".to_string());
    } else if !(url.starts_with("http://") || url.starts_with("https://")) {
        issues.push(format!("upstream.url `{url}` must use http or https"));
    }

    if upstream.timeout.is_zero() {
        issues.push("upstream.timeout_ms must be greater than zero".to_string());
    }

    for name in upstream.headers.keys() {
        if name.trim().is_empty() {
            issues.push("upstream.headers contains an empty header name".to_string());
        }
    }
}

fn validate_monitor(monitor: &MonitorConfig, issues: &mut Vec<String>) {
    if monitor.poll_interval < MIN_POLL_INTERVAL {
        issues.push(format!(
            "monitor.poll_interval_ms must be at least {}",
            MIN_POLL_INTERVAL.as_millis()
        ));
    }
    if monitor.heartbeat_interval.is_zero() {
        issues.push("monitor.heartbeat_interval_ms must be greater than zero".to_string());
    }
    if monitor.storage_timeout.is_zero() {
        issues.push("monitor.storage_timeout_ms must be greater than zero".to_string());
    }
    if monitor.stream_buffer == 0 {
        issues.push("monitor.stream_buffer must be at least 1".to_string());
    }
}
