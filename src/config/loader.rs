use std::{
    collections::HashMap,
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::{AppError, Context, Result};

use super::{validator, Config};

/// Load a JSON config file and layer it over the builtin defaults.
///
/// Every key is optional; anything missing keeps its builtin value.
pub fn load_config(path: &Path) -> Result<Config> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read config JSON at {}", path.display()))?;

    let raw: RawConfig = serde_json::from_str(&json)
        .with_context(|| format!("failed to parse config JSON at {}", path.display()))?;

    let mut config = Config::builtin();
    raw.apply(&mut config)?;

    validator::validate_config(&config)?;

    Ok(config)
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    upstream: Option<RawUpstream>,
    goal_override: Option<u64>,
    monitor: Option<RawMonitor>,
    storage: Option<RawStorage>,
    server: Option<RawServer>,
    stats: Option<RawStats>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawUpstream {
    url: Option<String>,
    headers: Option<HashMap<String, String>>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawMonitor {
    poll_interval_ms: Option<u64>,
    heartbeat_interval_ms: Option<u64>,
    storage_timeout_ms: Option<u64>,
    stream_buffer: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawStorage {
    path: Option<PathBuf>,
    /// Explicitly turn persistence off even when a path is configured.
    disabled: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawServer {
    bind_addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawStats {
    utc_offset_minutes: Option<i32>,
}

impl RawConfig {
    fn apply(self, config: &mut Config) -> Result<()> {
        if let Some(upstream) = self.upstream {
            if let Some(url) = upstream.url {
                config.upstream.url = url;
            }
            if let Some(headers) = upstream.headers {
                config.upstream.headers.extend(headers);
            }
            if let Some(ms) = upstream.timeout_ms {
                config.upstream.timeout = Duration::from_millis(ms);
            }
        }

        if self.goal_override.is_some() {
            config.goal_override = self.goal_override;
        }

        if let Some(monitor) = self.monitor {
            if let Some(ms) = monitor.poll_interval_ms {
                config.monitor.poll_interval = Duration::from_millis(ms);
            }
            if let Some(ms) = monitor.heartbeat_interval_ms {
                config.monitor.heartbeat_interval = Duration::from_millis(ms);
            }
            if let Some(ms) = monitor.storage_timeout_ms {
                config.monitor.storage_timeout = Duration::from_millis(ms);
            }
            if let Some(depth) = monitor.stream_buffer {
                config.monitor.stream_buffer = depth;
            }
        }

        if let Some(storage) = self.storage {
            if storage.disabled {
                config.storage.path = None;
            } else if let Some(path) = storage.path {
                config.storage.path = Some(path);
            }
        }

        if let Some(server) = self.server {
            if let Some(addr) = server.bind_addr {
                config.server.bind_addr = parse_bind_addr(&addr)?;
            }
        }

        if let Some(stats) = self.stats {
            if let Some(offset) = stats.utc_offset_minutes {
                config.stats.utc_offset_minutes = offset;
            }
        }

        Ok(())
    }
}

pub fn parse_bind_addr(value: &str) -> Result<SocketAddr> {
    value
        .trim()
        .parse::<SocketAddr>()
        .map_err(|err| AppError::Config(format!("invalid bind address `{value}`: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn empty_object_keeps_builtin_values() {
        let file = write_config("{}");
        let config = load_config(file.path()).expect("load config");
        let builtin = Config::builtin();

        assert_eq!(config.upstream.url, builtin.upstream.url);
        assert_eq!(config.monitor.poll_interval, builtin.monitor.poll_interval);
        assert_eq!(config.goal_override, None);
    }

    #[test]
    fn overrides_nested_fields() {
        let file = write_config(
            r#"{
                "upstream": { "url": "https://example.org/progress.json", "timeout_ms": 2500 },
                "goal_override": 1500000,
                "monitor": { "poll_interval_ms": 5000, "heartbeat_interval_ms": 15000 },
                "storage": { "path": "var/history.csv" },
                "server": { "bind_addr": "0.0.0.0:8080" },
                "stats": { "utc_offset_minutes": 60 }
            }"#,
        );
        let config = load_config(file.path()).expect("load config");

        assert_eq!(config.upstream.url, "https://example.org/progress.json");
        assert_eq!(config.upstream.timeout, Duration::from_millis(2500));
        assert_eq!(config.goal_override, Some(1_500_000));
        assert_eq!(config.monitor.poll_interval, Duration::from_secs(5));
        assert_eq!(config.monitor.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(
            config.storage.path.as_deref(),
            Some(Path::new("var/history.csv"))
        );
        assert_eq!(config.server.bind_addr.port(), 8080);
        assert_eq!(config.stats.utc_offset_minutes, 60);
    }

    #[test]
    fn disabled_storage_clears_path() {
        let file = write_config(r#"{ "storage": { "disabled": true } }"#);
        let config = load_config(file.path()).expect("load config");
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn rejects_unknown_keys() {
        let file = write_config(r#"{ "goal": 10 }"#);
        let err = load_config(file.path()).expect_err("unknown key should fail");
        assert!(
            err.to_string().contains("failed to parse config JSON"),
            "unexpected error message: {err}"
        );
    }

    #[test]
    fn rejects_bad_bind_addr() {
        let file = write_config(r#"{ "server": { "bind_addr": "localhost" } }"#);
        let err = load_config(file.path()).expect_err("bind addr should fail");
        assert!(err.to_string().contains("invalid bind address"));
    }
}
