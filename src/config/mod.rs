use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

pub mod loader;
pub mod validator;

pub use loader::load_config;
pub use validator::validate_config;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_STREAM_BUFFER: usize = 32;

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub storage_timeout: Duration,
    /// Per-connection queue depth; a viewer that falls this far behind is dropped.
    pub stream_buffer: usize,
}

#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// CSV file holding the change history. `None` disables persistence.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct StatsConfig {
    /// Offset of the reference timezone used for peak-hour bucketing.
    pub utc_offset_minutes: i32,
}

impl StatsConfig {
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub upstream: UpstreamConfig,
    /// Replaces whatever goal the upstream reports, everywhere it is surfaced.
    pub goal_override: Option<u64>,
    pub monitor: MonitorConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub stats: StatsConfig,
}

impl Config {
    pub fn builtin() -> Self {
        let headers = HashMap::from([
            (
                "User-Agent".to_string(),
                concat!("petition-monitor/", env!("CARGO_PKG_VERSION")).to_string(),
            ),
            ("Accept".to_string(), "application/json".to_string()),
        ]);

        Config {
            upstream: UpstreamConfig {
                url: "http://127.0.0.1:8081/api/progress".to_string(),
                headers,
                timeout: DEFAULT_FETCH_TIMEOUT,
            },
            goal_override: None,
            monitor: MonitorConfig {
                poll_interval: DEFAULT_POLL_INTERVAL,
                heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
                storage_timeout: DEFAULT_STORAGE_TIMEOUT,
                stream_buffer: DEFAULT_STREAM_BUFFER,
            },
            storage: StorageConfig {
                path: Some(PathBuf::from("data/history.csv")),
            },
            server: ServerConfig {
                bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 3000)),
            },
            stats: StatsConfig {
                utc_offset_minutes: 0,
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::builtin()
    }
}
