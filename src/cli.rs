use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use petition_monitor::config::{loader::parse_bind_addr, validate_config, Config};
use petition_monitor::{AppError, Result};

#[derive(Debug, Parser)]
#[command(name = "petition-monitor")]
#[command(about = "Polls a signature counter and streams changes to viewers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// JSON config file layered over the builtin defaults
    #[arg(short, long, env = "PETITION_MONITOR_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless PETITION_MONITOR_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the poller and HTTP server (default)
    Serve,

    /// Fetch the upstream once and print the snapshot as JSON
    Check,

    /// Print stats computed from the stored history
    Stats,
}

/// Per-field overrides; each wins over the config file.
#[derive(Debug, Default, Args)]
pub struct Overrides {
    #[arg(long, env = "PETITION_UPSTREAM_URL")]
    pub upstream_url: Option<String>,

    /// Extra upstream header; values may reference ${ENV_VARS}
    #[arg(long = "header", value_name = "NAME=VALUE")]
    pub headers: Vec<String>,

    #[arg(long, env = "PETITION_GOAL_OVERRIDE")]
    pub goal_override: Option<u64>,

    #[arg(long, env = "PETITION_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    #[arg(long, env = "PETITION_HEARTBEAT_INTERVAL_MS")]
    pub heartbeat_interval_ms: Option<u64>,

    #[arg(long, env = "PETITION_FETCH_TIMEOUT_MS")]
    pub fetch_timeout_ms: Option<u64>,

    #[arg(long, env = "PETITION_STORAGE_TIMEOUT_MS")]
    pub storage_timeout_ms: Option<u64>,

    #[arg(long, env = "PETITION_STORAGE_PATH", conflicts_with = "no_storage")]
    pub storage_path: Option<PathBuf>,

    /// Skip persistence entirely
    #[arg(long)]
    pub no_storage: bool,

    #[arg(long, env = "PETITION_BIND_ADDR")]
    pub bind_addr: Option<String>,

    #[arg(long, env = "PETITION_STATS_UTC_OFFSET_MINUTES", allow_hyphen_values = true)]
    pub stats_utc_offset_minutes: Option<i32>,
}

impl Cli {
    /// Builtin defaults, then the config file, then flags and env.
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => petition_monitor::config::load_config(path)?,
            None => Config::builtin(),
        };
        self.overrides.apply(&mut config)?;
        validate_config(&config)?;
        Ok(config)
    }
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(url) = &self.upstream_url {
            config.upstream.url = url.clone();
        }
        for header in &self.headers {
            let (name, value) = header.split_once('=').ok_or_else(|| {
                AppError::Config(format!("header `{header}` must look like NAME=VALUE"))
            })?;
            config
                .upstream
                .headers
                .insert(name.trim().to_string(), value.trim().to_string());
        }
        if self.goal_override.is_some() {
            config.goal_override = self.goal_override;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.monitor.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.heartbeat_interval_ms {
            config.monitor.heartbeat_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.fetch_timeout_ms {
            config.upstream.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.storage_timeout_ms {
            config.monitor.storage_timeout = Duration::from_millis(ms);
        }
        if self.no_storage {
            config.storage.path = None;
        } else if let Some(path) = &self.storage_path {
            config.storage.path = Some(path.clone());
        }
        if let Some(addr) = &self.bind_addr {
            config.server.bind_addr = parse_bind_addr(addr)?;
        }
        if let Some(offset) = self.stats_utc_offset_minutes {
            config.stats.utc_offset_minutes = offset;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serve() {
        let cli = Cli::try_parse_from(["petition-monitor"]).expect("parse");
        assert_eq!(cli.command, None);
        assert!(!cli.verbose);
    }

    #[test]
    fn flags_override_builtin_config() {
        let cli = Cli::try_parse_from([
            "petition-monitor",
            "--goal-override",
            "1500000",
            "--poll-interval-ms",
            "2500",
            "--header",
            "X-Api-Key=secret",
            "--no-storage",
            "--stats-utc-offset-minutes",
            "-300",
            "check",
        ])
        .expect("parse");

        assert_eq!(cli.command, Some(Command::Check));
        let config = cli.resolve_config().expect("config should resolve");
        assert_eq!(config.goal_override, Some(1_500_000));
        assert_eq!(config.monitor.poll_interval, Duration::from_millis(2_500));
        assert_eq!(config.upstream.headers["X-Api-Key"], "secret");
        assert!(config.storage.path.is_none());
        assert_eq!(config.stats.utc_offset_minutes, -300);
    }

    #[test]
    fn rejects_malformed_header() {
        let overrides = Overrides {
            headers: vec!["no-equals-sign".to_string()],
            ..Overrides::default()
        };
        let err = overrides
            .apply(&mut Config::builtin())
            .expect_err("header without '=' should fail");
        assert!(
            err.to_string().contains("NAME=VALUE"),
            "unexpected error message: {err}"
        );
    }

    #[test]
    fn invalid_values_fail_validation() {
        let cli = Cli::try_parse_from(["petition-monitor", "--goal-override", "0"]).expect("parse");
        let err = cli.resolve_config().expect_err("zero goal should fail");
        assert!(
            err.to_string().contains("goal_override"),
            "unexpected error message: {err}"
        );
    }
}
