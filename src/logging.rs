use std::sync::OnceLock;

use env_logger::{Builder, Env};

/// Environment variable holding the `env_logger` filter directives.
pub const LOG_ENV: &str = "PETITION_MONITOR_LOG";
pub const LOG_STYLE_ENV: &str = "PETITION_MONITOR_LOG_STYLE";
const DEFAULT_FILTER: &str = "info";

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install the process logger once; later calls are no-ops.
///
/// `verbose` raises the default filter to `debug` when the environment does
/// not specify one.
pub fn init(verbose: bool) {
    INITIALIZED.get_or_init(|| {
        let default_filter = if verbose { "debug" } else { DEFAULT_FILTER };
        let env = Env::new()
            .filter_or(LOG_ENV, default_filter)
            .write_style(LOG_STYLE_ENV);

        // A logger installed by a test harness wins; that is fine.
        let _ = Builder::from_env(env)
            .format_timestamp_millis()
            .try_init();
    });
}
