//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "FRAGLINK_LOG";

const DEFAULT_FILTER: &str = "info";

/// Installs a formatted subscriber writing to stderr, filtered by
/// `FRAGLINK_LOG` (default `info`). Safe to call more than once; later calls
/// leave the first subscriber in place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
