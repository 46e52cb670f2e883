//! Logging bootstrap shared by the CLI and the HTTP server.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV: &str = "CARBON_LEDGER_LOG";

/// Initialize tracing with the CARBON_LEDGER_LOG environment variable.
///
/// Defaults to "info" level if CARBON_LEDGER_LOG is not set. Logs go to
/// stderr so command output on stdout stays machine-readable.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
