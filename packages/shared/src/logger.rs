//! Logging setup utilities for the tandem binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// This function sets up logging for the tandem crates and the binary.
/// The log level can be overridden using the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "tandem-server", "tandem-client")
/// * `default_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use tandem_shared::logger::setup_logger;
///
/// setup_logger("tandem-server", "debug");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    let binary_target = binary_name.replace('-', "_");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "tandem_shared={level},tandem_server={level},tandem_client={level},{binary}={level},tower_http={level}",
                    level = default_log_level,
                    binary = binary_target,
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
