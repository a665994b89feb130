//! `tracing-subscriber` initialisation.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Builds the filter: `RUST_LOG` when set, otherwise the configured level.
#[must_use]
pub fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber.
///
/// Returns false if a subscriber was already installed, which happens when
/// tests or an embedding binary initialise logging first.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(config))
        .with_target(true);

    let installed = if config.json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
