//! Tracing subscriber initialization.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

/// Install the global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. An unparsable
/// level falls back to `info`.
pub fn init(config: &LoggingConfig) {
    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(tracing_subscriber::fmt::layer().with_ansi(config.ansi))
        .init();
}

pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
