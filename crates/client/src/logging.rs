//! Logging initialization.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Installs the global subscriber. `RUST_LOG` overrides the configured level.
///
/// Events go to stderr so command output on stdout stays clean.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_writer(std::io::stderr);

    match config.format {
        LogFormat::Json => subscriber
            .with(layer.json().with_current_span(true).with_target(true))
            .init(),
        LogFormat::Pretty => subscriber.with(layer.pretty().with_target(true)).init(),
        LogFormat::Compact => subscriber
            .with(layer.compact().with_target(false).without_time())
            .init(),
    }
}
