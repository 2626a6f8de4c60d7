//! Tracing initialisation
//!
//! Events go to stderr, as text or JSON, and optionally to a daily rolling
//! file. `RUST_LOG` overrides the configured level.

use crate::config::{LogFormat, LoggingConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Filter from `RUST_LOG`, falling back to `level`, then to `info`
pub fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn stderr_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Text => fmt::layer().with_writer(std::io::stderr).with_target(false).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for as long as file logging should flush.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>, TryInitError> {
    let mut layers = vec![stderr_layer(config.format)];
    let mut guard = None;

    if let Some(dir) = &config.directory {
        let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        let file_layer = match config.format {
            LogFormat::Text => fmt::layer().with_ansi(false).with_writer(writer).boxed(),
            LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
        };
        layers.push(file_layer);
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter(&config.level))
        .try_init()?;

    tracing::debug!("Logging initialised at {}", config.level);
    Ok(guard)
}
