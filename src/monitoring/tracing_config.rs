//! Structured logging with tracing
//!
//! Sets up:
//! - Console logging, text or JSON
//! - Optional JSON file logging with daily rotation
//! - RUST_LOG driven filtering

use super::config::{LogFormat, MonitoringConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

pub const LOG_FILE_PREFIX: &str = "ingest.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize the global tracing subscriber.
///
/// Returns the file writer guard when file logging is on; it must be held
/// for the life of the process or buffered lines are lost. Installing a
/// subscriber twice is not an error, the second attempt is ignored.
pub fn init_tracing(
    config: &MonitoringConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    if !config.enabled {
        return Ok(None);
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if config.enable_console_logging {
        let console = fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true);
        let console: BoxedLayer = match config.log_format {
            LogFormat::Json => console.json().boxed(),
            LogFormat::Text => console.boxed(),
        };
        layers.push(console);
    }

    if config.enable_file_logging {
        config.ensure_log_dir()?;
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .max_log_files(config.log_retention_days.max(1) as usize)
            .build(&config.log_dir)?;
        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .json()
                .boxed(),
        );
        guard = Some(file_guard);
    }

    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init();

    Ok(guard)
}
