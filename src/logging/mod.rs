use std::fs::OpenOptions;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LoggingConfig;
use crate::error::ConfigError;

/// Filter from RUST_LOG, falling back to the configured level
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| match level {
        "trace" | "debug" | "info" | "warn" | "error" => EnvFilter::new(level),
        _ => EnvFilter::new("info"),
    })
}

/// Initialize the tracing system with structured logging.
///
/// With a log file configured, records are appended to it as JSON lines
/// through a non-blocking writer; keep the returned guard alive until exit so
/// buffered lines are flushed. Without one, human-readable output goes to the
/// console. A subscriber installed earlier is left in place.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>, ConfigError> {
    let filter = env_filter(&config.level);

    let Some(path) = &config.log_file else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339());
        if Registry::default().with(filter).with(fmt_layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized, skipping");
        }
        return Ok(None);
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ConfigError::LoadError(format!("Failed to open log file {}: {}", path, e)))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let fmt_layer = fmt::layer()
        .json()
        .with_timer(ChronoUtc::rfc_3339())
        .with_file(true)
        .with_line_number(true)
        .with_current_span(false)
        .with_ansi(false)
        .with_writer(writer);

    if Registry::default().with(filter).with(fmt_layer).try_init().is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    tracing::info!(file = %path, level = %config.level, "Tracing system initialized");
    Ok(Some(guard))
}
