//! Structured logging for autocrawler
//!
//! Sets up a `tracing` registry with:
//! 1. An `EnvFilter` where `RUST_LOG` wins over the configured level
//! 2. A terminal layer on stderr
//! 3. A daily rolling file layer in line or JSON format

use std::path::Path;

use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

use crate::crawler::config_loader::Logging;

const LOG_FILE_PREFIX: &str = "autocrawler.log";

/// Error types for logging
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type for logging operations
pub type LoggerResult<T> = Result<T, LoggerError>;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be kept alive
/// for the lifetime of the program. `None` when file logging is disabled.
pub fn init_logging(settings: &Logging, log_dir: &Path) -> LoggerResult<Option<WorkerGuard>> {
    let filter = build_filter(&settings.log_level)?;
    let json = settings.log_format.eq_ignore_ascii_case("json");

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if settings.log_to_terminal {
        layers.push(fmt::layer().with_writer(std::io::stderr).with_target(false).boxed());
    }

    if settings.log_to_file {
        std::fs::create_dir_all(log_dir)?;
        let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);

        let layer = if json {
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_span_events(FmtSpan::CLOSE)
                .boxed()
        } else {
            fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking)
                .with_span_events(FmtSpan::CLOSE)
                .boxed()
        };
        layers.push(layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| LoggerError::Logging(e.to_string()))?;

    info!(
        log_format = %settings.log_format,
        log_level = %settings.log_level,
        log_directory = %log_dir.display(),
        "Logger initialized"
    );

    Ok(guard)
}

fn build_filter(level: &str) -> LoggerResult<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| LoggerError::Filter(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_levels_and_directives() {
        assert!(build_filter("info").is_ok());
        assert!(build_filter("autocrawler=debug,reqwest=warn").is_ok());
    }
}
