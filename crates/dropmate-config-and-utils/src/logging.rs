//! Logging initialization for Dropmate binaries.
//!
//! Thin wrappers over the `observability` package so hosts only pick a level
//! and, optionally, a JSONL file.

use observability::{LogConfig, LogSink};
use std::path::Path;

const SERVICE_NAME: &str = "dropmate";

/// Log compact lines to stderr at `level` (overridable with `RUST_LOG`).
pub fn init_logging(level: &str) {
    let _ = observability::init_with_config(LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: level.into(),
        sink: LogSink::Stderr,
        ..Default::default()
    });
}

/// Log structured JSONL to `log_path` and compact lines to stderr.
///
/// Falls back to stderr-only logging when the file cannot be opened.
pub fn init_logging_with_file(level: &str, log_path: &Path) {
    let result = observability::init_with_config(LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: level.into(),
        sink: LogSink::File,
        log_path: Some(log_path.to_path_buf()),
        also_stderr: true,
    });

    if let Err(error) = result {
        init_logging(level);
        tracing::warn!(
            log_path = %log_path.display(),
            error = %error,
            "could not open log file, logging to stderr only"
        );
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
