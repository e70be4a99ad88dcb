//! # Observability
//!
//! Logging bootstrap shared by every Dropmate binary.
//!
//! Library crates only emit `tracing` events; they never install a
//! subscriber. A host process calls [`init`] or [`init_with_config`] once at
//! startup and decides where the events go:
//!
//! - compact human-readable lines on stderr
//! - structured JSONL appended to a log file (default
//!   `~/.dropmate/logs/sync.jsonl`)
//!
//! The file sink is append-only with per-line flushes, so
//! `tail -f ~/.dropmate/logs/sync.jsonl | jq` works while the process runs.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "dropmate".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! })?;
//! tracing::info!("sync core started");
//! ```

mod file_sink;
mod json_layer;

use std::io;
use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use file_sink::{default_log_path, FileLogWriter, WriterFactory};
pub use json_layer::{JsonLayer, LogEntry};

/// Where log events are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogSink {
    /// Only stderr.
    Stderr,
    /// JSONL file, plus stderr when `also_stderr` is set.
    #[default]
    File,
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSONL line.
    pub service_name: String,

    /// Default level filter (e.g. "debug", "info").
    /// `RUST_LOG` overrides it when set.
    pub default_level: String,

    /// Sink selection.
    pub sink: LogSink,

    /// Custom JSONL path. Defaults to [`default_log_path`].
    pub log_path: Option<PathBuf>,

    /// Also emit compact lines on stderr when writing to a file.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            sink: LogSink::File,
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with defaults for `service_name`.
pub fn init(service_name: &str) -> io::Result<()> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Initialize logging with a custom configuration.
///
/// Returns an error when the log file cannot be opened. Installing a second
/// global subscriber is ignored, so tests and embedders may call this more
/// than once.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    match config.sink {
        LogSink::Stderr => {
            let _ = tracing_subscriber::registry()
                .with(stderr_layer().with_filter(env_filter(&config.default_level)))
                .try_init();
            Ok(())
        }
        LogSink::File => {
            let log_path = match config.log_path.clone() {
                Some(path) => path,
                None => default_log_path().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "home directory not found")
                })?,
            };
            let writer = FileLogWriter::new(&log_path)?;
            let json_layer = JsonLayer::new(config.service_name.clone(), WriterFactory::new(writer));

            let stderr = config
                .also_stderr
                .then(|| stderr_layer().with_filter(env_filter(&config.default_level)));

            let installed = tracing_subscriber::registry()
                .with(json_layer.with_filter(env_filter(&config.default_level)))
                .with(stderr)
                .try_init()
                .is_ok();

            if installed {
                tracing::info!(
                    log_path = %log_path.display(),
                    service = %config.service_name,
                    "observability initialized"
                );
            }
            Ok(())
        }
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn stderr_layer<S>() -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_writer(io::stderr)
}

pub use tracing::{debug, error, info, instrument, trace, warn};
pub use tracing::Level;
