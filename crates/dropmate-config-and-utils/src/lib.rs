//! Configuration, paths, logging bootstrap and shared utilities for the
//! Dropmate sync core.

mod config;
mod error;
mod listeners;
mod logging;
mod paths;

pub use config::{
    parse_boolean, Config, DEFAULT_API_BASE_URL, DEFAULT_API_TIMEOUT_MS,
    DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_IDENTITY_URL, DEFAULT_LOG_LEVEL,
    DEFAULT_REALTIME_URL, DEFAULT_SECURE_TOKEN_URL,
};
pub use error::{CoreError, CoreResult};
pub use listeners::{Listeners, Subscription};
pub use logging::{init_logging, init_logging_with_file, parse_level};
pub use paths::Paths;
