//! Configuration for the sync core.
//!
//! Values are resolved in three layers: built-in defaults, then
//! `<base>/config.json`, then `DROPMATE_*` environment variables.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default REST API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.dropmate.dev";

/// Default outbound request timeout in milliseconds.
pub const DEFAULT_API_TIMEOUT_MS: u64 = 8000;

/// Default realtime channel endpoint.
pub const DEFAULT_REALTIME_URL: &str = "wss://api.dropmate.dev/realtime";

/// Default heartbeat interval on the realtime channel.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 25;

/// Default identity provider endpoint (account operations).
pub const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com";

/// Default identity provider token endpoint.
pub const DEFAULT_SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const ENV_LOG_LEVEL: &str = "DROPMATE_LOG_LEVEL";
const ENV_BASE_URL: &str = "DROPMATE_BASE_URL";
const ENV_TIMEOUT: &str = "DROPMATE_TIMEOUT";
const ENV_USE_HTTP: &str = "DROPMATE_USE_HTTP";
const ENV_REALTIME_URL: &str = "DROPMATE_REALTIME_URL";
const ENV_AUTH_API_KEY: &str = "DROPMATE_AUTH_API_KEY";

/// Sync core configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// REST API base URL.
    pub api_base_url: String,
    /// Per-request timeout in milliseconds.
    pub api_timeout_ms: u64,
    /// Use the HTTP API instead of the bundled mock data service.
    pub use_http: bool,
    /// Realtime channel endpoint (ws:// or wss://).
    pub realtime_url: String,
    /// Seconds between heartbeat frames on the realtime channel.
    pub heartbeat_interval_secs: u64,
    /// Identity provider account endpoint.
    pub identity_url: String,
    /// Identity provider token endpoint.
    pub secure_token_url: String,
    /// Identity provider web API key.
    pub auth_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_timeout_ms: DEFAULT_API_TIMEOUT_MS,
            use_http: false,
            realtime_url: DEFAULT_REALTIME_URL.to_string(),
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            secure_token_url: DEFAULT_SECURE_TOKEN_URL.to_string(),
            auth_api_key: None,
        }
    }
}

impl Config {
    /// Defaults overridden by the process environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load `<base>/config.json` if present, then apply the environment.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to `<base>/config.json`.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override fields from environment-style lookups.
    ///
    /// Blank values are ignored, as are timeouts that do not parse.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(level) = non_empty(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(url) = non_empty(ENV_BASE_URL) {
            self.api_base_url = url;
        }
        if let Some(timeout) = non_empty(ENV_TIMEOUT).and_then(|raw| raw.parse::<u64>().ok()) {
            self.api_timeout_ms = timeout;
        }
        if let Some(flag) = non_empty(ENV_USE_HTTP) {
            self.use_http = parse_boolean(&flag);
        }
        if let Some(url) = non_empty(ENV_REALTIME_URL) {
            self.realtime_url = url;
        }
        if let Some(key) = non_empty(ENV_AUTH_API_KEY) {
            self.auth_api_key = Some(key);
        }
    }

    /// Check that every endpoint parses and the timeout is non-zero.
    pub fn validate(&self) -> CoreResult<()> {
        self.api_base_url()?;
        self.realtime_url()?;
        Url::parse(&self.identity_url)?;
        Url::parse(&self.secure_token_url)?;
        if self.api_timeout_ms == 0 {
            return Err(CoreError::Config("api_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    /// REST API base URL, parsed.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base_url).map_err(CoreError::from)
    }

    /// Realtime endpoint, parsed. Only ws and wss schemes are accepted.
    pub fn realtime_url(&self) -> CoreResult<Url> {
        let url = Url::parse(&self.realtime_url)?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(CoreError::Config(format!(
                "realtime_url must use ws or wss, got {other}"
            ))),
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}

/// `"true"` in any letter case is true; everything else is false.
pub fn parse_boolean(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}
