//! Uniform error shape for API calls.

use dropmate_cache::CacheError;
use serde_json::Value;
use thiserror::Error;

/// What went wrong, independent of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Server answered with a non-success status
    Status,
    /// Request exceeded the configured timeout
    Timeout,
    /// No response (connection refused, DNS, TLS)
    Network,
    /// Response body did not match the expected shape
    Decode,
    Other,
}

/// Normalized API failure.
///
/// `message` prefers the server's own explanation (`message`, `error` or
/// `error.message` in a JSON body) over a generic one.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub status: Option<u16>,
    pub message: String,
    pub body: Option<Value>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            body: None,
        }
    }

    /// Build from a non-success response.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let parsed: Option<Value> = serde_json::from_slice(body).ok();
        let message = parsed
            .as_ref()
            .and_then(body_message)
            .unwrap_or_else(|| format!("Request failed with status code {status}"));
        let body = parsed.or_else(|| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            (!text.is_empty()).then_some(Value::String(text))
        });

        Self {
            kind: ApiErrorKind::Status,
            status: Some(status),
            message,
            body,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Network, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Decode, message)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    /// Returns true if the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            ApiErrorKind::Timeout | ApiErrorKind::Network => true,
            ApiErrorKind::Status => self.status.is_some_and(|s| s >= 500),
            _ => false,
        }
    }
}

fn body_message(body: &Value) -> Option<String> {
    let text = |v: &Value| v.as_str().map(str::trim).filter(|s| !s.is_empty()).map(String::from);
    body.get("message")
        .and_then(text)
        .or_else(|| body.get("error").and_then(text))
        .or_else(|| body.get("error").and_then(|e| e.get("message")).and_then(text))
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            ApiError::network(err.to_string())
        } else if err.is_decode() || err.is_body() {
            ApiError::decode(err.to_string())
        } else {
            ApiError::new(ApiErrorKind::Other, err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::decode(err.to_string())
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        ApiError::decode(err.to_string())
    }
}

/// Result type alias using ApiError.
pub type ApiResult<T> = Result<T, ApiError>;
