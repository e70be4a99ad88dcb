//! Realtime error types.

use thiserror::Error;

/// Realtime error type.
#[derive(Error, Debug)]
pub enum RealtimeError {
    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Server rejected or abandoned the handshake
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Malformed frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Could not obtain credentials for the channel
    #[error("Auth error: {0}")]
    Auth(#[from] dropmate_auth::AuthError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RealtimeError {
    /// Returns true if a later connect may succeed.
    pub fn is_transient(&self) -> bool {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match self {
            RealtimeError::WebSocket(e) => matches!(
                e,
                WsError::Io(_) | WsError::ConnectionClosed | WsError::AlreadyClosed
            ),
            RealtimeError::Handshake(_) => true,
            RealtimeError::Auth(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias using RealtimeError.
pub type RealtimeResult<T> = Result<T, RealtimeError>;
