//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Provider refused the operation; carries a user-displayable message
    #[error("{0}")]
    Rejected(String),

    /// Operation needs a signed-in user
    #[error("Not signed in")]
    NotSignedIn,

    /// Forced token refresh reached the provider and failed
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// Invalid state transition in the session FSM
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// Identity provider error
    #[error("Identity provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] dropmate_storage::StorageError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns true if the operation can be retried later.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Provider(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

/// Classified identity provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    InvalidEmail,
    UserNotFound,
    WrongPassword,
    EmailInUse,
    WeakPassword,
    TooManyRequests,
    UserDisabled,
    TokenExpired,
    Network,
    Unavailable,
    Other,
}

/// Error reported by an identity provider, keyed by its error code.
///
/// Both the SDK spelling (`auth/wrong-password`) and the REST spelling
/// (`INVALID_PASSWORD`) of a code are recognised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Connection-level failure (no response from the provider).
    pub fn network(message: impl Into<String>) -> Self {
        Self::new("auth/network-request-failed", message)
    }

    /// Provider answered with a server error.
    pub fn unavailable(status: u16) -> Self {
        Self::new("SERVICE_UNAVAILABLE", format!("HTTP {status}"))
    }

    /// Parse a REST error message such as `WEAK_PASSWORD : Password should be...`.
    pub fn from_rest_message(raw: &str) -> Self {
        match raw.split_once(" : ") {
            Some((code, detail)) => Self::new(code.trim(), detail.trim()),
            None => Self::new(raw.trim(), raw.trim()),
        }
    }

    pub fn kind(&self) -> ProviderErrorKind {
        match self.code.as_str() {
            "auth/invalid-email" | "INVALID_EMAIL" => ProviderErrorKind::InvalidEmail,
            "auth/user-not-found" | "EMAIL_NOT_FOUND" => ProviderErrorKind::UserNotFound,
            "auth/wrong-password"
            | "auth/invalid-credential"
            | "auth/invalid-login-credentials"
            | "INVALID_PASSWORD"
            | "INVALID_LOGIN_CREDENTIALS" => ProviderErrorKind::WrongPassword,
            "auth/email-already-in-use" | "EMAIL_EXISTS" => ProviderErrorKind::EmailInUse,
            "auth/weak-password" | "WEAK_PASSWORD" => ProviderErrorKind::WeakPassword,
            "auth/too-many-requests" | "TOO_MANY_ATTEMPTS_TRY_LATER" => {
                ProviderErrorKind::TooManyRequests
            }
            "auth/user-disabled" | "USER_DISABLED" => ProviderErrorKind::UserDisabled,
            "auth/user-token-expired" | "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" => {
                ProviderErrorKind::TokenExpired
            }
            "auth/network-request-failed" => ProviderErrorKind::Network,
            "SERVICE_UNAVAILABLE" => ProviderErrorKind::Unavailable,
            _ => ProviderErrorKind::Other,
        }
    }

    /// Stable message safe to show to a user.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ProviderErrorKind::InvalidEmail => "Please enter a valid email address.",
            ProviderErrorKind::UserNotFound => "No account found with this email.",
            ProviderErrorKind::WrongPassword => "Incorrect email or password.",
            ProviderErrorKind::EmailInUse => "An account with this email already exists.",
            ProviderErrorKind::WeakPassword => "Password should be at least 6 characters.",
            ProviderErrorKind::TooManyRequests => "Too many attempts. Please try again later.",
            ProviderErrorKind::Network => "Network error. Please check your connection.",
            ProviderErrorKind::UserDisabled => "This account has been disabled.",
            ProviderErrorKind::TokenExpired => "Your session has expired. Please sign in again.",
            ProviderErrorKind::Unavailable | ProviderErrorKind::Other => {
                "Something went wrong. Please try again."
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ProviderErrorKind::Network | ProviderErrorKind::Unavailable
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status.is_server_error() {
                return ProviderError::unavailable(status.as_u16());
            }
        }
        if err.is_connect() || err.is_timeout() || err.is_request() {
            return ProviderError::network(err.to_string());
        }
        ProviderError::new("UNEXPECTED_RESPONSE", err.to_string())
    }
}

/// Result type alias using ProviderError.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_sdk_codes() {
        let cases = [
            ("auth/invalid-email", "Please enter a valid email address."),
            ("auth/user-not-found", "No account found with this email."),
            ("auth/wrong-password", "Incorrect email or password."),
            ("auth/invalid-credential", "Incorrect email or password."),
            ("auth/email-already-in-use", "An account with this email already exists."),
            ("auth/weak-password", "Password should be at least 6 characters."),
            ("auth/too-many-requests", "Too many attempts. Please try again later."),
            ("auth/network-request-failed", "Network error. Please check your connection."),
            ("auth/user-disabled", "This account has been disabled."),
        ];
        for (code, expected) in cases {
            assert_eq!(ProviderError::new(code, "raw").user_message(), expected, "{code}");
        }
    }

    #[test]
    fn test_user_message_unknown_code() {
        let err = ProviderError::new("auth/quota-exceeded", "quota");
        assert_eq!(err.kind(), ProviderErrorKind::Other);
        assert_eq!(err.user_message(), "Something went wrong. Please try again.");
    }

    #[test]
    fn test_from_rest_message_strips_detail() {
        let err = ProviderError::from_rest_message(
            "WEAK_PASSWORD : Password should be at least 6 characters",
        );
        assert_eq!(err.code, "WEAK_PASSWORD");
        assert_eq!(err.kind(), ProviderErrorKind::WeakPassword);

        let err = ProviderError::from_rest_message("INVALID_LOGIN_CREDENTIALS");
        assert_eq!(err.kind(), ProviderErrorKind::WrongPassword);
    }

    #[test]
    fn test_is_transient_network() {
        assert!(ProviderError::network("offline").is_transient());
        assert!(ProviderError::unavailable(503).is_transient());
        assert!(AuthError::Provider(ProviderError::network("offline")).is_transient());
    }

    #[test]
    fn test_is_not_transient_rejections() {
        assert!(!ProviderError::new("INVALID_PASSWORD", "").is_transient());
        assert!(!AuthError::Rejected("Incorrect email or password.".into()).is_transient());
        assert!(!AuthError::NotSignedIn.is_transient());
        assert!(!AuthError::RefreshFailed("expired".into()).is_transient());
    }
}
