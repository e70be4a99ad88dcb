//! Storage key names.

/// Keys used in secure storage.
pub struct StorageKeys;

impl StorageKeys {
    /// Bearer token of the current session.
    pub const AUTH_TOKEN: &'static str = "dropmate_auth_token_v1";

    /// Identity provider refresh credential (JSON [`crate::ProviderSession`]).
    pub const PROVIDER_SESSION: &'static str = "dropmate_provider_session_v1";

    pub const ALL: [&'static str; 2] = [Self::AUTH_TOKEN, Self::PROVIDER_SESSION];
}
