//! Typed access to the credentials kept in secure storage.

use crate::{SecureStorage, StorageKeys, StorageResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identity provider credential needed to restore a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSession {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    pub refresh_token: String,
}

/// High-level API over a [`SecureStorage`] backend.
#[derive(Clone)]
pub struct TokenVault {
    storage: Arc<dyn SecureStorage>,
}

impl TokenVault {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Vault over a fresh [`crate::MemoryStorage`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(crate::MemoryStorage::new()))
    }

    // ==========================================
    // Session token
    // ==========================================

    pub fn set_session_token(&self, token: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::AUTH_TOKEN, token)
    }

    pub fn get_session_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::AUTH_TOKEN)
    }

    pub fn has_session_token(&self) -> StorageResult<bool> {
        self.storage.has(StorageKeys::AUTH_TOKEN)
    }

    /// Returns whether a token was present.
    pub fn clear_session_token(&self) -> StorageResult<bool> {
        self.storage.delete(StorageKeys::AUTH_TOKEN)
    }

    // ==========================================
    // Provider credential
    // ==========================================

    pub fn set_provider_session(&self, session: &ProviderSession) -> StorageResult<()> {
        let json = serde_json::to_string(session)?;
        self.storage.set(StorageKeys::PROVIDER_SESSION, &json)
    }

    pub fn get_provider_session(&self) -> StorageResult<Option<ProviderSession>> {
        match self.storage.get(StorageKeys::PROVIDER_SESSION)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn clear_provider_session(&self) -> StorageResult<bool> {
        self.storage.delete(StorageKeys::PROVIDER_SESSION)
    }

    /// Remove every credential. Keeps going after a failed delete and
    /// returns the first error.
    pub fn clear_all(&self) -> StorageResult<()> {
        let mut first_error = None;
        for key in StorageKeys::ALL {
            if let Err(err) = self.storage.delete(key) {
                tracing::warn!(key, error = %err, "failed to clear secure storage key");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for TokenVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVault").finish_non_exhaustive()
    }
}
