//! Secure key/value storage for session credentials.
//!
//! Backends:
//! - [`MemoryStorage`]: process-local, used by tests and ephemeral hosts
//! - [`FileStorage`]: JSON map on disk, owner-only permissions on unix

mod file;
mod keys;
mod memory;
mod traits;
mod vault;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::SecureStorage;
pub use vault::{ProviderSession, TokenVault};

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Open the file-backed store at `path` and wrap it in a [`TokenVault`].
pub fn open_file_vault(path: impl Into<std::path::PathBuf>) -> StorageResult<TokenVault> {
    let storage = FileStorage::open(path)?;
    Ok(TokenVault::new(std::sync::Arc::new(storage)))
}
