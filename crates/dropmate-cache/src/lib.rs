//! Local read cache for the Dropmate sync core.
//!
//! Entries are keyed by composite [`CacheKey`]s, hold the last server-shaped
//! payload, and carry a staleness flag. Nothing is ever evicted here; the
//! reconciler marks entries stale and readers refetch.

mod key;
mod store;

pub use key::{driver_keys, shipment_keys, CacheKey};
pub use store::{CacheEntry, QueryCache};

use thiserror::Error;

/// Cache error type.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cached payload could not be encoded or decoded
    #[error("Cache encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Result type alias using CacheError.
pub type CacheResult<T> = Result<T, CacheError>;
