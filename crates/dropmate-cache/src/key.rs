//! Composite cache keys.

use dropmate_types::ListFilters;
use std::fmt;

/// Ordered tuple of key parts, e.g. `(shipment, detail, abc123)`.
///
/// Keys compare part-wise, so every key sharing a prefix sorts together and
/// [`CacheKey::starts_with`] selects a whole namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    parts: Vec<String>,
}

impl CacheKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Entity type, the first part of the key.
    pub fn namespace(&self) -> Option<&str> {
        self.parts.first().map(String::as_str)
    }

    /// Whether `prefix` matches this key part-wise. Every key starts with
    /// itself.
    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        self.parts.starts_with(&prefix.parts)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.parts.join(", "))
    }
}

/// Keys for shipment entries.
pub mod shipment_keys {
    use super::*;

    pub const NAMESPACE: &str = "shipment";

    /// Prefix of every shipment entry.
    pub fn all() -> CacheKey {
        CacheKey::new([NAMESPACE])
    }

    /// Prefix of every shipment list view.
    pub fn lists() -> CacheKey {
        CacheKey::new([NAMESPACE, "list"])
    }

    pub fn list(filters: &ListFilters) -> CacheKey {
        CacheKey::new([
            NAMESPACE,
            "list",
            filters.query_or_all(),
            filters.status_or_all(),
        ])
    }

    pub fn detail(id: &str) -> CacheKey {
        CacheKey::new([NAMESPACE, "detail", id])
    }

    pub fn route(id: &str) -> CacheKey {
        CacheKey::new([NAMESPACE, "route", id])
    }
}

/// Keys for driver entries.
pub mod driver_keys {
    use super::*;

    pub const NAMESPACE: &str = "driver";

    pub fn all() -> CacheKey {
        CacheKey::new([NAMESPACE])
    }

    pub fn detail(id: &str) -> CacheKey {
        CacheKey::new([NAMESPACE, id])
    }
}
