//! In-memory query cache.

use crate::{CacheError, CacheKey, CacheResult};
use chrono::{DateTime, Utc};
use dropmate_config_and_utils::{Listeners, Subscription};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A cached payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    pub stale: bool,
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Usable without a refetch: not invalidated and, when `max_age` is set,
    /// written less than `max_age` ago.
    pub fn is_fresh(&self, max_age: Option<Duration>, now: DateTime<Utc>) -> bool {
        if self.stale {
            return false;
        }
        match max_age {
            None => true,
            Some(max_age) => now
                .signed_duration_since(self.updated_at)
                .to_std()
                .map(|age| age < max_age)
                .unwrap_or(true),
        }
    }
}

/// Fetches running for one key, and how often the key was invalidated
/// while any of them ran.
#[derive(Default)]
struct InFlight {
    fetchers: usize,
    invalidations: u64,
}

struct CacheInner {
    entries: RwLock<BTreeMap<CacheKey, CacheEntry>>,
    /// Lock order: `entries` before `in_flight`.
    in_flight: Mutex<BTreeMap<CacheKey, InFlight>>,
    invalidations: Listeners<CacheKey>,
}

/// Registers a running fetch for the lifetime of the value.
struct FetchTicket<'a> {
    inner: &'a CacheInner,
    key: CacheKey,
    seen: u64,
}

impl<'a> FetchTicket<'a> {
    fn begin(inner: &'a CacheInner, key: &CacheKey) -> Self {
        let mut in_flight = inner.in_flight.lock();
        let slot = in_flight.entry(key.clone()).or_default();
        slot.fetchers += 1;
        Self {
            inner,
            key: key.clone(),
            seen: slot.invalidations,
        }
    }

    fn invalidated(&self) -> bool {
        self.inner
            .in_flight
            .lock()
            .get(&self.key)
            .is_some_and(|slot| slot.invalidations != self.seen)
    }
}

impl Drop for FetchTicket<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.inner.in_flight.lock();
        if let Some(slot) = in_flight.get_mut(&self.key) {
            slot.fetchers -= 1;
            if slot.fetchers == 0 {
                in_flight.remove(&self.key);
            }
        }
    }
}

/// Shared handle to the cache. Clones share entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: RwLock::new(BTreeMap::new()),
                in_flight: Mutex::new(BTreeMap::new()),
                invalidations: Listeners::new(),
            }),
        }
    }

    pub fn read(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.entries.read().get(key).cloned()
    }

    /// Decode the cached payload regardless of staleness.
    pub fn read_as<T: DeserializeOwned>(&self, key: &CacheKey) -> CacheResult<Option<T>> {
        match self.read(key) {
            Some(entry) => Ok(Some(serde_json::from_value(entry.value)?)),
            None => Ok(None),
        }
    }

    /// Store `value` as a fresh entry, superseding any previous one.
    pub fn write(&self, key: CacheKey, value: Value) {
        debug!(key = %key, "Cache write");
        self.inner.entries.write().insert(
            key,
            CacheEntry {
                value,
                stale: false,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn write_as<T: Serialize>(&self, key: CacheKey, value: &T) -> CacheResult<()> {
        self.write(key, serde_json::to_value(value)?);
        Ok(())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.entries.read().contains_key(key)
    }

    /// `None` when the key has no entry.
    pub fn is_stale(&self, key: &CacheKey) -> Option<bool> {
        self.inner.entries.read().get(key).map(|entry| entry.stale)
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.inner.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Mark one entry stale. Returns true only if it was fresh before, so
    /// repeated invalidation is a no-op.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let newly_stale = {
            let mut entries = self.inner.entries.write();
            if let Some(slot) = self.inner.in_flight.lock().get_mut(key) {
                slot.invalidations += 1;
            }
            match entries.get_mut(key) {
                Some(entry) if !entry.stale => {
                    entry.stale = true;
                    true
                }
                _ => false,
            }
        };
        if newly_stale {
            debug!(key = %key, "Cache entry invalidated");
            self.inner.invalidations.emit(key);
        }
        newly_stale
    }

    /// Mark every entry under `prefix` stale and return the keys that were
    /// fresh before.
    pub fn invalidate_prefix(&self, prefix: &CacheKey) -> Vec<CacheKey> {
        let touched: Vec<CacheKey> = {
            let mut entries = self.inner.entries.write();
            self.inner
                .in_flight
                .lock()
                .range_mut(prefix.clone()..)
                .take_while(|(key, _)| key.starts_with(prefix))
                .for_each(|(_, slot)| slot.invalidations += 1);
            entries
                .range_mut(prefix.clone()..)
                .take_while(|(key, _)| key.starts_with(prefix))
                .filter(|(_, entry)| !entry.stale)
                .map(|(key, entry)| {
                    entry.stale = true;
                    key.clone()
                })
                .collect()
        };

        if !touched.is_empty() {
            debug!(prefix = %prefix, count = touched.len(), "Cache prefix invalidated");
        }
        for key in &touched {
            self.inner.invalidations.emit(key);
        }
        touched
    }

    /// Observe every key that becomes stale.
    pub fn on_invalidate<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&CacheKey) + Send + Sync + 'static,
    {
        self.inner.invalidations.subscribe(handler)
    }

    /// Read-through fetch.
    ///
    /// A fresh entry is decoded and returned without calling `fetch`. A
    /// missing, stale, expired or undecodable entry is fetched and written
    /// back. Fetch errors are returned as-is and leave the cache untouched.
    ///
    /// If the key is invalidated while `fetch` runs, the result is written
    /// back already stale so the next read fetches again.
    pub async fn fetch_with<T, E, F, Fut>(
        &self,
        key: CacheKey,
        max_age: Option<Duration>,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(entry) = self.read(&key) {
            if entry.is_fresh(max_age, Utc::now()) {
                match serde_json::from_value::<T>(entry.value) {
                    Ok(value) => {
                        debug!(key = %key, "Cache hit");
                        return Ok(value);
                    }
                    Err(e) => debug!(key = %key, error = %e, "Cached payload undecodable, refetching"),
                }
            }
        }

        debug!(key = %key, "Cache miss, fetching");
        let ticket = FetchTicket::begin(&self.inner, &key);
        let value = fetch().await?;
        let payload = serde_json::to_value(&value).map_err(CacheError::from)?;

        let mut entries = self.inner.entries.write();
        let stale = ticket.invalidated();
        if stale {
            debug!(key = %key, "Invalidated during fetch, keeping result stale");
        }
        entries.insert(
            key,
            CacheEntry {
                value: payload,
                stale,
                updated_at: Utc::now(),
            },
        );
        drop(entries);
        drop(ticket);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{driver_keys, shipment_keys};
    use dropmate_types::ListFilters;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn seeded() -> QueryCache {
        let cache = QueryCache::new();
        cache.write(shipment_keys::list(&ListFilters::default()), json!([]));
        cache.write(
            shipment_keys::list(&ListFilters::new(Some("box"), None)),
            json!([]),
        );
        cache.write(shipment_keys::detail("a"), json!({"id": "a"}));
        cache.write(shipment_keys::route("a"), json!({"coordinates": []}));
        cache.write(shipment_keys::detail("b"), json!({"id": "b"}));
        cache.write(driver_keys::detail("d1"), json!({"id": "d1"}));
        cache
    }

    #[test]
    fn test_write_and_read() {
        let cache = QueryCache::new();
        let key = shipment_keys::detail("a");
        cache.write(key.clone(), json!({"id": "a"}));

        let entry = cache.read(&key).unwrap();
        assert_eq!(entry.value, json!({"id": "a"}));
        assert!(!entry.stale);
        assert_eq!(cache.is_stale(&key), Some(false));
        assert_eq!(cache.is_stale(&shipment_keys::detail("zzz")), None);
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let cache = seeded();
        let key = shipment_keys::detail("a");

        assert!(cache.invalidate(&key));
        assert!(!cache.invalidate(&key));
        assert!(!cache.invalidate(&shipment_keys::detail("missing")));
        assert_eq!(cache.is_stale(&key), Some(true));
    }

    #[test]
    fn test_invalidate_prefix_scopes_to_lists() {
        let cache = seeded();

        let touched = cache.invalidate_prefix(&shipment_keys::lists());
        assert_eq!(touched.len(), 2);
        assert!(touched.iter().all(|k| k.starts_with(&shipment_keys::lists())));
        assert_eq!(cache.is_stale(&shipment_keys::detail("a")), Some(false));
        assert_eq!(cache.is_stale(&driver_keys::detail("d1")), Some(false));

        assert!(cache.invalidate_prefix(&shipment_keys::lists()).is_empty());
    }

    #[test]
    fn test_rewrite_clears_staleness() {
        let cache = seeded();
        let key = shipment_keys::detail("a");
        cache.invalidate(&key);

        cache.write(key.clone(), json!({"id": "a", "v": 2}));
        assert_eq!(cache.is_stale(&key), Some(false));
        assert!(cache.invalidate(&key));
    }

    #[test]
    fn test_on_invalidate_reports_newly_stale_keys() {
        let cache = seeded();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = cache.on_invalidate(move |key| sink.lock().push(key.to_string()));

        cache.invalidate(&shipment_keys::detail("b"));
        cache.invalidate(&shipment_keys::detail("b"));
        assert_eq!(*seen.lock(), vec!["(shipment, detail, b)".to_string()]);

        drop(sub);
        cache.invalidate(&shipment_keys::detail("a"));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_entry_freshness_with_max_age() {
        let now = Utc::now();
        let entry = CacheEntry {
            value: Value::Null,
            stale: false,
            updated_at: now - chrono::Duration::seconds(20),
        };
        assert!(entry.is_fresh(None, now));
        assert!(!entry.is_fresh(Some(Duration::from_secs(15)), now));
        assert!(entry.is_fresh(Some(Duration::from_secs(30)), now));

        let stale = CacheEntry { stale: true, ..entry };
        assert!(!stale.is_fresh(None, now));
    }

    #[tokio::test]
    async fn test_fetch_with_reads_through() {
        let cache = QueryCache::new();
        let key = shipment_keys::detail("a");
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let fetch = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CacheError>(json!({"id": "a"}))
        };

        let first: Value = cache.fetch_with(key.clone(), None, fetch).await.unwrap();
        let second: Value = cache.fetch_with(key.clone(), None, fetch).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate(&key);
        let _: Value = cache.fetch_with(key.clone(), None, fetch).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.is_stale(&key), Some(false));
    }

    #[tokio::test]
    async fn test_invalidation_during_fetch_keeps_result_stale() {
        let cache = seeded();
        let key = shipment_keys::detail("a");
        cache.invalidate(&key);

        let (release, released) = tokio::sync::oneshot::channel::<()>();
        let fetch = cache.fetch_with(key.clone(), None, move || async move {
            let _ = released.await;
            Ok::<_, CacheError>(json!({"id": "a", "status": "IN_TRANSIT"}))
        });
        let invalidate = async {
            cache.invalidate(&key);
            let _ = release.send(());
        };
        let (fetched, ()) = tokio::join!(fetch, invalidate);

        assert_eq!(fetched.unwrap(), json!({"id": "a", "status": "IN_TRANSIT"}));
        assert_eq!(cache.is_stale(&key), Some(true));

        let refetched: Value = cache
            .fetch_with(key.clone(), None, || async {
                Ok::<_, CacheError>(json!({"id": "a", "status": "DELIVERED"}))
            })
            .await
            .unwrap();
        assert_eq!(refetched["status"], "DELIVERED");
        assert_eq!(cache.is_stale(&key), Some(false));
        assert!(cache.inner.in_flight.lock().is_empty());
    }

    #[tokio::test]
    async fn test_prefix_invalidation_during_first_fetch() {
        let cache = QueryCache::new();
        let key = shipment_keys::list(&ListFilters::default());

        let (release, released) = tokio::sync::oneshot::channel::<()>();
        let fetch = cache.fetch_with(key.clone(), None, move || async move {
            let _ = released.await;
            Ok::<_, CacheError>(json!([]))
        });
        let invalidate = async {
            assert!(cache.invalidate_prefix(&shipment_keys::lists()).is_empty());
            let _ = release.send(());
        };
        let (fetched, ()) = tokio::join!(fetch, invalidate);

        fetched.unwrap();
        assert_eq!(cache.is_stale(&key), Some(true));
    }

    #[tokio::test]
    async fn test_fetch_error_leaves_cache_untouched() {
        #[derive(Debug)]
        struct Failed;
        impl From<CacheError> for Failed {
            fn from(_: CacheError) -> Self {
                Failed
            }
        }

        let cache = QueryCache::new();
        let key = shipment_keys::route("a");
        let result: Result<Value, Failed> = cache
            .fetch_with(key.clone(), None, || async { Err(Failed) })
            .await;
        assert!(result.is_err());
        assert!(!cache.contains(&key));
        assert!(cache.inner.in_flight.lock().is_empty());
    }
}
