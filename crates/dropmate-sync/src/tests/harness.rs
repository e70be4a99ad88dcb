use crate::CacheReconciler;
use dropmate_auth::{MemoryIdentityProvider, SessionManager};
use dropmate_cache::{driver_keys, shipment_keys, CacheKey, QueryCache};
use dropmate_lifecycle::{AppState, AppStateSource};
use dropmate_realtime::{ChannelController, LoopbackTransport};
use dropmate_storage::TokenVault;
use dropmate_types::{Credentials, Identity, ListFilters, ShipmentStatus};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

pub const EMAIL: &str = "rider@example.com";
pub const PASSWORD: &str = "secret1";
pub const OTHER_EMAIL: &str = "dispatcher@example.com";

pub struct SyncHarness {
    pub provider: Arc<MemoryIdentityProvider>,
    pub transport: Arc<LoopbackTransport>,
    pub session: SessionManager,
    pub controller: ChannelController,
    pub cache: QueryCache,
    pub reconciler: CacheReconciler,
    pub app_state: AppStateSource,
}

impl SyncHarness {
    pub fn new() -> Self {
        let provider = Arc::new(
            MemoryIdentityProvider::new()
                .with_account(EMAIL, PASSWORD, "u1")
                .with_account(OTHER_EMAIL, PASSWORD, "u2"),
        );
        let transport = Arc::new(LoopbackTransport::new());
        let session = SessionManager::new(provider.clone(), TokenVault::in_memory());
        let controller = ChannelController::new(transport.clone(), session.clone());
        let cache = QueryCache::new();
        let reconciler = CacheReconciler::new(cache.clone());
        Self {
            provider,
            transport,
            session,
            controller,
            cache,
            reconciler,
            app_state: AppStateSource::new(AppState::Active),
        }
    }

    /// Harness whose session was restored from the provider.
    pub async fn signed_in() -> Self {
        let harness = Self::new();
        harness.provider.sign_in_as(Identity::new("u1"));
        harness.session.hydrate().await.unwrap();
        harness
    }

    pub async fn sign_in(&self) {
        self.sign_in_as(EMAIL).await;
    }

    pub async fn sign_in_as(&self, email: &str) {
        self.session
            .sign_in(&Credentials::new(email, PASSWORD))
            .await
            .unwrap();
    }

    pub fn all_lists() -> ListFilters {
        ListFilters::default()
    }

    pub fn delivered_lists() -> ListFilters {
        ListFilters::new(Some("shoes"), Some(ShipmentStatus::Delivered))
    }

    /// Fill the cache with two list views plus detail and route entries for
    /// `abc123` and `xyz789`, and one driver entry.
    pub fn seed_cache(&self) {
        for key in Self::seeded_keys() {
            self.cache.write(key, json!({"seeded": true}));
        }
    }

    pub fn seeded_keys() -> Vec<CacheKey> {
        vec![
            shipment_keys::list(&Self::all_lists()),
            shipment_keys::list(&Self::delivered_lists()),
            shipment_keys::detail("abc123"),
            shipment_keys::route("abc123"),
            shipment_keys::detail("xyz789"),
            shipment_keys::route("xyz789"),
            driver_keys::detail("d1"),
        ]
    }

    pub fn stale_keys(&self) -> BTreeSet<CacheKey> {
        self.cache
            .keys()
            .into_iter()
            .filter(|key| self.cache.is_stale(key) == Some(true))
            .collect()
    }
}

/// Poll `condition` until it holds or a second has passed.
pub async fn eventually<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

pub fn keys<I: IntoIterator<Item = CacheKey>>(keys: I) -> BTreeSet<CacheKey> {
    keys.into_iter().collect()
}
