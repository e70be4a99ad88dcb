//! Realtime event to cache invalidation mapping.

use dropmate_cache::{driver_keys, shipment_keys, CacheKey, QueryCache};
use dropmate_realtime::RealtimeEvent;
use tracing::debug;

/// Applies server-pushed changes to the read cache.
///
/// Invalidation is set-based: only the entries an event can affect are
/// marked stale, and every application returns the keys it newly staled.
#[derive(Clone)]
pub struct CacheReconciler {
    cache: QueryCache,
}

impl CacheReconciler {
    pub fn new(cache: QueryCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn apply(&self, event: &RealtimeEvent) -> Vec<CacheKey> {
        let touched = match event {
            RealtimeEvent::ShipmentStatusChanged { shipment_id, .. } => {
                self.shipment_changed(shipment_id)
            }
            RealtimeEvent::ShipmentLocationChanged { shipment_id, .. } => {
                self.shipment_moved(shipment_id)
            }
            RealtimeEvent::ActorLocationChanged { actor_id, .. } => self
                .cache
                .invalidate(&driver_keys::detail(actor_id))
                .then(|| driver_keys::detail(actor_id))
                .into_iter()
                .collect(),
            RealtimeEvent::Connected { .. }
            | RealtimeEvent::Disconnected { .. }
            | RealtimeEvent::Error { .. } => Vec::new(),
        };

        debug!(kind = ?event.kind(), touched = touched.len(), "Applied realtime event");
        touched
    }

    /// App came back to the foreground: every list view may be out of date.
    pub fn on_resume(&self) -> Vec<CacheKey> {
        let touched = self.cache.invalidate_prefix(&shipment_keys::lists());
        debug!(touched = touched.len(), "Invalidated shipment lists on resume");
        touched
    }

    /// A push notification mentioned `shipment_id`.
    pub fn apply_push_notice(&self, shipment_id: &str) -> Vec<CacheKey> {
        let touched = self.shipment_changed(shipment_id);
        debug!(shipment_id = %shipment_id, touched = touched.len(), "Applied push notice");
        touched
    }

    fn shipment_changed(&self, shipment_id: &str) -> Vec<CacheKey> {
        let mut touched = self.cache.invalidate_prefix(&shipment_keys::lists());
        touched.extend(self.shipment_moved(shipment_id));
        touched
    }

    fn shipment_moved(&self, shipment_id: &str) -> Vec<CacheKey> {
        [
            shipment_keys::detail(shipment_id),
            shipment_keys::route(shipment_id),
        ]
        .into_iter()
        .filter(|key| self.cache.invalidate(key))
        .collect()
    }
}
