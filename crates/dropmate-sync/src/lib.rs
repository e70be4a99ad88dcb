//! Realtime cache sync.
//!
//! [`CacheReconciler`] turns realtime events into cache invalidations, and
//! [`RealtimeSync`] wires the session, the lifecycle observer, the channel
//! controller and the reconciler together for the life of the app.

mod coordinator;
mod reconciler;

#[cfg(test)]
mod tests;

pub use coordinator::{RealtimeSync, SyncHandle};
pub use reconciler::CacheReconciler;
