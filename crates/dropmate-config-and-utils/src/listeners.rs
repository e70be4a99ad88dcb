//! Callback registry with drop-to-unsubscribe handles.
//!
//! Every observable piece of state in the sync core (session changes,
//! realtime events, cache invalidations, app-state transitions) is published
//! through a [`Listeners`] hub. Handlers run synchronously on the emitting
//! task, in registration order.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
}

/// A set of handlers for values of type `T`.
pub struct Listeners<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> Listeners<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    /// Register a handler. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.handlers.push((id, Arc::new(handler)));
            id
        };

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    registry.lock().handlers.retain(|(hid, _)| *hid != id);
                }
            })),
        }
    }

    /// Call every registered handler with `value`.
    ///
    /// Handlers are snapshotted first, so a handler may subscribe or
    /// unsubscribe without deadlocking.
    pub fn emit(&self, value: &T) {
        let handlers: Vec<Handler<T>> = self
            .registry
            .lock()
            .handlers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            handler(value);
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.registry.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle that removes its handler when dropped.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Remove the handler now. Equivalent to dropping the handle.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn subscribe_and_emit() {
        let listeners = Listeners::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let _sub = listeners.subscribe(move |value| sink.lock().push(*value));

        listeners.emit(&1);
        listeners.emit(&2);

        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let listeners = Listeners::<()>::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&order);
        let _a = listeners.subscribe(move |_| first.lock().push("a"));
        let second = Arc::clone(&order);
        let _b = listeners.subscribe(move |_| second.lock().push("b"));

        listeners.emit(&());
        assert_eq!(*order.lock(), vec!["a", "b"]);
    }

    #[test]
    fn dropping_subscription_removes_handler() {
        let listeners = Listeners::<u32>::new();
        let count = Arc::new(AtomicUsize::new(0));

        {
            let counter = Arc::clone(&count);
            let _sub = listeners.subscribe(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            assert_eq!(listeners.len(), 1);
            listeners.emit(&0);
        }

        assert!(listeners.is_empty());
        listeners.emit(&0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_unsubscribe() {
        let listeners = Listeners::<u32>::new();
        let sub = listeners.subscribe(|_| {});
        sub.unsubscribe();
        assert!(listeners.is_empty());
    }

    #[test]
    fn subscription_outliving_hub_is_harmless() {
        let listeners = Listeners::<u32>::new();
        let sub = listeners.subscribe(|_| {});
        drop(listeners);
        drop(sub);
    }

    #[test]
    fn handler_may_subscribe_during_emit() {
        let listeners = Arc::new(Listeners::<u32>::new());
        let held = Arc::new(Mutex::new(Vec::new()));

        let hub = Arc::clone(&listeners);
        let store = Arc::clone(&held);
        let _sub = listeners.subscribe(move |_| {
            store.lock().push(hub.subscribe(|_| {}));
        });

        listeners.emit(&0);
        assert_eq!(listeners.len(), 2);
    }
}
