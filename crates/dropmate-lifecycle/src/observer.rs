//! Lifecycle observer.

use crate::{classify, AppStateSource, Transition};
use dropmate_auth::SessionManager;
use dropmate_config_and_utils::{Listeners, Subscription};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Back in the foreground with an authenticated session.
    Resume,
    /// Left the foreground.
    Suspend,
}

/// Watches an [`AppStateSource`] and emits [`LifecycleEvent`]s.
///
/// The source subscription lives exactly as long as the observer: dropping
/// or detaching it releases the subscription.
pub struct LifecycleObserver {
    events: Arc<Listeners<LifecycleEvent>>,
    source_subscription: Option<Subscription>,
}

impl LifecycleObserver {
    pub fn attach(source: &AppStateSource, session: SessionManager) -> Self {
        let events: Arc<Listeners<LifecycleEvent>> = Arc::new(Listeners::new());
        let emitter = Arc::clone(&events);

        let subscription = source.subscribe(move |change| {
            let event = match classify(change.previous, change.current) {
                Some(Transition::ToForeground) => {
                    if !session.is_authenticated() {
                        debug!("Foregrounded without a session, not resuming");
                        return;
                    }
                    LifecycleEvent::Resume
                }
                Some(Transition::ToBackground) => LifecycleEvent::Suspend,
                None => return,
            };
            info!(event = ?event, previous = %change.previous, current = %change.current, "Lifecycle transition");
            emitter.emit(&event);
        });

        Self {
            events,
            source_subscription: Some(subscription),
        }
    }

    pub fn on_event<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn is_attached(&self) -> bool {
        self.source_subscription.is_some()
    }

    /// Stop observing the source. Handlers stay registered but will not be
    /// called again.
    pub fn detach(&mut self) {
        if let Some(subscription) = self.source_subscription.take() {
            subscription.unsubscribe();
            debug!("Lifecycle observer detached");
        }
    }
}
