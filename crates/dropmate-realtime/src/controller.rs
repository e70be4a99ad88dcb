//! Realtime channel lifecycle.

use crate::{
    ChannelCredentials, ChannelTransport, EventKind, RealtimeEvent, RealtimeResult,
};
use dropmate_auth::SessionManager;
use dropmate_config_and_utils::{Listeners, Subscription};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Reason reported when the client closes the channel itself.
pub const CLIENT_DISCONNECT_REASON: &str = "io client disconnect";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// Snapshot of the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConnection {
    pub connection_id: Option<String>,
    pub is_connected: bool,
}

struct LinkState {
    phase: ChannelState,
    connection_id: Option<String>,
    /// User whose credentials opened the current connection.
    user_id: Option<String>,
    /// Bumped on every connect and disconnect; events from an older
    /// generation are dropped.
    generation: u64,
    shutdown: Option<oneshot::Sender<()>>,
    pump: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct EventHandlers {
    connected: Listeners<RealtimeEvent>,
    shipment_status: Listeners<RealtimeEvent>,
    shipment_location: Listeners<RealtimeEvent>,
    actor_location: Listeners<RealtimeEvent>,
    disconnected: Listeners<RealtimeEvent>,
    error: Listeners<RealtimeEvent>,
}

impl EventHandlers {
    fn for_kind(&self, kind: EventKind) -> &Listeners<RealtimeEvent> {
        match kind {
            EventKind::Connected => &self.connected,
            EventKind::ShipmentStatus => &self.shipment_status,
            EventKind::ShipmentLocation => &self.shipment_location,
            EventKind::ActorLocation => &self.actor_location,
            EventKind::Disconnected => &self.disconnected,
            EventKind::Error => &self.error,
        }
    }
}

struct ControllerInner {
    transport: Arc<dyn ChannelTransport>,
    session: SessionManager,
    /// Serializes connect and disconnect.
    gate: tokio::sync::Mutex<()>,
    state: Mutex<LinkState>,
    handlers: EventHandlers,
}

impl ControllerInner {
    fn dispatch(&self, event: &RealtimeEvent) {
        self.handlers.for_kind(event.kind()).emit(event);
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.state.lock();
        state.generation == generation && state.phase == ChannelState::Connected
    }

    /// The transport reported the connection gone.
    fn connection_lost(&self, generation: u64, reason: Option<String>) {
        {
            let mut state = self.state.lock();
            if state.generation != generation || state.phase != ChannelState::Connected {
                return;
            }
            state.phase = ChannelState::Disconnected;
            state.connection_id = None;
            state.user_id = None;
            state.shutdown = None;
            state.pump = None;
        }
        info!(reason = ?reason, "Realtime channel lost");
        self.dispatch(&RealtimeEvent::Disconnected { reason });
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(shutdown) = state.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(pump) = state.pump.take() {
            pump.abort();
        }
    }
}

/// Owns the realtime connection.
///
/// At most one connection exists at a time. Connecting requires an
/// authenticated session; events are dispatched to handlers registered per
/// [`EventKind`], in arrival order. Clones share the connection.
#[derive(Clone)]
pub struct ChannelController {
    inner: Arc<ControllerInner>,
}

impl ChannelController {
    pub fn new(transport: Arc<dyn ChannelTransport>, session: SessionManager) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                transport,
                session,
                gate: tokio::sync::Mutex::new(()),
                state: Mutex::new(LinkState {
                    phase: ChannelState::Disconnected,
                    connection_id: None,
                    user_id: None,
                    generation: 0,
                    shutdown: None,
                    pump: None,
                }),
                handlers: EventHandlers::default(),
            }),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.inner.state.lock().phase
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    pub fn connection(&self) -> ChannelConnection {
        let state = self.inner.state.lock();
        ChannelConnection {
            connection_id: state.connection_id.clone(),
            is_connected: state.phase == ChannelState::Connected,
        }
    }

    /// User the open connection was authenticated as.
    pub fn connected_user(&self) -> Option<String> {
        let state = self.inner.state.lock();
        match state.phase {
            ChannelState::Connected => state.user_id.clone(),
            _ => None,
        }
    }

    /// Register a handler for one kind of event.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&RealtimeEvent) + Send + Sync + 'static,
    {
        self.inner.handlers.for_kind(kind).subscribe(handler)
    }

    /// Open the channel.
    ///
    /// Does nothing when already connected, or when the session is not
    /// authenticated. A failed handshake dispatches an `Error` event, leaves
    /// the channel disconnected and is not retried.
    pub async fn connect(&self) -> RealtimeResult<()> {
        let _gate = self.inner.gate.lock().await;
        if self.state() == ChannelState::Connected {
            debug!("Realtime channel already connected");
            return Ok(());
        }

        let session = self.inner.session.snapshot();
        let user_id = match session.user_id() {
            Some(uid) if session.is_authenticated() => uid.to_string(),
            _ => {
                debug!("Not authenticated, skipping realtime connect");
                return Ok(());
            }
        };

        self.inner.state.lock().phase = ChannelState::Connecting;
        let _connecting = ConnectingGuard(&self.inner.state);

        let token = match self.inner.session.get_token(false).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("No token available, skipping realtime connect");
                self.inner.state.lock().phase = ChannelState::Disconnected;
                return Ok(());
            }
            Err(e) => {
                self.inner.state.lock().phase = ChannelState::Disconnected;
                warn!(error = %e, "Could not obtain token for realtime channel");
                self.inner.dispatch(&RealtimeEvent::Error {
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let credentials = ChannelCredentials { token, user_id };
        let link = match self.inner.transport.open(&credentials).await {
            Ok(link) => link,
            Err(e) => {
                self.inner.state.lock().phase = ChannelState::Disconnected;
                warn!(error = %e, "Realtime connect failed");
                self.inner.dispatch(&RealtimeEvent::Error {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let connection_id = link.connection_id.clone();
        {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.phase = ChannelState::Connected;
            state.connection_id = Some(connection_id.clone());
            state.user_id = Some(credentials.user_id.clone());
            state.shutdown = Some(link.shutdown);
            state.pump = Some(tokio::spawn(pump(
                Arc::downgrade(&self.inner),
                state.generation,
                link.events,
            )));
        }

        info!(connection_id = %connection_id, user_id = %credentials.user_id, "Realtime channel connected");
        self.inner
            .dispatch(&RealtimeEvent::Connected { connection_id });
        Ok(())
    }

    /// Close the channel. Does nothing when already disconnected.
    pub async fn disconnect(&self) {
        let _gate = self.inner.gate.lock().await;
        let (shutdown, pump) = {
            let mut state = self.inner.state.lock();
            if state.phase == ChannelState::Disconnected {
                return;
            }
            state.generation += 1;
            state.phase = ChannelState::Disconnected;
            state.connection_id = None;
            state.user_id = None;
            (state.shutdown.take(), state.pump.take())
        };

        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(());
        }
        if let Some(pump) = pump {
            pump.abort();
        }

        info!("Realtime channel disconnected");
        self.inner.dispatch(&RealtimeEvent::Disconnected {
            reason: Some(CLIENT_DISCONNECT_REASON.to_string()),
        });
    }
}

/// Resets a `Connecting` phase when `connect()` is dropped before it
/// finishes.
struct ConnectingGuard<'a>(&'a Mutex<LinkState>);

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        if state.phase == ChannelState::Connecting {
            state.phase = ChannelState::Disconnected;
        }
    }
}

async fn pump(
    inner: Weak<ControllerInner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<RealtimeEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(controller) = inner.upgrade() else {
            return;
        };
        if !controller.is_current(generation) {
            debug!(generation, "Dropping event from superseded connection");
            return;
        }
        match event {
            RealtimeEvent::Disconnected { reason } => {
                controller.connection_lost(generation, reason);
                return;
            }
            // Connection acknowledgements are dispatched by connect().
            RealtimeEvent::Connected { .. } => {}
            event => controller.dispatch(&event),
        }
    }

    if let Some(controller) = inner.upgrade() {
        controller.connection_lost(generation, None);
    }
}
