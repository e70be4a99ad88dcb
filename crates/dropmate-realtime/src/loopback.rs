//! In-process channel transport.
//!
//! Stands in for the realtime server in offline runs and tests: events are
//! injected with [`LoopbackTransport::push`] and reach the controller exactly
//! as if they had come over the wire.

use crate::{ChannelCredentials, ChannelLink, ChannelTransport, RealtimeError, RealtimeEvent, RealtimeResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct LoopbackState {
    events: Option<mpsc::UnboundedSender<RealtimeEvent>>,
    shutdown: Option<oneshot::Receiver<()>>,
    fail_next: Option<String>,
    delay: Duration,
    last_credentials: Option<ChannelCredentials>,
}

#[derive(Default)]
pub struct LoopbackTransport {
    state: Mutex<LoopbackState>,
    handshakes: AtomicUsize,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handshakes attempted, failed ones included.
    pub fn handshake_count(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    /// Reject the next handshake with `message`.
    pub fn fail_next_handshake(&self, message: &str) {
        self.state.lock().fail_next = Some(message.to_string());
    }

    pub fn set_handshake_delay(&self, delay: Duration) {
        self.state.lock().delay = delay;
    }

    pub fn last_credentials(&self) -> Option<ChannelCredentials> {
        self.state.lock().last_credentials.clone()
    }

    /// Deliver `event` on the current connection. Returns false when there
    /// is no open connection.
    pub fn push(&self, event: RealtimeEvent) -> bool {
        let mut state = self.state.lock();
        if !Self::open_locked(&mut state) {
            return false;
        }
        state
            .events
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Sender for the current connection. Stays usable after the connection
    /// is replaced, which lets tests deliver events on a stale link.
    pub fn sender(&self) -> Option<mpsc::UnboundedSender<RealtimeEvent>> {
        self.state.lock().events.clone()
    }

    /// Drop the current connection from the server side.
    pub fn close_from_server(&self, reason: Option<&str>) {
        let mut state = self.state.lock();
        if let Some(tx) = state.events.take() {
            let _ = tx.send(RealtimeEvent::Disconnected {
                reason: reason.map(str::to_string),
            });
        }
        state.shutdown = None;
    }

    /// Whether a connection is open and the client has not shut it down.
    pub fn is_open(&self) -> bool {
        Self::open_locked(&mut self.state.lock())
    }

    fn open_locked(state: &mut LoopbackState) -> bool {
        let alive = match state.shutdown.as_mut() {
            Some(rx) => matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)),
            None => false,
        };
        alive && state.events.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

#[async_trait]
impl ChannelTransport for LoopbackTransport {
    async fn open(&self, credentials: &ChannelCredentials) -> RealtimeResult<ChannelLink> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.last_credentials = Some(credentials.clone());
        if let Some(message) = state.fail_next.take() {
            return Err(RealtimeError::Handshake(message));
        }

        let (events_tx, events) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        state.events = Some(events_tx);
        state.shutdown = Some(shutdown_rx);

        let connection_id = format!("loop-{}", Uuid::new_v4());
        debug!(connection_id = %connection_id, user_id = %credentials.user_id, "Loopback channel opened");
        Ok(ChannelLink {
            connection_id,
            events,
            shutdown,
        })
    }
}
