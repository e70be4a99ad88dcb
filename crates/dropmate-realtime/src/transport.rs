//! Channel transport seam.

use crate::{RealtimeEvent, RealtimeResult};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// What the channel authenticates with.
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelCredentials {
    pub token: String,
    pub user_id: String,
}

impl std::fmt::Debug for ChannelCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelCredentials")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// An established channel.
///
/// Events arrive on `events` in the order the server sent them. The stream
/// ends when the connection is gone. Sending on (or dropping) `shutdown`
/// closes the connection from the client side.
#[derive(Debug)]
pub struct ChannelLink {
    pub connection_id: String,
    pub events: mpsc::UnboundedReceiver<RealtimeEvent>,
    pub shutdown: oneshot::Sender<()>,
}

/// Opens realtime channels.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Connect and authenticate. Resolves once the server has acknowledged
    /// the connection; the acknowledgement itself is not put on the event
    /// stream.
    async fn open(&self, credentials: &ChannelCredentials) -> RealtimeResult<ChannelLink>;
}
