//! Realtime channel for shipment updates.
//!
//! This crate provides:
//! - [`RealtimeEvent`]: the closed set of events the channel delivers
//! - The JSON wire protocol (`{"event": ..., "data": ...}` frames)
//! - [`ChannelTransport`] with a WebSocket implementation and an in-process
//!   loopback
//! - [`ChannelController`]: idempotent connect/disconnect gated on the
//!   session, with per-kind event handlers

mod controller;
mod error;
mod event;
mod loopback;
mod messages;
mod transport;
mod websocket;

pub use controller::{ChannelConnection, ChannelController, ChannelState, CLIENT_DISCONNECT_REASON};
pub use error::{RealtimeError, RealtimeResult};
pub use event::{EventKind, RealtimeEvent};
pub use loopback::LoopbackTransport;
pub use messages::{ClientFrame, ServerFrame};
pub use transport::{ChannelCredentials, ChannelLink, ChannelTransport};
pub use websocket::{WebSocketConfig, WebSocketTransport};
