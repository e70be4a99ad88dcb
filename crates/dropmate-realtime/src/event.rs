//! Events delivered by the realtime channel.

use dropmate_types::{Coordinates, ShipmentStatus};

/// Event family, used to register handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    ShipmentStatus,
    ShipmentLocation,
    ActorLocation,
    Disconnected,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Connected,
        EventKind::ShipmentStatus,
        EventKind::ShipmentLocation,
        EventKind::ActorLocation,
        EventKind::Disconnected,
        EventKind::Error,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    Connected {
        connection_id: String,
    },
    ShipmentStatusChanged {
        shipment_id: String,
        status: ShipmentStatus,
    },
    ShipmentLocationChanged {
        shipment_id: String,
        coordinates: Coordinates,
    },
    /// A driver (or other moving actor) reported a new position.
    ActorLocationChanged {
        actor_id: String,
        coordinates: Coordinates,
    },
    Disconnected {
        reason: Option<String>,
    },
    Error {
        message: String,
    },
}

impl RealtimeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RealtimeEvent::Connected { .. } => EventKind::Connected,
            RealtimeEvent::ShipmentStatusChanged { .. } => EventKind::ShipmentStatus,
            RealtimeEvent::ShipmentLocationChanged { .. } => EventKind::ShipmentLocation,
            RealtimeEvent::ActorLocationChanged { .. } => EventKind::ActorLocation,
            RealtimeEvent::Disconnected { .. } => EventKind::Disconnected,
            RealtimeEvent::Error { .. } => EventKind::Error,
        }
    }
}
