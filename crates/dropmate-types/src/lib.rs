//! Domain types for the Dropmate sync core.
//!
//! Data and serialization only. Field names follow the backend's camelCase
//! JSON so payloads can be cached and decoded without translation.

mod identity;
mod shipment;

pub use identity::{Credentials, Identity};
pub use shipment::{
    Checkpoint, Coordinates, CreateShipmentInput, ListFilters, Shipment, ShipmentRoute,
    ShipmentStatus,
};
