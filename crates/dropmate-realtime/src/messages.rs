//! Realtime wire protocol.
//!
//! Every frame is a JSON text message `{"event": <name>, "data": {...}}`.
//! Entity ids may arrive as JSON strings or numbers and are normalized to
//! strings.

use crate::{RealtimeError, RealtimeEvent, RealtimeResult};
use dropmate_types::{Coordinates, ShipmentStatus};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientFrame {
    /// First frame on a new socket.
    #[serde(rename = "auth")]
    Auth {
        token: String,
        #[serde(rename = "userId")]
        user_id: String,
    },
    #[serde(rename = "ping")]
    Ping,
}

impl ClientFrame {
    pub fn auth(token: &str, user_id: &str) -> Self {
        ClientFrame::Auth {
            token: token.to_string(),
            user_id: user_id.to_string(),
        }
    }

    pub fn to_json(&self) -> RealtimeResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    Connected {
        socket_id: String,
    },
    ShipmentStatus {
        shipment_id: String,
        status: ShipmentStatus,
    },
    ShipmentLocation {
        shipment_id: String,
        coordinates: Coordinates,
    },
    DriverLocation {
        driver_id: String,
        coordinates: Coordinates,
    },
    Error {
        message: String,
    },
    Pong,
    /// Event name this client does not handle.
    Unknown {
        event: String,
    },
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectedData {
    #[serde(deserialize_with = "wire_id")]
    socket_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusData {
    #[serde(deserialize_with = "wire_id")]
    shipment_id: String,
    status: ShipmentStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShipmentLocationData {
    #[serde(deserialize_with = "wire_id")]
    shipment_id: String,
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriverLocationData {
    #[serde(deserialize_with = "wire_id")]
    driver_id: String,
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct ErrorData {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(serde_json::Number),
}

fn wire_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match WireId::deserialize(deserializer)? {
        WireId::Text(text) => text,
        WireId::Number(number) => number.to_string(),
    })
}

fn payload(event: &'static str) -> impl Fn(serde_json::Error) -> RealtimeError {
    move |e| RealtimeError::Protocol(format!("invalid {event} payload: {e}"))
}

impl ServerFrame {
    pub fn parse(text: &str) -> RealtimeResult<Self> {
        let raw: RawFrame = serde_json::from_str(text)?;

        let frame = match raw.event.as_str() {
            "connected" => {
                let data: ConnectedData =
                    serde_json::from_value(raw.data).map_err(payload("connected"))?;
                ServerFrame::Connected {
                    socket_id: data.socket_id,
                }
            }
            "shipment:status" => {
                let data: StatusData =
                    serde_json::from_value(raw.data).map_err(payload("shipment:status"))?;
                ServerFrame::ShipmentStatus {
                    shipment_id: data.shipment_id,
                    status: data.status,
                }
            }
            "shipment:location" => {
                let data: ShipmentLocationData =
                    serde_json::from_value(raw.data).map_err(payload("shipment:location"))?;
                ServerFrame::ShipmentLocation {
                    shipment_id: data.shipment_id,
                    coordinates: Coordinates::new(data.lat, data.lng),
                }
            }
            "driver:location" => {
                let data: DriverLocationData =
                    serde_json::from_value(raw.data).map_err(payload("driver:location"))?;
                ServerFrame::DriverLocation {
                    driver_id: data.driver_id,
                    coordinates: Coordinates::new(data.lat, data.lng),
                }
            }
            "error" => {
                let data: ErrorData = serde_json::from_value(raw.data).unwrap_or(ErrorData { message: None });
                ServerFrame::Error {
                    message: data.message.unwrap_or_else(|| "Unknown error".to_string()),
                }
            }
            "pong" => ServerFrame::Pong,
            _ => ServerFrame::Unknown { event: raw.event },
        };
        Ok(frame)
    }

    /// Event to dispatch for this frame. Heartbeat replies and unknown events
    /// produce none.
    pub fn into_event(self) -> Option<RealtimeEvent> {
        match self {
            ServerFrame::Connected { socket_id } => Some(RealtimeEvent::Connected {
                connection_id: socket_id,
            }),
            ServerFrame::ShipmentStatus {
                shipment_id,
                status,
            } => Some(RealtimeEvent::ShipmentStatusChanged {
                shipment_id,
                status,
            }),
            ServerFrame::ShipmentLocation {
                shipment_id,
                coordinates,
            } => Some(RealtimeEvent::ShipmentLocationChanged {
                shipment_id,
                coordinates,
            }),
            ServerFrame::DriverLocation {
                driver_id,
                coordinates,
            } => Some(RealtimeEvent::ActorLocationChanged {
                actor_id: driver_id,
                coordinates,
            }),
            ServerFrame::Error { message } => Some(RealtimeEvent::Error { message }),
            ServerFrame::Pong | ServerFrame::Unknown { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_auth_frame() {
        let json = ClientFrame::auth("tok-1", "u1").to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            json!({"event": "auth", "data": {"token": "tok-1", "userId": "u1"}})
        );
    }

    #[test]
    fn test_client_ping_frame() {
        let value: Value = serde_json::from_str(&ClientFrame::Ping.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"event": "ping"}));
    }

    #[test]
    fn test_parse_status_with_numeric_id() {
        let frame = ServerFrame::parse(
            r#"{"event":"shipment:status","data":{"shipmentId":42,"status":"DELIVERED"}}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            ServerFrame::ShipmentStatus {
                shipment_id: "42".into(),
                status: ShipmentStatus::Delivered
            }
        );
    }

    #[test]
    fn test_parse_locations() {
        let frame = ServerFrame::parse(
            r#"{"event":"shipment:location","data":{"shipmentId":"abc123","lat":38.7,"lng":-9.1}}"#,
        )
        .unwrap();
        assert_eq!(
            frame.into_event(),
            Some(RealtimeEvent::ShipmentLocationChanged {
                shipment_id: "abc123".into(),
                coordinates: Coordinates::new(38.7, -9.1)
            })
        );

        let frame = ServerFrame::parse(
            r#"{"event":"driver:location","data":{"driverId":7,"lat":1.5,"lng":2.5}}"#,
        )
        .unwrap();
        assert_eq!(
            frame.into_event(),
            Some(RealtimeEvent::ActorLocationChanged {
                actor_id: "7".into(),
                coordinates: Coordinates::new(1.5, 2.5)
            })
        );
    }

    #[test]
    fn test_parse_connected_and_error() {
        let frame = ServerFrame::parse(r#"{"event":"connected","data":{"socketId":"s-1"}}"#).unwrap();
        assert_eq!(
            frame.into_event(),
            Some(RealtimeEvent::Connected {
                connection_id: "s-1".into()
            })
        );

        let frame = ServerFrame::parse(r#"{"event":"error"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Error {
                message: "Unknown error".into()
            }
        );
    }

    #[test]
    fn test_pong_and_unknown_produce_no_event() {
        assert_eq!(ServerFrame::parse(r#"{"event":"pong"}"#).unwrap().into_event(), None);
        let frame = ServerFrame::parse(r#"{"event":"chat:message","data":{}}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Unknown {
                event: "chat:message".into()
            }
        );
        assert_eq!(frame.into_event(), None);
    }

    #[test]
    fn test_parse_rejects_malformed_payload() {
        let err = ServerFrame::parse(r#"{"event":"shipment:status","data":{"status":"DELIVERED"}}"#)
            .unwrap_err();
        assert!(matches!(err, RealtimeError::Protocol(_)));
        assert!(ServerFrame::parse("not json").is_err());
    }
}
