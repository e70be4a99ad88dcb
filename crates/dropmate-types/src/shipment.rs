use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery status of a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Created,
    InTransit,
    OutForDelivery,
    Delivered,
    Exception,
    /// Any status this build does not know about.
    #[serde(other)]
    Unknown,
}

impl ShipmentStatus {
    /// Wire spelling, e.g. `OUT_FOR_DELIVERY`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::InTransit => "IN_TRANSIT",
            Self::OutForDelivery => "OUT_FOR_DELIVERY",
            Self::Delivered => "DELIVERED",
            Self::Exception => "EXCEPTION",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Label shown to users.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created => "Label created",
            Self::InTransit => "In transit",
            Self::OutForDelivery => "Out for delivery",
            Self::Delivered => "Delivered",
            Self::Exception => "Exception",
            Self::Unknown => "Unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point on a map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// One step in a shipment's tracking history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub code: ShipmentStatus,
    pub label: String,
    #[serde(rename = "timeIso")]
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub id: String,
    pub tracking_no: String,
    pub carrier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    pub status: ShipmentStatus,
    #[serde(rename = "lastUpdatedIso")]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentRoute {
    #[serde(default)]
    pub coordinates: Vec<Coordinates>,
    #[serde(rename = "etaIso", default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<DateTime<Utc>>,
}

/// Filters for listing shipments.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ShipmentStatus>,
}

impl ListFilters {
    /// Filters with the query trimmed and blank queries dropped.
    pub fn new(query: Option<&str>, status: Option<ShipmentStatus>) -> Self {
        let query = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);
        Self { query, status }
    }

    pub fn query_or_all(&self) -> &str {
        self.query.as_deref().unwrap_or("all")
    }

    pub fn status_or_all(&self) -> &str {
        self.status.as_ref().map(ShipmentStatus::as_str).unwrap_or("all")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShipmentInput {
    pub tracking_no: String,
    pub carrier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_wire_format() {
        assert_eq!(
            serde_json::to_value(ShipmentStatus::OutForDelivery).unwrap(),
            json!("OUT_FOR_DELIVERY")
        );
        let parsed: ShipmentStatus = serde_json::from_value(json!("DELIVERED")).unwrap();
        assert_eq!(parsed, ShipmentStatus::Delivered);
        assert_eq!(parsed.to_string(), "DELIVERED");
    }

    #[test]
    fn unknown_status_does_not_fail_decoding() {
        let parsed: ShipmentStatus = serde_json::from_value(json!("RETURNED_TO_SENDER")).unwrap();
        assert_eq!(parsed, ShipmentStatus::Unknown);
    }

    #[test]
    fn shipment_decodes_backend_payload() {
        let shipment: Shipment = serde_json::from_value(json!({
            "id": "abc123",
            "trackingNo": "1Z999",
            "carrier": "UPS",
            "status": "IN_TRANSIT",
            "lastUpdatedIso": "2026-03-01T10:00:00Z",
            "checkpoints": [{
                "code": "CREATED",
                "label": "Label created",
                "timeIso": "2026-02-28T09:00:00Z",
                "location": "Austin, TX"
            }]
        }))
        .unwrap();

        assert_eq!(shipment.id, "abc123");
        assert!(shipment.nickname.is_none());
        assert_eq!(shipment.checkpoints.len(), 1);
        assert_eq!(shipment.checkpoints[0].code, ShipmentStatus::Created);
    }

    #[test]
    fn route_defaults_to_empty() {
        let route: ShipmentRoute = serde_json::from_value(json!({})).unwrap();
        assert!(route.coordinates.is_empty());
        assert!(route.eta.is_none());
    }

    #[test]
    fn list_filters_normalize_query() {
        let filters = ListFilters::new(Some("   "), None);
        assert!(filters.query.is_none());
        assert_eq!(filters.query_or_all(), "all");
        assert_eq!(filters.status_or_all(), "all");

        let filters = ListFilters::new(Some(" 1Z "), Some(ShipmentStatus::Exception));
        assert_eq!(filters.query_or_all(), "1Z");
        assert_eq!(filters.status_or_all(), "EXCEPTION");
    }

    #[test]
    fn coordinates_validity() {
        assert!(Coordinates::new(30.27, -97.74).is_valid());
        assert!(!Coordinates::new(91.0, 0.0).is_valid());
    }
}
