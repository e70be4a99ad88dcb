//! In-process shipments service speaking the same HTTP contract as the
//! backend, used when `use_http` is off.

use crate::{ApiRequest, ApiResponse, ApiResult, HttpTransport, Method};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use dropmate_types::{
    Checkpoint, Coordinates, CreateShipmentInput, Shipment, ShipmentRoute, ShipmentStatus,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

const ROUTE_START: Coordinates = Coordinates {
    lat: 38.7223,
    lng: -9.1393,
};
const ROUTE_END: Coordinates = Coordinates {
    lat: 38.7569,
    lng: -9.1886,
};
const ROUTE_POINTS: usize = 5;

pub struct LocalBackend {
    shipments: Mutex<Vec<Shipment>>,
    next_id: AtomicU64,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::with_shipments(Vec::new())
    }

    pub fn with_shipments(shipments: Vec<Shipment>) -> Self {
        Self {
            next_id: AtomicU64::new(shipments.len() as u64 + 1),
            shipments: Mutex::new(shipments),
        }
    }

    /// Backend preloaded with a few sample shipments.
    pub fn seeded() -> Self {
        let now = Utc::now();
        let checkpoint = |code: ShipmentStatus, hours_ago: i64, location: &str| Checkpoint {
            code,
            label: code.label().to_string(),
            time: now - ChronoDuration::hours(hours_ago),
            location: Some(location.to_string()),
        };

        Self::with_shipments(vec![
            Shipment {
                id: "shp_1".into(),
                tracking_no: "DM100200300".into(),
                carrier: "DHL".into(),
                nickname: Some("Running shoes".into()),
                status: ShipmentStatus::InTransit,
                last_updated: now - ChronoDuration::hours(3),
                checkpoints: vec![
                    checkpoint(ShipmentStatus::Created, 30, "Madrid"),
                    checkpoint(ShipmentStatus::InTransit, 3, "Badajoz"),
                ],
            },
            Shipment {
                id: "shp_2".into(),
                tracking_no: "DM400500600".into(),
                carrier: "UPS".into(),
                nickname: None,
                status: ShipmentStatus::OutForDelivery,
                last_updated: now - ChronoDuration::hours(1),
                checkpoints: vec![
                    checkpoint(ShipmentStatus::Created, 48, "Porto"),
                    checkpoint(ShipmentStatus::InTransit, 20, "Coimbra"),
                    checkpoint(ShipmentStatus::OutForDelivery, 1, "Lisbon"),
                ],
            },
            Shipment {
                id: "shp_3".into(),
                tracking_no: "DM700800900".into(),
                carrier: "FedEx".into(),
                nickname: Some("Books".into()),
                status: ShipmentStatus::Delivered,
                last_updated: now - ChronoDuration::hours(26),
                checkpoints: vec![
                    checkpoint(ShipmentStatus::Created, 72, "Seville"),
                    checkpoint(ShipmentStatus::Delivered, 26, "Lisbon"),
                ],
            },
        ])
    }

    pub fn shipments(&self) -> Vec<Shipment> {
        self.shipments.lock().clone()
    }

    fn list(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        let param = |name: &str| {
            request
                .query
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.trim().to_lowercase())
                .filter(|value| !value.is_empty())
        };
        let query = param("query");
        let status = param("status");

        let matching: Vec<Shipment> = self
            .shipments
            .lock()
            .iter()
            .filter(|s| {
                status
                    .as_deref()
                    .map_or(true, |wanted| s.status.as_str().eq_ignore_ascii_case(wanted))
            })
            .filter(|s| query.as_deref().map_or(true, |q| matches_query(s, q)))
            .cloned()
            .collect();
        respond(200, &matching)
    }

    fn get(&self, id: &str) -> ApiResult<ApiResponse> {
        match self.shipments.lock().iter().find(|s| s.id == id) {
            Some(shipment) => respond(200, shipment),
            None => Ok(not_found()),
        }
    }

    fn create(&self, body: Option<&Value>) -> ApiResult<ApiResponse> {
        let input: CreateShipmentInput = match body.map(|b| serde_json::from_value(b.clone())) {
            Some(Ok(input)) => input,
            _ => return Ok(bad_request("Invalid shipment payload")),
        };
        let tracking_no = input.tracking_no.trim();
        if tracking_no.is_empty() {
            return Ok(bad_request("trackingNo is required"));
        }

        let now = Utc::now();
        let shipment = Shipment {
            id: format!("shp_{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            tracking_no: tracking_no.to_string(),
            carrier: input.carrier,
            nickname: input.nickname.filter(|n| !n.trim().is_empty()),
            status: ShipmentStatus::Created,
            last_updated: now,
            checkpoints: vec![Checkpoint {
                code: ShipmentStatus::Created,
                label: ShipmentStatus::Created.label().to_string(),
                time: now,
                location: None,
            }],
        };
        self.shipments.lock().insert(0, shipment.clone());
        respond(201, &shipment)
    }

    fn delete(&self, id: &str) -> ApiResult<ApiResponse> {
        let mut shipments = self.shipments.lock();
        let before = shipments.len();
        shipments.retain(|s| s.id != id);
        if shipments.len() == before {
            return Ok(not_found());
        }
        Ok(ApiResponse::new(204, Vec::new()))
    }

    fn route(&self, id: &str) -> ApiResult<ApiResponse> {
        let Some(status) = self
            .shipments
            .lock()
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.status)
        else {
            return Ok(not_found());
        };

        let step = |i: usize, from: f64, to: f64| {
            from + (to - from) * i as f64 / (ROUTE_POINTS - 1) as f64
        };
        let route = ShipmentRoute {
            coordinates: (0..ROUTE_POINTS)
                .map(|i| {
                    Coordinates::new(
                        step(i, ROUTE_START.lat, ROUTE_END.lat),
                        step(i, ROUTE_START.lng, ROUTE_END.lng),
                    )
                })
                .collect(),
            eta: (!status.is_terminal()).then(|| Utc::now() + ChronoDuration::hours(2)),
        };
        respond(200, &route)
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_query(shipment: &Shipment, query: &str) -> bool {
    [
        Some(shipment.tracking_no.as_str()),
        Some(shipment.carrier.as_str()),
        shipment.nickname.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(query))
}

fn respond<T: serde::Serialize + ?Sized>(status: u16, body: &T) -> ApiResult<ApiResponse> {
    Ok(ApiResponse::new(status, serde_json::to_vec(body)?))
}

fn not_found() -> ApiResponse {
    ApiResponse::json_body(404, &json!({"message": "Shipment not found"}))
}

fn bad_request(message: &str) -> ApiResponse {
    ApiResponse::json_body(400, &json!({ "message": message }))
}

#[async_trait]
impl HttpTransport for LocalBackend {
    async fn execute(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        debug!(method = request.method.as_str(), path = %request.path(), "Local backend request");
        let segments: Vec<&str> = request.segments.iter().map(String::as_str).collect();

        match (request.method, segments.as_slice()) {
            (Method::Get, ["shipments"]) => self.list(request),
            (Method::Post, ["shipments"]) => self.create(request.body.as_ref()),
            (Method::Get, ["shipments", id]) => self.get(id),
            (Method::Delete, ["shipments", id]) => self.delete(id),
            (Method::Get, ["shipments", id, "route"]) => self.route(id),
            _ => Ok(ApiResponse::json_body(404, &json!({"message": "Not found"}))),
        }
    }
}
