//! Shipments client over the scripted transport.

use super::harness::TestHarness;
use crate::{ApiErrorKind, Method, ShipmentsClient};
use dropmate_cache::{shipment_keys, QueryCache};
use dropmate_types::{CreateShipmentInput, ListFilters, ShipmentStatus};
use serde_json::{json, Value};

fn shipment_json(id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "trackingNo": format!("TRK-{id}"),
        "carrier": "DHL",
        "status": status,
        "lastUpdatedIso": "2026-03-01T10:00:00Z",
        "checkpoints": []
    })
}

async fn setup() -> (TestHarness, ShipmentsClient, QueryCache) {
    let harness = TestHarness::signed_in().await;
    let cache = QueryCache::new();
    let shipments = ShipmentsClient::new(harness.client.clone(), cache.clone());
    (harness, shipments, cache)
}

#[tokio::test]
async fn list_reads_through_cache() {
    let (harness, shipments, cache) = setup().await;
    harness
        .transport
        .push_status(200, json!([shipment_json("a", "IN_TRANSIT")]));
    let filters = ListFilters::new(Some(" shoes "), Some(ShipmentStatus::InTransit));

    let first = shipments.list(&filters).await.unwrap();
    let second = shipments.list(&filters).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(harness.transport.request_count(), 1);
    let request = &harness.transport.requests()[0];
    assert_eq!(request.path(), "/shipments");
    assert_eq!(
        request.query,
        vec![
            ("query".to_string(), "shoes".to_string()),
            ("status".to_string(), "IN_TRANSIT".to_string())
        ]
    );
    assert_eq!(cache.is_stale(&shipment_keys::list(&filters)), Some(false));
}

#[tokio::test]
async fn stale_list_is_refetched() {
    let (harness, shipments, cache) = setup().await;
    harness.transport.push_status(200, json!([]));
    harness
        .transport
        .push_status(200, json!([shipment_json("a", "CREATED")]));
    let filters = ListFilters::default();

    assert!(shipments.list(&filters).await.unwrap().is_empty());
    cache.invalidate_prefix(&shipment_keys::lists());
    let refreshed = shipments.list(&filters).await.unwrap();

    assert_eq!(refreshed.len(), 1);
    assert_eq!(harness.transport.request_count(), 2);
}

#[tokio::test]
async fn get_missing_shipment_is_none_and_not_cached() {
    let (harness, shipments, cache) = setup().await;
    harness
        .transport
        .push_status(404, json!({"message": "Shipment not found"}));

    assert!(shipments.get("gone").await.unwrap().is_none());
    assert!(!cache.contains(&shipment_keys::detail("gone")));
}

#[tokio::test]
async fn get_decodes_unknown_status() {
    let (harness, shipments, _cache) = setup().await;
    harness
        .transport
        .push_status(200, shipment_json("a", "HELD_AT_CUSTOMS"));

    let shipment = shipments.get("a").await.unwrap().unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Unknown);
}

#[tokio::test]
async fn get_surfaces_decode_errors() {
    let (harness, shipments, _cache) = setup().await;
    harness.transport.push_status(200, json!({"id": 7}));

    let err = shipments.get("a").await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Decode);
}

#[tokio::test]
async fn create_invalidates_lists_only() {
    let (harness, shipments, cache) = setup().await;
    let list_key = shipment_keys::list(&ListFilters::default());
    cache.write(list_key.clone(), json!([]));
    cache.write(shipment_keys::route("b"), json!({"coordinates": []}));
    harness
        .transport
        .push_status(201, shipment_json("new", "CREATED"));

    let input = CreateShipmentInput {
        tracking_no: "TRK-new".into(),
        carrier: "DHL".into(),
        nickname: None,
    };
    let created = shipments.create(&input).await.unwrap();

    assert_eq!(created.id, "new");
    let request = &harness.transport.requests()[0];
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.body.as_ref().unwrap()["trackingNo"], "TRK-new");
    assert_eq!(cache.is_stale(&list_key), Some(true));
    assert_eq!(cache.is_stale(&shipment_keys::detail("new")), Some(false));
    assert_eq!(cache.is_stale(&shipment_keys::route("b")), Some(false));
}

#[tokio::test]
async fn delete_invalidates_lists_detail_and_route() {
    let (harness, shipments, cache) = setup().await;
    let list_key = shipment_keys::list(&ListFilters::default());
    cache.write(list_key.clone(), json!([]));
    cache.write(shipment_keys::detail("a"), shipment_json("a", "CREATED"));
    cache.write(shipment_keys::route("a"), json!({"coordinates": []}));
    cache.write(shipment_keys::detail("b"), shipment_json("b", "CREATED"));
    harness.transport.push_status(204, Value::Null);

    shipments.delete("a").await.unwrap();

    assert_eq!(harness.transport.requests()[0].path(), "/shipments/a");
    assert_eq!(cache.is_stale(&list_key), Some(true));
    assert_eq!(cache.is_stale(&shipment_keys::detail("a")), Some(true));
    assert_eq!(cache.is_stale(&shipment_keys::route("a")), Some(true));
    assert_eq!(cache.is_stale(&shipment_keys::detail("b")), Some(false));
}

#[tokio::test]
async fn failed_delete_leaves_cache_untouched() {
    let (harness, shipments, cache) = setup().await;
    cache.write(shipment_keys::detail("a"), shipment_json("a", "CREATED"));
    harness
        .transport
        .push_status(403, json!({"message": "Not your shipment"}));

    let err = shipments.delete("a").await.unwrap_err();

    assert_eq!(err.message, "Not your shipment");
    assert_eq!(cache.is_stale(&shipment_keys::detail("a")), Some(false));
}

#[tokio::test]
async fn route_is_cached() {
    let (harness, shipments, _cache) = setup().await;
    harness.transport.push_status(
        200,
        json!({"coordinates": [{"lat": 38.7, "lng": -9.1}], "etaIso": "2026-03-01T12:00:00Z"}),
    );

    let first = shipments.route("a").await.unwrap();
    let second = shipments.route("a").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.coordinates.len(), 1);
    assert_eq!(harness.transport.requests()[0].path(), "/shipments/a/route");
    assert_eq!(harness.transport.request_count(), 1);
}
