//! Shipment endpoints with read-through caching.

use crate::{ApiRequest, ApiResult, AuthenticatedClient};
use dropmate_cache::{shipment_keys, QueryCache};
use dropmate_types::{CreateShipmentInput, ListFilters, Shipment, ShipmentRoute};
use std::time::Duration;
use tracing::{debug, info};

/// Routes are refetched once they are older than this, even if never
/// invalidated.
pub const ROUTE_MAX_AGE: Duration = Duration::from_secs(15);

const SHIPMENTS: &str = "shipments";

#[derive(Clone)]
pub struct ShipmentsClient {
    client: AuthenticatedClient,
    cache: QueryCache,
}

impl ShipmentsClient {
    pub fn new(client: AuthenticatedClient, cache: QueryCache) -> Self {
        Self { client, cache }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// `GET /shipments?query=&status=`
    pub async fn list(&self, filters: &ListFilters) -> ApiResult<Vec<Shipment>> {
        self.cache
            .fetch_with(shipment_keys::list(filters), None, || async {
                let mut request = ApiRequest::get([SHIPMENTS]);
                if let Some(query) = &filters.query {
                    request = request.query("query", query.as_str());
                }
                if let Some(status) = &filters.status {
                    request = request.query("status", status.as_str());
                }
                self.client.send(request).await?.json::<Vec<Shipment>>()
            })
            .await
    }

    /// `GET /shipments/{id}`. A 404 is `Ok(None)` and is not cached.
    pub async fn get(&self, id: &str) -> ApiResult<Option<Shipment>> {
        let result = self
            .cache
            .fetch_with(shipment_keys::detail(id), None, || async {
                self.client
                    .send(ApiRequest::get([SHIPMENTS, id]))
                    .await?
                    .json::<Shipment>()
            })
            .await;

        match result {
            Ok(shipment) => Ok(Some(shipment)),
            Err(e) if e.is_not_found() => {
                debug!(shipment_id = %id, "Shipment not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// `POST /shipments`
    pub async fn create(&self, input: &CreateShipmentInput) -> ApiResult<Shipment> {
        let request = ApiRequest::post([SHIPMENTS]).json(serde_json::to_value(input)?);
        let shipment: Shipment = self.client.send(request).await?.json()?;

        self.cache
            .write_as(shipment_keys::detail(&shipment.id), &shipment)?;
        self.cache.invalidate_prefix(&shipment_keys::lists());
        info!(shipment_id = %shipment.id, tracking_no = %shipment.tracking_no, "Shipment created");
        Ok(shipment)
    }

    /// `DELETE /shipments/{id}`
    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        self.client
            .send(ApiRequest::delete([SHIPMENTS, id]))
            .await?;

        self.cache.invalidate_prefix(&shipment_keys::lists());
        self.cache.invalidate(&shipment_keys::detail(id));
        self.cache.invalidate(&shipment_keys::route(id));
        info!(shipment_id = %id, "Shipment deleted");
        Ok(())
    }

    /// `GET /shipments/{id}/route`
    pub async fn route(&self, id: &str) -> ApiResult<ShipmentRoute> {
        self.cache
            .fetch_with(shipment_keys::route(id), Some(ROUTE_MAX_AGE), || async {
                self.client
                    .send(ApiRequest::get([SHIPMENTS, id, "route"]))
                    .await?
                    .json::<ShipmentRoute>()
            })
            .await
    }
}
