//! HTTP access to the Dropmate backend.
//!
//! - [`AuthenticatedClient`]: attaches the session's bearer token to every
//!   request and recovers from a single 401 with a forced token refresh
//! - [`ShipmentsClient`]: shipment endpoints, read through the
//!   [`dropmate_cache::QueryCache`]
//! - [`HttpTransport`]: the wire seam, with a `reqwest` implementation and
//!   [`LocalBackend`], an in-process data service for offline runs

mod client;
mod error;
mod local;
mod shipments;
mod transport;

#[cfg(test)]
mod tests;

pub use client::AuthenticatedClient;
pub use error::{ApiError, ApiErrorKind, ApiResult};
pub use local::LocalBackend;
pub use shipments::{ShipmentsClient, ROUTE_MAX_AGE};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, ReqwestTransport};
