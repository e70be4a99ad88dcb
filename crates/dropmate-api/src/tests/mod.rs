//! Pipeline tests against a scripted transport.
//!
//! - `harness.rs`   - scripted transport and signed-in session fixtures
//! - `retry.rs`     - bearer attachment and the single 401 retry
//! - `shipments.rs` - read-through caching and invalidation on writes

pub(crate) mod harness;
mod shipments;
