//! HTTP API Module
//!
//! Administrative surface over the record store, plus health and metrics
//! endpoints.

mod routes;
mod metrics;

pub use routes::run_api_server;
pub use metrics::Metrics;
