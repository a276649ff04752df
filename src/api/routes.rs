//! API Routes
//!
//! Record administration plus health, status and metrics endpoints.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api::Metrics;
use crate::config::ServerConfig;
use crate::records::{RecordStore, StoreError};

/// Shared API state
pub struct ApiState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<RecordStore>,
    pub metrics: Arc<Metrics>,
}

/// Failures reported to API callers as plain text
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("DNS record not found")]
    RecordNotFound,

    #[error("Not Found")]
    RouteNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RecordNotFound | ApiError::RouteNotFound => StatusCode::NOT_FOUND,
            ApiError::Store(e) => {
                error!("Error updating DNS records: {}", e);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
            }
        };

        (status, self.to_string()).into_response()
    }
}

/// Body of `PUT /records/{name}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordUpdate {
    ip_address: String,
}

/// Run the HTTP API server
pub async fn run_api_server(
    config: Arc<ServerConfig>,
    store: Arc<RecordStore>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::new(config.bind_address, config.api_port);
    let state = Arc::new(ApiState {
        config,
        store,
        metrics,
    });

    info!("📊 HTTP API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Build the API router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        // Web UI
        .route("/", get(index_page))

        // Records
        .route(
            "/records",
            get(export_records).post(bulk_upsert).fallback(route_not_found),
        )
        .route(
            "/records/:name",
            put(upsert_record)
                .delete(delete_record)
                .fallback(route_not_found),
        )

        // Health & Status
        .route("/health", get(health_check))
        .route("/status", get(get_status))

        // Metrics
        .route("/metrics", get(get_metrics_prometheus))
        .route("/metrics/json", get(get_metrics_json))

        .fallback(route_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET / - Operator web page
async fn index_page(State(state): State<Arc<ApiState>>) -> Response {
    match tokio::fs::read(&state.config.index_file).await {
        Ok(page) => ([(header::CONTENT_TYPE, "text/html")], page).into_response(),
        Err(e) => {
            error!("Error reading {:?}: {}", state.config.index_file, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

/// GET /records - Export every record
async fn export_records(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.store.snapshot().await)
}

/// POST /records - Upsert every key/value pair of a JSON object
async fn bulk_upsert(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("expected a JSON object: {}", e)))?;

    let entries = object
        .into_iter()
        .map(|(name, value)| -> Result<(String, Ipv4Addr), ApiError> {
            let address = value
                .as_str()
                .ok_or_else(|| ApiError::BadRequest(format!("value for {} is not a string", name)))
                .and_then(parse_address)?;
            Ok((name, address))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let count = entries.len();
    let result = state.store.upsert_many(entries).await;
    record_mutation(&state, &result).await;
    result?;

    state.metrics.add_records_upserted(count as u64);
    info!("Updated {} DNS records", count);
    Ok(plain_text("DNS records updated successfully".to_string()))
}

/// PUT /records/{name} - Upsert a single record
async fn upsert_record(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let update: RecordUpdate = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("expected {{\"ipAddress\": ...}}: {}", e)))?;
    let address = parse_address(&update.ip_address)?;

    let result = state.store.upsert_one(name.clone(), address).await;
    record_mutation(&state, &result).await;
    result?;

    state.metrics.add_records_upserted(1);
    info!("DNS record {} -> {}", name, address);
    Ok(plain_text(format!("DNS record for domain {} updated successfully", name)))
}

/// DELETE /records/{name} - Remove a record
async fn delete_record(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.store.remove(&name).await;
    record_mutation(&state, &result).await;

    if !result? {
        return Err(ApiError::RecordNotFound);
    }

    state.metrics.inc_records_deleted();
    info!("DNS record {} deleted", name);
    Ok(plain_text(format!("DNS record for domain {} deleted successfully", name)))
}

/// GET /health - Simple health check
async fn health_check() -> impl IntoResponse {
    "OK"
}

/// GET /status - Detailed status
async fn get_status(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let status = serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.metrics.uptime_secs(),
        "records": state.store.len().await,
        "records_file": state.store.path(),
        "forward_suffix": state.config.forward_suffix,
        "dns_port": state.config.dns_port,
    });

    Json(status)
}

/// GET /metrics - Prometheus format metrics
async fn get_metrics_prometheus(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.metrics.set_records(state.store.len().await as u64);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.to_prometheus(),
    )
}

/// GET /metrics/json - JSON format metrics
async fn get_metrics_json(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.metrics.set_records(state.store.len().await as u64);

    Json(state.metrics.to_json())
}

async fn route_not_found() -> ApiError {
    ApiError::RouteNotFound
}

fn parse_address(value: &str) -> Result<Ipv4Addr, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("{} is not an IPv4 address", value)))
}

/// Keep the record gauge and failure counter in step with a mutation
async fn record_mutation<T>(state: &ApiState, result: &Result<T, StoreError>) {
    if result.is_err() {
        state.metrics.inc_persist_failures();
    }
    state.metrics.set_records(state.store.len().await as u64);
}

fn plain_text(body: String) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], body)
}
