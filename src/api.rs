//! Health & Status API endpoints
//!
//! - GET /health - Liveness check
//! - GET /metrics - Prometheus metrics
//! - GET /status - Uptime and next event index of every watched contract

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use eyre::Result;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::metrics;
use crate::store::EventIndexStore;

#[derive(Clone)]
pub struct AppState {
    started: Instant,
    started_at: DateTime<Utc>,
    contracts: Arc<Vec<String>>,
    index_store: Arc<dyn EventIndexStore>,
}

impl AppState {
    pub fn new(contracts: Vec<String>, index_store: Arc<dyn EventIndexStore>) -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            contracts: Arc::new(contracts),
            index_store,
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: String,
    started_at: DateTime<Utc>,
    uptime_seconds: u64,
    contracts: Vec<ContractStatus>,
}

#[derive(Debug, Serialize)]
struct ContractStatus {
    address: String,
    /// None until the first watch cycle completed
    next_event_index: Option<u64>,
}

async fn health() -> &'static str {
    "OK"
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let mut contracts = Vec::with_capacity(state.contracts.len());
    for address in state.contracts.iter() {
        let next_event_index = match state.index_store.next_event_index(address).await {
            Ok(index) => index,
            Err(e) => {
                warn!(contract = %address, error = %e, "Failed to read event index");
                None
            }
        };
        contracts.push(ContractStatus {
            address: address.clone(),
            next_event_index,
        });
    }

    Json(StatusResponse {
        status: "ok".to_string(),
        started_at: state.started_at,
        uptime_seconds: state.started.elapsed().as_secs(),
        contracts,
    })
}

async fn prometheus_metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
    }

    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
}

/// Serve the API until `cancel` fires
pub async fn start_api_server(
    addr: SocketAddr,
    state: AppState,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "API server started");
    metrics::set_up(true);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    metrics::set_up(false);
    info!("API server stopped");
    Ok(())
}
