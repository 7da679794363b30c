//! Local admin endpoints for the recovery operations
//!
//! - POST /v1/admin/find_missing_messages
//! - GET  /v1/admin/undone_sequences/{chain}
//! - POST /v1/admin/undone_transfer
//! - POST /v1/admin/inject_governance_vaa
//!
//! Errors are returned as `{"error", "kind", "retryable"}` so operators can
//! tell a request that will never succeed from one worth retrying.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::codec::GovernanceMessage;
use crate::error::{ErrorKind, RecoveryError};
use crate::governance::GovernanceInjector;
use crate::hash::bytes32_to_hex;
use crate::recovery::{
    FindMissingMessagesRequest, FindMissingMessagesResponse, RecoveryService,
    UndoneTransferRequest,
};

/// Everything the admin endpoints need
pub struct AdminService {
    recovery: RecoveryService,
    injector: GovernanceInjector,
    guardian_set_index: u32,
    /// Used when a request names no peers
    backfill_nodes: Vec<String>,
    shutdown: CancellationToken,
}

impl AdminService {
    pub fn new(
        recovery: RecoveryService,
        injector: GovernanceInjector,
        guardian_set_index: u32,
        backfill_nodes: Vec<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            recovery,
            injector,
            guardian_set_index,
            backfill_nodes,
            shutdown,
        }
    }

    fn peers_or_default(&self, peers: Vec<String>) -> Vec<String> {
        if peers.is_empty() {
            self.backfill_nodes.clone()
        } else {
            peers
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: ErrorKind,
    retryable: bool,
}

impl IntoResponse for RecoveryError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Transport => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Protocol => StatusCode::BAD_GATEWAY,
            ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
            retryable: self.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UndoneSequencesResponse {
    pub sequences: Vec<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InjectGovernanceVaaRequest {
    pub messages: Vec<GovernanceMessage>,
    /// Defaults to the configured guardian set index
    #[serde(default)]
    pub current_set_index: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InjectGovernanceVaaResponse {
    /// Hex signing digests, in request order
    pub digests: Vec<String>,
}

type AdminState = Arc<AdminService>;

async fn find_missing_messages(
    State(admin): State<AdminState>,
    Json(mut req): Json<FindMissingMessagesRequest>,
) -> Result<Json<FindMissingMessagesResponse>, RecoveryError> {
    req.backfill_nodes = admin.peers_or_default(req.backfill_nodes);
    let cancel = admin.shutdown.child_token();
    let resp = admin.recovery.find_missing_messages(&req, &cancel).await?;
    Ok(Json(resp))
}

async fn undone_sequences(
    State(admin): State<AdminState>,
    Path(chain): Path<u32>,
) -> Result<Json<UndoneSequencesResponse>, RecoveryError> {
    let sequences = admin.recovery.get_undone_sequences(chain).await?;
    Ok(Json(UndoneSequencesResponse { sequences }))
}

async fn undone_transfer(
    State(admin): State<AdminState>,
    Json(mut req): Json<UndoneTransferRequest>,
) -> Result<Json<GovernanceMessage>, RecoveryError> {
    req.backfill_nodes = admin.peers_or_default(req.backfill_nodes);
    let cancel = admin.shutdown.child_token();
    let message = admin
        .recovery
        .gen_undone_transfer_governance_msg(&req, &cancel)
        .await?;
    Ok(Json(message))
}

async fn inject_governance_vaa(
    State(admin): State<AdminState>,
    Json(req): Json<InjectGovernanceVaaRequest>,
) -> Result<Json<InjectGovernanceVaaResponse>, RecoveryError> {
    let set_index = req.current_set_index.unwrap_or(admin.guardian_set_index);
    let digests = admin
        .injector
        .inject_governance_vaa(&req.messages, set_index)
        .await?;
    Ok(Json(InjectGovernanceVaaResponse {
        digests: digests.iter().map(bytes32_to_hex).collect(),
    }))
}

pub fn admin_router(admin: AdminState) -> Router {
    Router::new()
        .route("/v1/admin/find_missing_messages", post(find_missing_messages))
        .route("/v1/admin/undone_sequences/{chain}", get(undone_sequences))
        .route("/v1/admin/undone_transfer", post(undone_transfer))
        .route("/v1/admin/inject_governance_vaa", post(inject_governance_vaa))
        .with_state(admin)
}

/// Serve the admin endpoints until `cancel` fires
pub async fn start_admin_server(
    addr: SocketAddr,
    admin: AdminState,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Admin server started");

    axum::serve(listener, admin_router(admin))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("Admin server stopped");
    Ok(())
}
