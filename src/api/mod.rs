//! REST API
//!
//! Read endpoints for the tree and deposit status, plus the two
//! proof-carrying write endpoints. Errors map through the relayer taxonomy
//! to stable codes and statuses.
//!
//! - GET  /health                      - liveness
//! - GET  /info                        - relayer address, fee, chains
//! - GET  /tree/root                   - current root + leaf count
//! - GET  /tree/proof/:leaf_index      - membership proof
//! - GET  /deposit/status/:commitment  - has this commitment been observed?
//! - POST /withdraw                    - relay a withdrawal on-chain
//! - POST /transfer                    - apply an off-chain transfer

use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::common::RelayerError;
use crate::config::RelayerConfig;
use crate::ledger::LedgerStore;
use crate::pipeline::ProofPipeline;
use crate::tree::SharedTree;
use crate::types::{unix_now, Field, TransferRequest, WithdrawRequest};

/// Summary of one configured chain, for /info.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSummary {
    pub chain_id: u64,
    pub name: String,
    pub pool_address: String,
}

/// Combined application state for all endpoints.
pub struct AppState {
    pub pipeline: Arc<ProofPipeline>,
    pub tree: SharedTree,
    pub ledger: Arc<LedgerStore>,
    pub relayer_address: String,
    pub fee_margin_bps: u64,
    pub chains: Vec<ChainSummary>,
}

pub type SharedAppState = Arc<AppState>;

/// Build the application router.
pub fn create_router(state: SharedAppState, config: &RelayerConfig) -> Router {
    let cors = match config.cors_origin.as_deref().map(HeaderValue::from_str) {
        Some(Ok(origin)) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        _ => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    Router::new()
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .route("/tree/root", get(handle_tree_root))
        .route("/tree/proof/:leaf_index", get(handle_tree_proof))
        .route("/deposit/status/:commitment", get(handle_deposit_status))
        .route("/withdraw", post(handle_withdraw))
        .route("/transfer", post(handle_transfer))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Error mapping
// =============================================================================

/// Wrapper turning RelayerError into a JSON error response.
pub struct ApiError(RelayerError);

impl From<RelayerError> for ApiError {
    fn from(e: RelayerError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(target: "veil::api", error = %self.0, code = self.0.error_code(), "request failed");
        }
        let body = serde_json::json!({
            "error": self.0.to_string(),
            "code": self.0.error_code(),
            "retryable": self.0.is_retryable(),
        });
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn handle_health(State(state): State<SharedAppState>) -> impl IntoResponse {
    let leaf_count = state.tree.read().await.leaf_count();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "leafCount": leaf_count,
        "timestamp": unix_now(),
    }))
}

async fn handle_info(State(state): State<SharedAppState>) -> impl IntoResponse {
    let leaf_count = state.tree.read().await.leaf_count();
    Json(serde_json::json!({
        "relayer": &state.relayer_address,
        "feeMarginBps": state.fee_margin_bps,
        "chains": &state.chains,
        "leafCount": leaf_count,
    }))
}

async fn handle_tree_root(
    State(state): State<SharedAppState>,
) -> Result<impl IntoResponse, ApiError> {
    let (root, leaf_count) = {
        let tree = state.tree.read().await;
        (tree.root(), tree.leaf_count())
    };
    let root_index = state
        .ledger
        .latest_root()
        .map_err(RelayerError::from)?
        .map(|r| r.root_index);

    Ok(Json(serde_json::json!({
        "root": root.to_hex(),
        "leafCount": leaf_count,
        "rootIndex": root_index,
    })))
}

async fn handle_tree_proof(
    State(state): State<SharedAppState>,
    Path(leaf_index): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let proof = state
        .tree
        .read()
        .await
        .proof(leaf_index)
        .map_err(RelayerError::from)?;

    let path_elements: Vec<String> = proof.siblings.iter().map(Field::to_hex).collect();
    Ok(Json(serde_json::json!({
        "pathElements": path_elements,
        "pathIndices": proof.directions,
        "root": proof.root.to_hex(),
    })))
}

async fn handle_deposit_status(
    State(state): State<SharedAppState>,
    Path(commitment): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let commitment = Field::from_hex(&commitment).map_err(RelayerError::from)?;
    let leaf = state
        .ledger
        .get_leaf_by_commitment(&commitment)
        .map_err(RelayerError::from)?;

    let body = match leaf {
        Some(leaf) => serde_json::json!({
            "confirmed": true,
            "leafIndex": leaf.leaf_index,
            "chainId": leaf.chain_id,
            "amount": leaf.amount,
            "asset": leaf.asset.to_hex(),
            "timestamp": leaf.observed_at,
        }),
        None => serde_json::json!({
            "confirmed": false,
            "leafIndex": -1,
        }),
    };
    Ok(Json(body))
}

async fn handle_withdraw(
    State(state): State<SharedAppState>,
    Json(request): Json<WithdrawRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.pipeline.withdraw(request).await?;
    Ok(Json(response))
}

async fn handle_transfer(
    State(state): State<SharedAppState>,
    Json(request): Json<TransferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.pipeline.transfer(request).await?;
    Ok(Json(response))
}
