//! HTTP API for LocalWeave
//!
//! Maps routes onto [`Node`] and [`crate::ledger::Ledger`] operations. Every
//! failure comes back as a JSON `{"error": ...}` body with a matching status;
//! in particular a failed mining round is reported, never answered with the
//! unchanged network state.

use axum::{
    extract::{Path, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use crate::block::Block;
use crate::chunk::Chunk;
use crate::error::EmulatorError;
use crate::network::NetworkState;
use crate::node::Node;
use crate::transaction::{TagRecord, Transaction, TransactionStatus};
use crate::wallet::Wallet;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError(EmulatorError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EmulatorError::NotFound(_) => StatusCode::NOT_FOUND,
            EmulatorError::DuplicateId(_) => StatusCode::CONFLICT,
            EmulatorError::InvalidTransaction(_) | EmulatorError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "api.error");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<EmulatorError> for ApiError {
    fn from(err: EmulatorError) -> Self {
        ApiError(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct InfoResponse {
    #[serde(flatten)]
    pub state: NetworkState,
    pub queue_length: usize,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub id: String,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: f64,
}

#[derive(Deserialize)]
pub struct WalletRequest {
    pub address: String,
    #[serde(default)]
    pub balance: f64,
}

// ============================================================================
// Middleware
// ============================================================================

async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );
    response
}

// ============================================================================
// Router
// ============================================================================

pub fn build_api_router(node: Arc<Node>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(get_info))
        .route("/info", get(get_info))
        // Transactions
        .route("/tx", post(submit_transaction))
        .route("/tx/pending", get(get_pending))
        .route("/tx/:id", get(get_transaction))
        .route("/tx/:id/status", get(get_transaction_status))
        .route("/tx/:id/tags", get(get_transaction_tags))
        .route("/tags/:name/:value", get(get_by_tag))
        // Mining
        .route("/mine", get(mine_one))
        .route("/mine/:qty", get(mine_qty))
        // Blocks
        .route("/block/hash/:id", get(get_block_by_id))
        .route("/block/height/:height", get(get_block_by_height))
        // Wallets
        .route("/wallet", post(create_wallet))
        .route("/wallet/:address/balance", get(get_balance))
        .route("/mint/:address/:balance", get(mint))
        // Chunks
        .route("/chunk", post(submit_chunk))
        .route("/chunk/:id", get(get_chunk))
        .layer(middleware::from_fn(logging_middleware))
        .layer(cors)
        .with_state(node)
}

pub async fn run_api_server(node: Arc<Node>) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], node.config.network.port));
    let app = build_api_router(node);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn get_info(State(node): State<Arc<Node>>) -> Result<Json<InfoResponse>, ApiError> {
    Ok(Json(InfoResponse {
        state: node.state().await,
        queue_length: node.ledger.queue_length()?,
    }))
}

async fn submit_transaction(
    State(node): State<Arc<Node>>,
    Json(tx): Json<Transaction>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let stored = node.ledger.submit_transaction(tx)?;
    Ok(Json(SubmitResponse { id: stored.id }))
}

async fn get_pending(State(node): State<Arc<Node>>) -> Result<Json<Vec<String>>, ApiError> {
    let ids = node
        .ledger
        .transactions
        .get_unmined_txs()?
        .into_iter()
        .map(|tx| tx.id)
        .collect();
    Ok(Json(ids))
}

async fn get_transaction(
    State(node): State<Arc<Node>>,
    Path(id): Path<String>,
) -> Result<Json<Transaction>, ApiError> {
    Ok(Json(node.ledger.get_transaction(&id)?))
}

async fn get_transaction_status(
    State(node): State<Arc<Node>>,
    Path(id): Path<String>,
) -> Result<Json<TransactionStatus>, ApiError> {
    Ok(Json(node.ledger.transactions.status(&id)?))
}

async fn get_transaction_tags(
    State(node): State<Arc<Node>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<TagRecord>>, ApiError> {
    node.ledger.get_transaction(&id)?;
    Ok(Json(node.ledger.transactions.get_tags(&id)?))
}

async fn get_by_tag(
    State(node): State<Arc<Node>>,
    Path((name, value)): Path<(String, String)>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(node.ledger.transactions.get_by_tag(&name, &value)?))
}

async fn mine_one(State(node): State<Arc<Node>>) -> Result<Json<NetworkState>, ApiError> {
    Ok(Json(node.mine(1).await?))
}

async fn mine_qty(
    State(node): State<Arc<Node>>,
    Path(qty): Path<String>,
) -> Result<Json<NetworkState>, ApiError> {
    let step: u64 = qty
        .parse()
        .map_err(|_| EmulatorError::InvalidInput(format!("Invalid quantity '{}'", qty)))?;
    Ok(Json(node.mine(step).await?))
}

async fn get_block_by_id(
    State(node): State<Arc<Node>>,
    Path(id): Path<String>,
) -> Result<Json<Block>, ApiError> {
    Ok(Json(node.ledger.get_block(&id)?))
}

async fn get_block_by_height(
    State(node): State<Arc<Node>>,
    Path(height): Path<String>,
) -> Result<Json<Block>, ApiError> {
    let height: u64 = height
        .parse()
        .map_err(|_| EmulatorError::InvalidInput(format!("Invalid height '{}'", height)))?;
    Ok(Json(node.ledger.blocks.get_by_height(height)?))
}

async fn create_wallet(
    State(node): State<Arc<Node>>,
    Json(req): Json<WalletRequest>,
) -> Result<Json<Wallet>, ApiError> {
    if req.address.is_empty() {
        return Err(EmulatorError::InvalidInput("Wallet address cannot be empty".to_string()).into());
    }
    Ok(Json(node.ledger.wallets.upsert(&req.address, req.balance)?))
}

async fn get_balance(
    State(node): State<Arc<Node>>,
    Path(address): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let wallet = node.ledger.get_wallet(&address)?;
    Ok(Json(BalanceResponse {
        address: wallet.address,
        balance: wallet.balance,
    }))
}

async fn mint(
    State(node): State<Arc<Node>>,
    Path((address, balance)): Path<(String, String)>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let delta: f64 = balance
        .parse()
        .map_err(|_| EmulatorError::InvalidInput(format!("Invalid balance '{}'", balance)))?;
    let wallet = node.ledger.wallets.increment_balance(&address, delta)?;
    Ok(Json(BalanceResponse {
        address: wallet.address,
        balance: wallet.balance,
    }))
}

async fn submit_chunk(
    State(node): State<Arc<Node>>,
    Json(chunk): Json<Chunk>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let stored = node.ledger.chunks.insert(chunk)?;
    Ok(Json(SubmitResponse { id: stored.id }))
}

async fn get_chunk(
    State(node): State<Arc<Node>>,
    Path(id): Path<String>,
) -> Result<Json<Chunk>, ApiError> {
    Ok(Json(node.ledger.get_chunk(&id)?))
}
