//! JSON API served by a node.
//!
//! Peers use `/get_chain`, `/connect_node` and `/add_transaction`; the rest
//! serves operators and wallets. Anything that issues coins from `"root"`
//! goes through the mint gate.

use crate::config::MintConfig;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use powchain_chain::{
    Balance, Blockchain, BlockchainError, ConsensusResolver, History, PeerChain,
};
use powchain_core::{Identity, Keypair, PreviousHash, SignedTransaction, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Header carrying the mint token.
pub const MINT_TOKEN_HEADER: &str = "x-mint-token";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub blockchain: Arc<Blockchain>,
    pub resolver: ConsensusResolver,
    pub mint: MintConfig,
}

/// Build the node's router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Chain
        .route("/get_chain", get(get_chain))
        .route("/mine_block", get(mine_block))
        .route("/is_valid", get(is_valid))
        // Transactions
        .route("/add_transaction", post(add_transaction))
        .route("/new_transaction", post(new_transaction))
        .route("/get_balance", post(get_balance))
        .route("/get_transactions", post(get_transactions))
        // Network
        .route("/connect_node", post(connect_node))
        .route("/replace_chain", get(replace_chain))
        .route("/join_network", post(join_network))
        // Wallets
        .route("/new_wallet", post(new_wallet))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Blockchain(#[from] BlockchainError),

    #[error("{0}")]
    InvalidInput(String),

    #[error("wallet minting is disabled on this node")]
    MintDisabled,

    #[error("missing or wrong mint token")]
    Unauthorized,

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Blockchain(e) if e.is_rejection() => StatusCode::BAD_REQUEST,
            ApiError::Blockchain(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::MintDisabled => StatusCode::FORBIDDEN,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {}", self);
        }
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MineBlockResponse {
    pub message: String,
    pub index: u64,
    pub timestamp: String,
    pub proof: u64,
    pub previous_hash: PreviousHash,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddTransactionResponse {
    pub message: String,
    pub pending_transactions: Vec<Transaction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeRequest {
    pub node: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectNodeResponse {
    pub message: String,
    pub total_nodes: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinNetworkResponse {
    pub message: String,
    pub announced: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewWalletResponse {
    pub private_key: String,
    pub public_key: Identity,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewTransactionRequest {
    pub transaction: Transaction,
    pub private_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddressRequest {
    pub address: Identity,
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn get_chain(State(state): State<AppState>) -> Json<PeerChain> {
    Json(PeerChain::new(state.blockchain.chain()))
}

async fn mine_block(State(state): State<AppState>) -> ApiResult<MineBlockResponse> {
    let blockchain = Arc::clone(&state.blockchain);
    let block = tokio::task::spawn_blocking(move || blockchain.mine())
        .await
        .map_err(|e| ApiError::Internal(format!("mining task failed: {}", e)))??;

    Ok(Json(MineBlockResponse {
        message: "Congratulations, you just mined a block!".to_string(),
        index: block.index,
        timestamp: block.timestamp,
        proof: block.proof,
        previous_hash: block.previous_hash,
        transactions: block.transactions,
    }))
}

async fn is_valid(State(state): State<AppState>) -> Json<MessageResponse> {
    let message = if state.blockchain.is_valid() {
        "All good. The Blockchain is valid."
    } else {
        "Houston, we have a problem. The Blockchain is not valid."
    };
    Json(MessageResponse {
        message: message.to_string(),
    })
}

/// Check the caller may create coins from `"root"`.
fn authorize_mint(mint: &MintConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    if !mint.enabled {
        return Err(ApiError::MintDisabled);
    }
    if let Some(expected) = &mint.token {
        let supplied = headers
            .get(MINT_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());
        if supplied != Some(expected.as_str()) {
            return Err(ApiError::Unauthorized);
        }
    }
    Ok(())
}

fn admit(
    state: &AppState,
    headers: &HeaderMap,
    tx: SignedTransaction,
) -> ApiResult<AddTransactionResponse> {
    if tx.transaction.is_issuance() {
        authorize_mint(&state.mint, headers)?;
    }
    let index = state.blockchain.submit_transaction(tx)?;
    Ok(Json(AddTransactionResponse {
        message: format!("This transaction will be added to Block {}", index),
        pending_transactions: state.blockchain.pending_transactions(),
    }))
}

async fn add_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(tx): Json<SignedTransaction>,
) -> ApiResult<AddTransactionResponse> {
    admit(&state, &headers, tx)
}

async fn new_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<NewTransactionRequest>,
) -> ApiResult<AddTransactionResponse> {
    let keypair = Keypair::from_private_key(&request.private_key)
        .map_err(|e| ApiError::InvalidInput(format!("invalid private key: {}", e)))?;
    admit(&state, &headers, request.transaction.signed(&keypair))
}

async fn get_balance(
    State(state): State<AppState>,
    Json(request): Json<AddressRequest>,
) -> Json<Balance> {
    Json(state.blockchain.balance(&request.address))
}

async fn get_transactions(
    State(state): State<AppState>,
    Json(request): Json<AddressRequest>,
) -> Json<History> {
    Json(state.blockchain.transactions_for(&request.address))
}

async fn connect_node(
    State(state): State<AppState>,
    Json(request): Json<NodeRequest>,
) -> ApiResult<ConnectNodeResponse> {
    let node = request.node.trim();
    if node.is_empty() {
        return Err(ApiError::InvalidInput("node address is empty".to_string()));
    }
    state.blockchain.add_node(node)?;
    Ok(Json(ConnectNodeResponse {
        message: "All the nodes are now connected.".to_string(),
        total_nodes: state.blockchain.node_count(),
    }))
}

async fn replace_chain(State(state): State<AppState>) -> ApiResult<MessageResponse> {
    let replaced = state.resolver.resolve(&state.blockchain).await?;
    let message = if replaced {
        "The nodes had different chains so the chain was replaced by the longest chain."
    } else {
        "All good. The chain is the largest one"
    };
    Ok(Json(MessageResponse {
        message: message.to_string(),
    }))
}

async fn join_network(
    State(state): State<AppState>,
    Json(request): Json<NodeRequest>,
) -> Json<JoinNetworkResponse> {
    let announced = state
        .resolver
        .announce(&state.blockchain, &request.node)
        .await;
    info!(node = %request.node, announced, "joined network");
    Json(JoinNetworkResponse {
        message: format!("Announced {} to {} node(s).", request.node, announced),
        announced,
    })
}

async fn new_wallet(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<NewWalletResponse> {
    authorize_mint(&state.mint, &headers)?;

    let bits = state.mint.key_bits;
    let keypair = tokio::task::spawn_blocking(move || Keypair::generate_with_bits(bits))
        .await
        .map_err(|e| ApiError::Internal(format!("key generation task failed: {}", e)))?
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let private_key = keypair
        .private_key()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let public_key = keypair
        .identity()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let grant = Transaction::issuance(public_key.clone(), state.mint.amount);
    state
        .blockchain
        .submit_transaction(SignedTransaction::unsigned(grant))?;
    info!(amount = state.mint.amount, "minted new wallet");

    Ok(Json(NewWalletResponse {
        private_key,
        public_key,
    }))
}
