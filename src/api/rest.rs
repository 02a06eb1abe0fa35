use crate::config::ApiConfig;
use crate::core::{Amount, Block, ChainInfo, Ledger, OutPoint, Transaction, UnspentRecord};
use crate::crypto::keys::{encode_address, parse_owner};
use crate::mining::MiningStats;
use crate::wallet::{WalletInfo, WalletStore};
use crate::{LedgerError, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }
}

type ApiReply<T> = (StatusCode, Json<ApiResponse<T>>);

fn reply<T>(result: Result<T>) -> ApiReply<T> {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                log::error!("API request failed: {}", e);
            }
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

fn status_for(error: &LedgerError) -> StatusCode {
    match error {
        LedgerError::InvalidTransaction(_)
        | LedgerError::InvalidInput(_)
        | LedgerError::Wallet(_)
        | LedgerError::Crypto(_)
        | LedgerError::Serialization(_) => StatusCode::BAD_REQUEST,
        LedgerError::MiningCancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthInfo {
    pub status: String,
    pub height: u64,
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub owner_hash: String,
    pub address: String,
    pub balance: String,
    pub base_units: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationInfo {
    pub valid: bool,
    pub failed_height: Option<u64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResult {
    pub txid: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MineRequest {
    /// Hex owner hash or address paid the block reward; empty block if absent.
    pub reward_to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWalletRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendRequest {
    pub inputs: Vec<OutPoint>,
    pub outputs: Vec<SendOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendOutput {
    pub to: String,
    /// Decimal amount, e.g. `"12.5"`.
    pub amount: String,
}

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub wallets: Option<WalletStore>,
}

pub struct RestApi {
    state: AppState,
    config: ApiConfig,
}

impl RestApi {
    pub fn new(ledger: Arc<Ledger>, wallets: Option<WalletStore>, config: ApiConfig) -> Self {
        Self {
            state: AppState { ledger, wallets },
            config,
        }
    }

    /// Serves until `shutdown` resolves.
    pub async fn start<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        log::info!("🚀 Starting REST API on port {}", self.config.rest_port);

        let app = self.create_router();
        let addr = format!("0.0.0.0:{}", self.config.rest_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        log::info!("✅ REST API listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        log::info!("🛑 REST API stopped");
        Ok(())
    }

    pub fn create_router(&self) -> Router {
        create_router(self.state.clone(), &self.config.cors_origins)
    }
}

pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let cors = if cors_origins.iter().any(|origin| origin == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = cors_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    log::warn!("Ignoring invalid CORS origin {:?}", origin);
                    None
                }
            })
            .collect();
        cors.allow_origin(AllowOrigin::list(origins))
    };

    Router::new()
        .route("/health", get(health_check))
        // Chain
        .route("/blockchain", get(get_blockchain))
        .route("/blocks/:height", get(get_block))
        .route("/chain/info", get(get_chain_info))
        .route("/chain/validate", get(validate_chain))
        .route("/mining/stats", get(get_mining_stats))
        .route("/mine", post(mine_block))
        .route("/transactions", post(submit_transaction))
        // Addresses
        .route("/addresses/:owner/balance", get(get_balance))
        .route("/addresses/:owner/utxos", get(get_utxos))
        // Wallets
        .route("/wallets", get(list_wallets).post(create_wallet))
        .route("/wallets/:name/send", post(send_from_wallet))
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state)
}

/// Runs `work` on the blocking pool; mining and sled writes do not belong on
/// the async workers.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| LedgerError::Internal(format!("Worker task failed: {}", e)))?
}

// Handler functions

async fn health_check(State(state): State<AppState>) -> ApiReply<HealthInfo> {
    reply(state.ledger.info().map(|info| HealthInfo {
        status: "healthy".to_string(),
        height: info.height,
        degraded: info.degraded,
    }))
}

async fn get_blockchain(State(state): State<AppState>) -> ApiReply<Vec<Block>> {
    reply(state.ledger.get_chain())
}

async fn get_block(State(state): State<AppState>, Path(height): Path<u64>) -> ApiReply<Block> {
    match state.ledger.get_block(height) {
        Ok(Some(block)) => reply(Ok(block)),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Block {} not found", height))),
        ),
        Err(e) => reply(Err(e)),
    }
}

async fn get_chain_info(State(state): State<AppState>) -> ApiReply<ChainInfo> {
    reply(state.ledger.info())
}

async fn get_mining_stats(State(state): State<AppState>) -> ApiReply<MiningStats> {
    reply(Ok(state.ledger.mining_stats()))
}

async fn validate_chain(State(state): State<AppState>) -> ApiReply<ValidationInfo> {
    let info = match state.ledger.verify_chain() {
        Ok(()) => ValidationInfo {
            valid: true,
            failed_height: None,
            reason: None,
        },
        Err(LedgerError::ConsensusViolation { height, reason }) => ValidationInfo {
            valid: false,
            failed_height: Some(height),
            reason: Some(reason),
        },
        Err(e) => return reply(Err(e)),
    };
    reply(Ok(info))
}

async fn mine_block(State(state): State<AppState>, body: Bytes) -> ApiReply<Block> {
    let request: MineRequest = if body.iter().all(u8::is_ascii_whitespace) {
        MineRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => return reply(Err(e.into())),
        }
    };

    let reward_owner = match request.reward_to.as_deref().map(parse_owner).transpose() {
        Ok(owner) => owner,
        Err(e) => return reply(Err(e)),
    };

    let ledger = state.ledger.clone();
    reply(
        blocking(move || match reward_owner {
            Some(owner) => ledger.mine_block(owner.as_bytes()),
            None => ledger.mine_empty_block(),
        })
        .await,
    )
}

async fn submit_transaction(
    State(state): State<AppState>,
    Json(tx): Json<Transaction>,
) -> ApiReply<SubmitResult> {
    let ledger = state.ledger.clone();
    reply(
        blocking(move || ledger.submit_transaction(tx))
            .await
            .map(|txid| SubmitResult { txid }),
    )
}

async fn get_balance(State(state): State<AppState>, Path(owner): Path<String>) -> ApiReply<BalanceInfo> {
    reply(parse_owner(&owner).and_then(|owner| {
        let balance = state.ledger.balance(owner.as_bytes())?;
        Ok(BalanceInfo {
            owner_hash: owner.to_hex(),
            address: encode_address(&owner),
            balance: balance.to_string(),
            base_units: balance.base_units(),
        })
    }))
}

async fn get_utxos(State(state): State<AppState>, Path(owner): Path<String>) -> ApiReply<Vec<UnspentRecord>> {
    reply(parse_owner(&owner).and_then(|owner| state.ledger.utxos(owner.as_bytes())))
}

fn wallet_store(state: &AppState) -> Result<WalletStore> {
    state
        .wallets
        .clone()
        .ok_or_else(|| LedgerError::Wallet("Wallets are not available on this node".to_string()))
}

async fn list_wallets(State(state): State<AppState>) -> ApiReply<Vec<WalletInfo>> {
    reply(wallet_store(&state).and_then(|wallets| wallets.list()))
}

async fn create_wallet(
    State(state): State<AppState>,
    Json(request): Json<CreateWalletRequest>,
) -> ApiReply<WalletInfo> {
    let wallets = match wallet_store(&state) {
        Ok(wallets) => wallets,
        Err(e) => return reply(Err(e)),
    };
    reply(
        blocking(move || wallets.create(&request.name))
            .await
            .map(|wallet| wallet.info),
    )
}

async fn send_from_wallet(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<SendRequest>,
) -> ApiReply<SubmitResult> {
    let wallets = match wallet_store(&state) {
        Ok(wallets) => wallets,
        Err(e) => return reply(Err(e)),
    };
    let ledger = state.ledger.clone();

    reply(
        blocking(move || {
            let wallet = wallets.load(&name)?;
            let outputs = request
                .outputs
                .iter()
                .map(|output| Ok((parse_owner(&output.to)?, output.amount.parse::<Amount>()?)))
                .collect::<Result<Vec<_>>>()?;

            let tx = wallet.build_transfer(request.inputs, outputs)?;
            ledger.submit_transaction(tx)
        })
        .await
        .map(|txid| SubmitResult { txid }),
    )
}
