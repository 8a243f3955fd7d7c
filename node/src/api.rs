//! # Devnet JSON-RPC API
//!
//! Builds the axum router that serves a [`LocalLedger`] over HTTP. All
//! endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path      | Description            |
//! |--------|-----------|------------------------|
//! | GET    | `/health` | Liveness probe         |
//! | GET    | `/status` | Node status summary    |
//! | POST   | `/rpc`    | JSON-RPC 2.0 gateway   |
//!
//! Mutating methods answer with the transaction hash as soon as the ledger
//! accepts the call. A background task waits for the commit and records the
//! outcome, which clients read back with `vault_getTransactionReceipt`.

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use edu_vault_contracts::LocalLedger;
use edu_vault_protocol::config::{NetworkConfig, RECEIPT_RETENTION_SECS};
use edu_vault_protocol::ledger::rpc::{
    AddressParams, CreateVaultParams, ReceiptParams, ReceiptResponse, RecipientAmountParams,
    RecipientBalanceParams, RecipientLookupParams, RegisterRecipientParams, RpcError, RpcMethod,
    RpcRequest, RpcResponse, SubmitResponse, TxStatus, VaultAmountParams, VaultParams,
};
use edu_vault_protocol::ledger::{LedgerClient, LedgerOp, LedgerResult, PendingTx};

use crate::metrics::SharedMetrics;
use crate::receipts::ReceiptBook;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Chain identity reported to clients.
    pub network: NetworkConfig,
    /// The ledger being served.
    pub ledger: LocalLedger,
    /// Outcome of transactions submitted through this node, by hash.
    pub receipts: ReceiptBook,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    /// State for serving `ledger` as `network`.
    pub fn new(ledger: LocalLedger, network: NetworkConfig, metrics: SharedMetrics) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            network,
            ledger,
            receipts: ReceiptBook::new(Duration::from_secs(RECEIPT_RETENTION_SECS)),
            metrics,
        }
    }

    /// Keeps settled receipts for `retention` instead of the default.
    pub fn with_receipt_retention(mut self, retention: Duration) -> Self {
        self.receipts = ReceiptBook::new(retention);
        self
    }

    fn record_ledger_gauges(&self) {
        self.metrics.vaults.set(self.ledger.vault_count() as i64);
        self.metrics.block_height.set(self.ledger.block_height() as i64);
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Chain id, `0x`-prefixed hex.
    pub chain_id: String,
    /// Chain display name.
    pub chain_name: String,
    /// Height of the last block that committed a transaction.
    pub block_height: u64,
    /// Vaults on the ledger.
    pub vaults: usize,
    /// Submitted transactions not yet committed or reverted.
    pub pending_transactions: usize,
    /// Receipts still queryable, pending or settled.
    pub receipts_held: usize,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: 200 while the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: node status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pending = state.receipts.pending();
    state.record_ledger_gauges();

    Json(StatusResponse {
        version: state.version.clone(),
        chain_id: state.network.chain_id_hex(),
        chain_name: state.network.chain_name.clone(),
        block_height: state.ledger.block_height(),
        vaults: state.ledger.vault_count(),
        pending_transactions: pending,
        receipts_held: state.receipts.len(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /rpc`: JSON-RPC 2.0 gateway.
///
/// The body is decoded by hand so that malformed JSON gets a JSON-RPC parse
/// error rather than an HTTP rejection.
async fn rpc_handler(State(state): State<AppState>, body: Bytes) -> Json<RpcResponse> {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return Json(RpcResponse::error(
                Value::Null,
                RpcError::parse_error(format!("Parse error: {}", e)),
            ))
        }
    };
    let id = raw.get("id").cloned().unwrap_or(Value::Null);

    let req: RpcRequest = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(e) => {
            return Json(RpcResponse::error(
                id,
                RpcError::invalid_request(format!("Invalid Request: {}", e)),
            ))
        }
    };
    if req.jsonrpc != "2.0" {
        return Json(RpcResponse::error(
            req.id,
            RpcError::invalid_request("Invalid Request: jsonrpc must be \"2.0\""),
        ));
    }

    let Some(method) = RpcMethod::parse(&req.method) else {
        state
            .metrics
            .rpc_requests_total
            .with_label_values(&["unknown"])
            .inc();
        return Json(RpcResponse::error(req.id, RpcError::method_not_found(&req.method)));
    };
    let method_name = method.name();
    state
        .metrics
        .rpc_requests_total
        .with_label_values(&[method_name.as_str()])
        .inc();

    let response = match dispatch(&state, method, req.params).await {
        Ok(result) => RpcResponse::success(req.id, result),
        Err(error) => {
            tracing::debug!(method = %method_name, code = error.code, message = %error.message, "rpc error");
            RpcResponse::error(req.id, error)
        }
    };
    Json(response)
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

async fn dispatch(state: &AppState, method: RpcMethod, params: Value) -> Result<Value, RpcError> {
    match method {
        RpcMethod::ChainId => Ok(Value::String(state.network.chain_id_hex())),
        RpcMethod::GetTransactionReceipt => {
            let p: ReceiptParams = decode(params)?;
            let receipt = state
                .receipts
                .get(&p.tx_hash)
                .ok_or_else(|| RpcError::unknown_transaction(&p.tx_hash))?;
            encode(&receipt)
        }
        RpcMethod::Ledger(op) => call_ledger(state, op, params).await,
    }
}

async fn call_ledger(state: &AppState, op: LedgerOp, params: Value) -> Result<Value, RpcError> {
    let ledger = &state.ledger;
    match op {
        LedgerOp::ListDepositorVaults => {
            let p: AddressParams = decode(params)?;
            reply(ledger.list_depositor_vaults(&p.address).await)
        }
        LedgerOp::ListRecipientVaults => {
            let p: AddressParams = decode(params)?;
            reply(ledger.list_recipient_vaults(&p.address).await)
        }
        LedgerOp::GetVaultName => {
            let p: VaultParams = decode(params)?;
            reply(ledger.vault_name(p.vault_id).await)
        }
        LedgerOp::GetTotalDeposit => {
            let p: VaultParams = decode(params)?;
            reply(ledger.total_deposit(p.vault_id).await)
        }
        LedgerOp::GetTotalAllocated => {
            let p: VaultParams = decode(params)?;
            reply(ledger.total_allocated(p.vault_id).await)
        }
        LedgerOp::GetRecipientId => {
            let p: RecipientLookupParams = decode(params)?;
            reply(ledger.recipient_id(p.vault_id, &p.address).await)
        }
        LedgerOp::GetRecipientBalance => {
            let p: RecipientBalanceParams = decode(params)?;
            reply(ledger.recipient_balance(p.vault_id, p.recipient_id).await)
        }
        LedgerOp::ListRecipients => {
            let p: VaultParams = decode(params)?;
            reply(ledger.list_recipients(p.vault_id).await)
        }
        LedgerOp::GetNativeBalance => {
            let p: AddressParams = decode(params)?;
            reply(ledger.native_balance(&p.address).await)
        }
        LedgerOp::CreateVault => {
            let p: CreateVaultParams = decode(params)?;
            track(state, ledger.create_vault(&p.from, &p.name).await)
        }
        LedgerOp::Deposit => {
            let p: VaultAmountParams = decode(params)?;
            track(state, ledger.deposit(&p.from, p.vault_id, p.amount).await)
        }
        LedgerOp::DepositorWithdraw => {
            let p: VaultAmountParams = decode(params)?;
            track(state, ledger.depositor_withdraw(&p.from, p.vault_id, p.amount).await)
        }
        LedgerOp::RegisterRecipient => {
            let p: RegisterRecipientParams = decode(params)?;
            track(state, ledger.register_recipient(&p.from, p.vault_id, &p.recipient).await)
        }
        LedgerOp::Allocate => {
            let p: RecipientAmountParams = decode(params)?;
            track(
                state,
                ledger.allocate(&p.from, p.vault_id, p.amount, p.recipient_id).await,
            )
        }
        LedgerOp::RecipientWithdraw => {
            let p: RecipientAmountParams = decode(params)?;
            track(
                state,
                ledger
                    .recipient_withdraw(&p.from, p.vault_id, p.amount, p.recipient_id)
                    .await,
            )
        }
    }
}

/// Records a submitted transaction as pending and spawns the task that
/// settles its receipt.
fn track(state: &AppState, submitted: LedgerResult<PendingTx>) -> Result<Value, RpcError> {
    let pending = submitted.map_err(|e| RpcError::call_rejected(&e))?;
    let op = pending.op();
    let tx_hash = pending.tx_hash().to_string();

    state.receipts.record(ReceiptResponse {
        tx_hash: tx_hash.clone(),
        op,
        status: TxStatus::Pending,
        block_number: None,
        reason: None,
    });
    state.metrics.tx_submitted_total.inc();
    tracing::info!(%op, %tx_hash, "transaction accepted");

    let settle = state.clone();
    let hash = tx_hash.clone();
    tokio::spawn(async move {
        let receipt = match pending.confirmed().await {
            Ok(committed) => {
                settle.metrics.tx_confirmed_total.inc();
                tracing::info!(%op, tx_hash = %hash, block_number = committed.block_number, "transaction committed");
                ReceiptResponse {
                    tx_hash: hash.clone(),
                    op,
                    status: TxStatus::Confirmed,
                    block_number: Some(committed.block_number),
                    reason: None,
                }
            }
            Err(e) => {
                settle.metrics.tx_reverted_total.inc();
                tracing::warn!(%op, tx_hash = %hash, reason = %e.reason, "transaction reverted");
                ReceiptResponse {
                    tx_hash: hash.clone(),
                    op,
                    status: TxStatus::Reverted,
                    block_number: None,
                    reason: Some(e.reason),
                }
            }
        };
        settle.receipts.record(receipt);
        settle.record_ledger_gauges();
    });

    encode(&SubmitResponse { tx_hash })
}

fn decode<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(format!("Invalid params: {}", e)))
}

fn encode<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(format!("Internal error: {}", e)))
}

fn reply<T: Serialize>(result: LedgerResult<T>) -> Result<Value, RpcError> {
    let value = result.map_err(|e| RpcError::call_rejected(&e))?;
    encode(&value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
