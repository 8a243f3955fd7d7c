//! # JSON-RPC API Definitions
//!
//! Wire types for the vault ledger's JSON-RPC 2.0 surface. The devnet node
//! serves these (using axum) and HTTP ledger clients speak them; both sides
//! share this module so the method names and payload shapes cannot drift.
//!
//! Method names are the ledger call names prefixed with `vault_`. Params are
//! named JSON objects and amounts travel as decimal strings of wei.
//!
//! ## Method Index
//!
//! | Method                           | Kind     |
//! |----------------------------------|----------|
//! | `vault_listDepositorVaults`      | read     |
//! | `vault_listRecipientVaults`      | read     |
//! | `vault_getVaultName`             | read     |
//! | `vault_getTotalDeposit`          | read     |
//! | `vault_getTotalAllocated`        | read     |
//! | `vault_getRecipientId`           | read     |
//! | `vault_getRecipientBalance`      | read     |
//! | `vault_listRecipients`           | read     |
//! | `vault_createVault`              | mutating |
//! | `vault_deposit`                  | mutating |
//! | `vault_depositorWithdraw`        | mutating |
//! | `vault_registerRecipient`        | mutating |
//! | `vault_allocate`                 | mutating |
//! | `vault_recipientWithdraw`        | mutating |
//! | `vault_getTransactionReceipt`    | receipt  |
//! | `vault_chainId`                  | info     |

use serde::{Deserialize, Serialize};

use super::{FailureCause, LedgerCallFailed, LedgerOp, RecipientId, VaultId};
use crate::address::Address;
use crate::amount::Wei;

/// Prefix shared by every method name.
pub const METHOD_PREFIX: &str = "vault_";

/// Method name for receipt polling.
pub const GET_TRANSACTION_RECEIPT: &str = "vault_getTransactionReceipt";

/// Method name for the chain id query.
pub const CHAIN_ID: &str = "vault_chainId";

/// Error code for a ledger call that failed.
pub const CALL_REJECTED: i32 = -32010;

/// Error code for a receipt query about a hash the node never saw.
pub const UNKNOWN_TRANSACTION: i32 = -32011;

// ---------------------------------------------------------------------------
// RPC Method Enumeration
// ---------------------------------------------------------------------------

/// Every method the node understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMethod {
    /// One of the ledger calls.
    Ledger(LedgerOp),
    /// `vault_getTransactionReceipt`
    GetTransactionReceipt,
    /// `vault_chainId`
    ChainId,
}

impl RpcMethod {
    /// Wire name of the method.
    pub fn name(self) -> String {
        match self {
            RpcMethod::Ledger(op) => format!("{}{}", METHOD_PREFIX, op.name()),
            RpcMethod::GetTransactionReceipt => GET_TRANSACTION_RECEIPT.to_string(),
            RpcMethod::ChainId => CHAIN_ID.to_string(),
        }
    }

    /// Resolves a wire name. `None` for unknown methods.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            GET_TRANSACTION_RECEIPT => return Some(RpcMethod::GetTransactionReceipt),
            CHAIN_ID => return Some(RpcMethod::ChainId),
            _ => {}
        }
        let call = name.strip_prefix(METHOD_PREFIX)?;
        LedgerOp::ALL
            .iter()
            .copied()
            .find(|op| op.name() == call)
            .map(RpcMethod::Ledger)
    }
}

// ---------------------------------------------------------------------------
// RPC Request / Response
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version. Always "2.0".
    pub jsonrpc: String,
    /// Request identifier. Echoed back in the response.
    pub id: serde_json::Value,
    /// Wire method name.
    pub method: String,
    /// Method-specific parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RpcRequest {
    /// Creates a request for `method` with serialized `params`.
    pub fn new(id: u64, method: RpcMethod, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: serde_json::json!(id),
            method: method.name(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response. Exactly one of `result` or `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// JSON-RPC version. Always "2.0".
    pub jsonrpc: String,
    /// The request ID this response corresponds to.
    pub id: serde_json::Value,
    /// The successful result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// The error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Creates a successful response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

// ---------------------------------------------------------------------------
// RPC Errors
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 error object.
///
/// - `-32700`: Parse error
/// - `-32600`: Invalid request
/// - `-32601`: Method not found
/// - `-32602`: Invalid params
/// - `-32603`: Internal error
/// - `-32010`: A ledger call failed (`data` names the op and cause)
/// - `-32011`: Unknown transaction hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// JSON parse error.
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::with_code(-32700, msg)
    }

    /// Invalid JSON-RPC request structure.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::with_code(-32600, msg)
    }

    /// The requested method does not exist.
    pub fn method_not_found(method: &str) -> Self {
        Self::with_code(-32601, format!("method not found: {}", method))
    }

    /// Invalid method parameters.
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::with_code(-32602, msg)
    }

    /// Internal server error.
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::with_code(-32603, msg)
    }

    /// The ledger call failed. `data` carries the op and the cause so a
    /// client can rebuild the [`LedgerCallFailed`].
    pub fn call_rejected(failure: &LedgerCallFailed) -> Self {
        Self {
            code: CALL_REJECTED,
            message: failure.reason.clone(),
            data: Some(serde_json::json!({
                "op": failure.op,
                "cause": failure.cause,
            })),
        }
    }

    /// Rebuilds the ledger failure behind this error. `op` is used when the
    /// error does not name one; the cause defaults to `Rejected`.
    pub fn into_ledger_failure(self, op: LedgerOp) -> LedgerCallFailed {
        #[derive(Deserialize)]
        struct Detail {
            op: Option<LedgerOp>,
            cause: Option<FailureCause>,
        }

        let detail = self
            .data
            .and_then(|data| serde_json::from_value::<Detail>(data).ok());
        let (op, cause) = match detail {
            Some(d) => (d.op.unwrap_or(op), d.cause.unwrap_or(FailureCause::Rejected)),
            None => (op, FailureCause::Rejected),
        };
        LedgerCallFailed::new(op, cause, self.message)
    }

    /// No transaction with this hash was ever submitted.
    pub fn unknown_transaction(tx_hash: &str) -> Self {
        Self::with_code(UNKNOWN_TRANSACTION, format!("unknown transaction: {}", tx_hash))
    }
}

// ---------------------------------------------------------------------------
// Params
// ---------------------------------------------------------------------------

/// `{address}`: vault listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressParams {
    pub address: Address,
}

/// `{vault_id}`: per-vault reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultParams {
    pub vault_id: VaultId,
}

/// `{vault_id, address}`: recipient id lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientLookupParams {
    pub vault_id: VaultId,
    pub address: Address,
}

/// `{vault_id, recipient_id}`: recipient balance lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientBalanceParams {
    pub vault_id: VaultId,
    pub recipient_id: RecipientId,
}

/// `{from, name}`: vault creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVaultParams {
    pub from: Address,
    pub name: String,
}

/// `{from, vault_id, amount}`: deposit and depositor withdraw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultAmountParams {
    pub from: Address,
    pub vault_id: VaultId,
    pub amount: Wei,
}

/// `{from, vault_id, recipient}`: recipient registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRecipientParams {
    pub from: Address,
    pub vault_id: VaultId,
    pub recipient: Address,
}

/// `{from, vault_id, amount, recipient_id}`: allocate and recipient withdraw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientAmountParams {
    pub from: Address,
    pub vault_id: VaultId,
    pub amount: Wei,
    pub recipient_id: RecipientId,
}

/// `{tx_hash}`: receipt polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptParams {
    pub tx_hash: String,
}

// ---------------------------------------------------------------------------
// Typed Response Payloads
// ---------------------------------------------------------------------------

/// Result of every mutating method: the hash to poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub tx_hash: String,
}

/// Lifecycle of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Accepted, not yet committed.
    Pending,
    /// Durably committed.
    Confirmed,
    /// Executed and reverted.
    Reverted,
}

/// Result of `vault_getTransactionReceipt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptResponse {
    pub tx_hash: String,
    pub op: LedgerOp,
    pub status: TxStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
