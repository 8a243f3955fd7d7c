//! # Ledger Client Contract
//!
//! The vault contract is an external service. Everything the orchestrator
//! knows about it goes through [`LedgerClient`]: eight read calls that return
//! a value, and six mutating calls that return a [`PendingTx`] which resolves
//! only once the change is durably committed.
//!
//! ```text
//! rpc.rs  — JSON-RPC 2.0 wire types shared by the devnet node and HTTP clients
//! ```
//!
//! A submitted-but-unconfirmed transaction is not a success. Callers must
//! drive [`PendingTx::confirmed`] to completion before treating a mutation
//! as done.

pub mod rpc;

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;
use crate::amount::Wei;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Ledger-assigned vault identifier. Immutable once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultId(pub u64);

impl fmt::Display for VaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a registered recipient within one vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(pub u64);

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of a vault's recipient list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientEntry {
    /// The registered address.
    pub address: Address,
    /// Its id within the vault.
    pub recipient_id: RecipientId,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Every call in the ledger surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LedgerOp {
    ListDepositorVaults,
    ListRecipientVaults,
    GetVaultName,
    GetTotalDeposit,
    GetTotalAllocated,
    GetRecipientId,
    GetRecipientBalance,
    ListRecipients,
    GetNativeBalance,
    CreateVault,
    Deposit,
    DepositorWithdraw,
    RegisterRecipient,
    Allocate,
    RecipientWithdraw,
}

impl LedgerOp {
    /// Every call, reads first.
    pub const ALL: [LedgerOp; 15] = [
        LedgerOp::ListDepositorVaults,
        LedgerOp::ListRecipientVaults,
        LedgerOp::GetVaultName,
        LedgerOp::GetTotalDeposit,
        LedgerOp::GetTotalAllocated,
        LedgerOp::GetRecipientId,
        LedgerOp::GetRecipientBalance,
        LedgerOp::ListRecipients,
        LedgerOp::GetNativeBalance,
        LedgerOp::CreateVault,
        LedgerOp::Deposit,
        LedgerOp::DepositorWithdraw,
        LedgerOp::RegisterRecipient,
        LedgerOp::Allocate,
        LedgerOp::RecipientWithdraw,
    ];

    /// The call's name in the ledger surface.
    pub fn name(self) -> &'static str {
        match self {
            LedgerOp::ListDepositorVaults => "listDepositorVaults",
            LedgerOp::ListRecipientVaults => "listRecipientVaults",
            LedgerOp::GetVaultName => "getVaultName",
            LedgerOp::GetTotalDeposit => "getTotalDeposit",
            LedgerOp::GetTotalAllocated => "getTotalAllocated",
            LedgerOp::GetRecipientId => "getRecipientId",
            LedgerOp::GetRecipientBalance => "getRecipientBalance",
            LedgerOp::ListRecipients => "listRecipients",
            LedgerOp::GetNativeBalance => "getNativeBalance",
            LedgerOp::CreateVault => "createVault",
            LedgerOp::Deposit => "deposit",
            LedgerOp::DepositorWithdraw => "depositorWithdraw",
            LedgerOp::RegisterRecipient => "registerRecipient",
            LedgerOp::Allocate => "allocate",
            LedgerOp::RecipientWithdraw => "recipientWithdraw",
        }
    }

    /// `true` for calls that change ledger state and return a pending handle.
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            LedgerOp::CreateVault
                | LedgerOp::Deposit
                | LedgerOp::DepositorWithdraw
                | LedgerOp::RegisterRecipient
                | LedgerOp::Allocate
                | LedgerOp::RecipientWithdraw
        )
    }
}

impl fmt::Display for LedgerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Coarse classification of a failed call. Informational only: the
/// orchestrator never branches on it and never interprets revert reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The ledger could not be reached.
    Transport,
    /// The ledger refused the call before executing it.
    Rejected,
    /// The transaction executed and reverted.
    Reverted,
    /// The ledger answered with something we could not decode.
    Malformed,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureCause::Transport => "transport",
            FailureCause::Rejected => "rejected",
            FailureCause::Reverted => "reverted",
            FailureCause::Malformed => "malformed",
        };
        f.write_str(s)
    }
}

/// The one error kind a ledger call can produce.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ledger call {op} failed ({cause}): {reason}")]
pub struct LedgerCallFailed {
    /// The call that was attempted.
    pub op: LedgerOp,
    /// Coarse classification.
    pub cause: FailureCause,
    /// Uninterpreted detail from the transport or the ledger.
    pub reason: String,
}

impl LedgerCallFailed {
    /// Builds a failure for `op`.
    pub fn new(op: LedgerOp, cause: FailureCause, reason: impl Into<String>) -> Self {
        Self {
            op,
            cause,
            reason: reason.into(),
        }
    }

    /// The ledger could not be reached.
    pub fn transport(op: LedgerOp, reason: impl Into<String>) -> Self {
        Self::new(op, FailureCause::Transport, reason)
    }

    /// The ledger refused the call.
    pub fn rejected(op: LedgerOp, reason: impl Into<String>) -> Self {
        Self::new(op, FailureCause::Rejected, reason)
    }

    /// The transaction reverted.
    pub fn reverted(op: LedgerOp, reason: impl Into<String>) -> Self {
        Self::new(op, FailureCause::Reverted, reason)
    }

    /// The response could not be decoded.
    pub fn malformed(op: LedgerOp, reason: impl Into<String>) -> Self {
        Self::new(op, FailureCause::Malformed, reason)
    }
}

/// Result alias for ledger calls.
pub type LedgerResult<T> = Result<T, LedgerCallFailed>;

// ---------------------------------------------------------------------------
// Pending transactions
// ---------------------------------------------------------------------------

/// Proof that a mutating call was durably committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// The call that was committed.
    pub op: LedgerOp,
    /// Transaction hash (`0x` + hex).
    pub tx_hash: String,
    /// Block the transaction landed in.
    pub block_number: u64,
}

/// Handle to a submitted mutating call.
///
/// Holding one means the ledger accepted the transaction for inclusion, not
/// that it committed. Only [`PendingTx::confirmed`] tells you that.
#[must_use = "a pending transaction must be awaited to confirmation"]
pub struct PendingTx {
    op: LedgerOp,
    tx_hash: String,
    confirmation: BoxFuture<'static, LedgerResult<TxReceipt>>,
}

impl PendingTx {
    /// Wraps a confirmation future produced by a ledger client.
    pub fn new<F>(op: LedgerOp, tx_hash: impl Into<String>, confirmation: F) -> Self
    where
        F: Future<Output = LedgerResult<TxReceipt>> + Send + 'static,
    {
        Self {
            op,
            tx_hash: tx_hash.into(),
            confirmation: confirmation.boxed(),
        }
    }

    /// The submitted call.
    pub fn op(&self) -> LedgerOp {
        self.op
    }

    /// Hash of the submitted transaction.
    pub fn tx_hash(&self) -> &str {
        &self.tx_hash
    }

    /// Waits until the ledger commits or rejects the transaction.
    pub async fn confirmed(self) -> LedgerResult<TxReceipt> {
        self.confirmation.await
    }
}

impl fmt::Debug for PendingTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTx")
            .field("op", &self.op)
            .field("tx_hash", &self.tx_hash)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// LedgerClient
// ---------------------------------------------------------------------------

/// Typed access to the vault ledger.
///
/// Mutating calls carry `from`, the connected wallet address on whose behalf
/// the transaction is sent. Authorizing that sender is the transport's job.
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// Vaults where `depositor` is the depositor.
    async fn list_depositor_vaults(&self, depositor: &Address) -> LedgerResult<Vec<VaultId>>;

    /// Vaults where `recipient` currently has a positive claimable balance.
    async fn list_recipient_vaults(&self, recipient: &Address) -> LedgerResult<Vec<VaultId>>;

    /// The vault's name.
    async fn vault_name(&self, vault: VaultId) -> LedgerResult<String>;

    /// Total deposited into the vault.
    async fn total_deposit(&self, vault: VaultId) -> LedgerResult<Wei>;

    /// Total allocated to recipients of the vault.
    async fn total_allocated(&self, vault: VaultId) -> LedgerResult<Wei>;

    /// Recipient id of `address` in `vault`.
    async fn recipient_id(&self, vault: VaultId, address: &Address) -> LedgerResult<RecipientId>;

    /// Claimable balance of `recipient` in `vault`.
    async fn recipient_balance(&self, vault: VaultId, recipient: RecipientId) -> LedgerResult<Wei>;

    /// Every registered recipient of the vault, in ledger order.
    async fn list_recipients(&self, vault: VaultId) -> LedgerResult<Vec<RecipientEntry>>;

    /// Native currency balance of `address`, in the smallest unit.
    async fn native_balance(&self, address: &Address) -> LedgerResult<Wei>;

    /// Creates a vault named `name` owned by `from`.
    async fn create_vault(&self, from: &Address, name: &str) -> LedgerResult<PendingTx>;

    /// Deposits `amount` (attached as value) into `vault`.
    async fn deposit(&self, from: &Address, vault: VaultId, amount: Wei) -> LedgerResult<PendingTx>;

    /// Withdraws `amount` from `vault` back to its depositor.
    async fn depositor_withdraw(
        &self,
        from: &Address,
        vault: VaultId,
        amount: Wei,
    ) -> LedgerResult<PendingTx>;

    /// Registers `recipient` on `vault`.
    async fn register_recipient(
        &self,
        from: &Address,
        vault: VaultId,
        recipient: &Address,
    ) -> LedgerResult<PendingTx>;

    /// Allocates `amount` of `vault` to `recipient`.
    async fn allocate(
        &self,
        from: &Address,
        vault: VaultId,
        amount: Wei,
        recipient: RecipientId,
    ) -> LedgerResult<PendingTx>;

    /// Withdraws `amount` of the recipient's claimable balance.
    async fn recipient_withdraw(
        &self,
        from: &Address,
        vault: VaultId,
        amount: Wei,
        recipient: RecipientId,
    ) -> LedgerResult<PendingTx>;
}
