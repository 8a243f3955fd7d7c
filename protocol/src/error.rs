//! Error types for vault operations.
//!
//! Every orchestrator operation that can fail returns a [`VaultError`].
//! Validation failures are detected before any ledger call is issued; ledger
//! failures carry the call that failed so multi-step operations can say which
//! step broke.

use thiserror::Error;

use crate::address::AddressError;
use crate::amount::{AmountError, Wei};
use crate::ledger::{LedgerCallFailed, LedgerOp, VaultId};

/// Errors surfaced by the vault operation orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// Bad input, caught before any ledger call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The amount exceeds a locally known balance. Caught before any ledger
    /// call; the ledger remains authoritative.
    #[error("insufficient funds: requested {requested} EDU, available {available} EDU")]
    InsufficientFunds {
        /// Amount the caller asked for.
        requested: Wei,
        /// Amount the cache says is available.
        available: Wei,
    },

    /// A ledger read or mutation failed.
    #[error(transparent)]
    LedgerCallFailed(#[from] LedgerCallFailed),

    /// A cached reference no longer matches what the ledger shows.
    #[error("state inconsistent: {0}")]
    StateInconsistent(String),

    /// No wallet is connected, so there is no sender and no view to load.
    #[error("no wallet connected")]
    NotConnected,
}

impl VaultError {
    /// `true` for errors raised before touching the ledger because of the
    /// caller's input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            VaultError::Validation(_) | VaultError::InsufficientFunds { .. }
        )
    }

    /// The ledger call that failed, if this is a ledger failure.
    pub fn failed_op(&self) -> Option<LedgerOp> {
        match self {
            VaultError::LedgerCallFailed(e) => Some(e.op),
            _ => None,
        }
    }

    pub(crate) fn vault_missing(vault: VaultId) -> Self {
        VaultError::StateInconsistent(format!("vault {} is not in the current vault set", vault))
    }
}

impl From<AmountError> for VaultError {
    fn from(e: AmountError) -> Self {
        VaultError::Validation(e.to_string())
    }
}

impl From<AddressError> for VaultError {
    fn from(e: AddressError) -> Self {
        VaultError::Validation(e.to_string())
    }
}

/// Result alias for orchestrator operations.
pub type VaultResult<T> = Result<T, VaultError>;
