//! # Vault Operation Orchestrator
//!
//! Turns user intents into ordered ledger calls. Every operation follows the
//! same shape:
//!
//! ```text
//!   intent ──► validate against VaultCache ──► LedgerClient call(s)
//!                     │                              │
//!                     │ (error, no call)             ▼
//!                     ▼                       await confirmation
//!                  caller ◄── result ◄── refresh VaultCache
//! ```
//!
//! The orchestrator is a cheap `Clone` handle. It owns the [`VaultCache`],
//! reads the connected address from the injected [`WalletSession`] and
//! records per-kind status on an [`OperationBoard`].
//!
//! Operations are grouped by role:
//!
//! - [`DepositorDesk`] (`depositor.rs`): refresh, create, deposit, withdraw,
//!   and the two-phase [`AllocationFlow`] (`allocation.rs`).
//! - [`RecipientDesk`] (`recipient.rs`): refresh and claim.
//!
//! ## Session changes
//!
//! The cache belongs to one session epoch. Whenever the orchestrator notices
//! the epoch moved, on any call, it invalidates the cache and drops the
//! current selection before doing anything else.

pub mod allocation;
pub mod depositor;
pub mod recipient;

pub use allocation::{
    AllocationFailure, AllocationFlow, AllocationProgress, AllocationReceipt, AllocationStage,
    AllocationStep,
};
pub use depositor::{CreatedVaults, DepositorDesk, VaultMutation};
pub use recipient::{ClaimOutcome, RecipientDesk};

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::address::Address;
use crate::amount::Wei;
use crate::cache::{Role, VaultCache, VaultSet, VaultSnapshot};
use crate::error::{VaultError, VaultResult};
use crate::ledger::{LedgerClient, PendingTx, TxReceipt, VaultId};
use crate::operation::{OperationBoard, OperationKind};
use crate::session::WalletSession;

struct Inner<L: ?Sized> {
    ledger: Arc<L>,
    session: Arc<WalletSession>,
    cache: VaultCache<L>,
    board: OperationBoard,
    bound_epoch: Mutex<u64>,
    selected: Mutex<Option<VaultId>>,
}

/// Shared handle to the orchestrator.
pub struct VaultOrchestrator<L: ?Sized> {
    inner: Arc<Inner<L>>,
}

impl<L: ?Sized> Clone for VaultOrchestrator<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: LedgerClient + ?Sized> VaultOrchestrator<L> {
    /// Builds an orchestrator over `ledger` for `session`.
    pub fn new(ledger: Arc<L>, session: Arc<WalletSession>) -> Self {
        let epoch = session.epoch();
        Self {
            inner: Arc::new(Inner {
                cache: VaultCache::new(Arc::clone(&ledger)),
                ledger,
                session,
                board: OperationBoard::new(),
                bound_epoch: Mutex::new(epoch),
                selected: Mutex::new(None),
            }),
        }
    }

    /// Operations for the depositor role.
    pub fn depositor(&self) -> DepositorDesk<L> {
        DepositorDesk::new(self.clone())
    }

    /// Operations for the recipient role.
    pub fn recipient(&self) -> RecipientDesk<L> {
        RecipientDesk::new(self.clone())
    }

    /// The injected session.
    pub fn session(&self) -> &Arc<WalletSession> {
        &self.inner.session
    }

    /// The ledger client.
    pub fn ledger(&self) -> &Arc<L> {
        &self.inner.ledger
    }

    /// Native balance of the connected wallet, read from the ledger.
    pub async fn wallet_balance(&self) -> VaultResult<Wei> {
        let address = self.connected_address()?;
        let balance = self.inner.ledger.native_balance(&address).await?;
        tracing::debug!(%address, %balance, "wallet balance read");
        Ok(balance)
    }

    /// Per-kind operation status.
    pub fn board(&self) -> &OperationBoard {
        &self.inner.board
    }

    /// `true` while an operation of `kind` is running.
    pub fn in_progress(&self, kind: OperationKind) -> bool {
        self.inner.board.in_progress(kind)
    }

    /// Last error of `kind`, if its last run failed.
    pub fn last_error(&self, kind: OperationKind) -> Option<VaultError> {
        self.inner.board.last_error(kind)
    }

    /// The cached vault set for the current session.
    pub fn vaults(&self) -> Option<VaultSet> {
        self.sync_session();
        self.inner.cache.view()
    }

    /// Last snapshot of `vault` for the current session.
    pub fn snapshot(&self, vault: VaultId) -> Option<VaultSnapshot> {
        self.sync_session();
        self.inner.cache.get(vault)
    }

    /// Makes `vault` the current selection. It must be in the cached set.
    pub fn select(&self, vault: VaultId) -> VaultResult<VaultSnapshot> {
        self.sync_session();
        let snapshot = self
            .inner
            .cache
            .get(vault)
            .ok_or_else(|| VaultError::vault_missing(vault))?;
        *self.inner.selected.lock() = Some(vault);
        Ok(snapshot)
    }

    /// The current selection, if any.
    ///
    /// Fails with `StateInconsistent` if the selected vault is no longer in
    /// the cached set; the selection is cleared in that case.
    pub fn selected(&self) -> VaultResult<Option<VaultSnapshot>> {
        self.sync_session();
        let mut selected = self.inner.selected.lock();
        let Some(vault) = *selected else {
            return Ok(None);
        };
        match self.inner.cache.get(vault) {
            Some(snapshot) => Ok(Some(snapshot)),
            None => {
                *selected = None;
                Err(VaultError::vault_missing(vault))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Shared plumbing for the desks
    // -----------------------------------------------------------------------

    /// Reconciles the cache with the session epoch and returns the connected
    /// address.
    ///
    /// A cached set loaded for any address other than the connected one is
    /// dropped as well, whatever the epoch says.
    fn sync_session(&self) -> Option<Address> {
        let state = self.inner.session.snapshot();
        let mut bound = self.inner.bound_epoch.lock();
        if *bound != state.epoch {
            self.inner.cache.invalidate();
            *self.inner.selected.lock() = None;
            tracing::debug!(from = *bound, to = state.epoch, "session changed; vault cache dropped");
            *bound = state.epoch;
        } else if let Some(owner) = self.inner.cache.owner() {
            if state.address.as_ref() != Some(&owner) {
                self.inner.cache.invalidate();
                *self.inner.selected.lock() = None;
                tracing::debug!(%owner, "cached vaults belong to another wallet; dropped");
            }
        }
        state.address
    }

    pub(crate) fn connected_address(&self) -> VaultResult<Address> {
        self.sync_session().ok_or(VaultError::NotConnected)
    }

    /// Cached snapshot of `vault`, only if the cache holds the `role` view.
    pub(crate) fn cached(&self, role: Role, vault: VaultId) -> Option<VaultSnapshot> {
        self.sync_session();
        if self.inner.cache.role() != Some(role) {
            return None;
        }
        self.inner.cache.get(vault)
    }

    /// Reloads the `role` view for `address`, which must still be the
    /// connected wallet.
    pub(crate) async fn refresh(&self, role: Role, address: &Address) -> VaultResult<VaultSet> {
        if self.sync_session().as_ref() != Some(address) {
            tracing::debug!(%role, %address, "wallet changed before refresh; not loading");
            return Err(VaultError::StateInconsistent(format!(
                "wallet {} is no longer connected",
                address
            )));
        }
        self.inner.cache.refresh_all(role, address).await
    }

    /// Refresh that follows a committed mutation. A failure here reports the
    /// read call, not the mutation.
    pub(crate) async fn refresh_after(
        &self,
        role: Role,
        address: &Address,
        committed: &TxReceipt,
    ) -> VaultResult<VaultSet> {
        self.refresh(role, address).await.map_err(|e| {
            tracing::warn!(
                op = %committed.op,
                tx_hash = %committed.tx_hash,
                error = %e,
                "mutation committed but vault refresh failed"
            );
            e
        })
    }

    /// Waits for a submitted transaction to commit.
    pub(crate) async fn confirm(&self, pending: PendingTx) -> VaultResult<TxReceipt> {
        let op = pending.op();
        let tx_hash = pending.tx_hash().to_string();
        tracing::debug!(%op, %tx_hash, "awaiting confirmation");
        match pending.confirmed().await {
            Ok(receipt) => {
                tracing::info!(
                    %op,
                    tx_hash = %receipt.tx_hash,
                    block = receipt.block_number,
                    "transaction confirmed"
                );
                Ok(receipt)
            }
            Err(e) => {
                tracing::warn!(%op, %tx_hash, error = %e, "transaction failed");
                Err(e.into())
            }
        }
    }

    /// Runs one operation of `kind` with board bookkeeping.
    pub(crate) async fn track<T, F>(&self, kind: OperationKind, operation: F) -> VaultResult<T>
    where
        F: Future<Output = VaultResult<T>>,
    {
        self.inner.board.begin(kind);
        let outcome = operation.await;
        self.inner.board.finish(kind, &outcome);
        if let Err(e) = &outcome {
            if e.is_validation() {
                tracing::debug!(%kind, error = %e, "operation refused");
            } else {
                tracing::warn!(%kind, error = %e, "operation failed");
            }
        }
        outcome
    }

    pub(crate) fn park(&self, kind: OperationKind) {
        self.inner.board.park(kind);
    }
}

/// Parses a whole-unit amount and requires it to be positive.
pub(crate) fn positive_amount(text: &str) -> VaultResult<Wei> {
    let amount = Wei::parse_ether(text)?;
    if amount.is_zero() {
        return Err(VaultError::Validation(
            "amount must be greater than zero".to_string(),
        ));
    }
    Ok(amount)
}
