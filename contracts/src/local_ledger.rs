//! # Local Ledger
//!
//! A [`LedgerClient`] backed by an in-process [`VaultRegistry`]. It behaves
//! like a remote ledger where it matters to the orchestrator:
//!
//! - Mutating calls return a [`PendingTx`] right away. The change is applied
//!   by a background task after the confirmation delay, in its own block.
//! - Contract errors surface at confirmation as `Reverted`, the way a
//!   mined-but-failed transaction does.
//! - Every call is journaled, so tests can assert exactly which calls an
//!   operation made.
//! - Faults can be queued per call: refuse at submission, revert at
//!   confirmation, or act unreachable.
//!
//! The devnet node serves one of these over JSON-RPC.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::oneshot;

use edu_vault_protocol::address::Address;
use edu_vault_protocol::amount::Wei;
use edu_vault_protocol::ledger::{
    LedgerCallFailed, LedgerClient, LedgerOp, LedgerResult, PendingTx, RecipientEntry,
    RecipientId, TxReceipt, VaultId,
};

use crate::vault_registry::{ContractError, VaultRegistry};

/// An injected failure for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Refused before execution (`Rejected`). Nothing is applied.
    Reject,
    /// Accepted, then reverted at confirmation (`Reverted`). Nothing is
    /// applied.
    Revert,
    /// The ledger could not be reached (`Transport`).
    Unreachable,
}

struct Shared {
    registry: Mutex<VaultRegistry>,
    journal: Mutex<Vec<LedgerOp>>,
    faults: Mutex<HashMap<LedgerOp, VecDeque<Fault>>>,
    block_height: AtomicU64,
    nonce: AtomicU64,
    confirmation_delay: Duration,
    read_delay: Duration,
    journaling: bool,
}

/// In-process ledger. Cloning shares the same state.
#[derive(Clone)]
pub struct LocalLedger {
    shared: Arc<Shared>,
}

impl LocalLedger {
    /// An empty ledger that confirms immediately.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts configuring a ledger.
    pub fn builder() -> LocalLedgerBuilder {
        LocalLedgerBuilder::default()
    }

    /// Runs `f` against the registry. Bypasses the journal and faults; meant
    /// for seeding state and for inspecting it.
    pub fn with_registry<R>(&self, f: impl FnOnce(&mut VaultRegistry) -> R) -> R {
        f(&mut *self.shared.registry.lock())
    }

    /// Number of vaults on the ledger.
    pub fn vault_count(&self) -> usize {
        self.shared.registry.lock().vault_count()
    }

    /// Height of the last block that committed a transaction.
    pub fn block_height(&self) -> u64 {
        self.shared.block_height.load(Ordering::SeqCst)
    }

    /// Queues `fault` for the next call of `op`. Multiple faults for the
    /// same op are consumed in order.
    pub fn inject(&self, op: LedgerOp, fault: Fault) {
        self.shared.faults.lock().entry(op).or_default().push_back(fault);
    }

    /// Every call made so far, in order.
    pub fn journal(&self) -> Vec<LedgerOp> {
        self.shared.journal.lock().clone()
    }

    /// How many times `op` was called.
    pub fn calls(&self, op: LedgerOp) -> usize {
        self.shared.journal.lock().iter().filter(|o| **o == op).count()
    }

    /// The mutating calls made so far, in order.
    pub fn mutations(&self) -> Vec<LedgerOp> {
        self.shared
            .journal
            .lock()
            .iter()
            .copied()
            .filter(|op| op.is_mutating())
            .collect()
    }

    /// Forgets the journal.
    pub fn clear_journal(&self) {
        self.shared.journal.lock().clear();
    }

    fn enter(&self, op: LedgerOp) -> Option<Fault> {
        if self.shared.journaling {
            self.shared.journal.lock().push(op);
        }
        let mut faults = self.shared.faults.lock();
        let fault = faults.get_mut(&op).and_then(VecDeque::pop_front);
        if fault.is_some() {
            tracing::debug!(%op, ?fault, "injected fault");
        }
        fault
    }

    async fn read<T>(
        &self,
        op: LedgerOp,
        f: impl FnOnce(&VaultRegistry) -> Result<T, ContractError>,
    ) -> LedgerResult<T> {
        let fault = self.enter(op);
        if !self.shared.read_delay.is_zero() {
            tokio::time::sleep(self.shared.read_delay).await;
        }
        match fault {
            Some(Fault::Unreachable) => {
                return Err(LedgerCallFailed::transport(op, "ledger unreachable"))
            }
            Some(Fault::Reject) | Some(Fault::Revert) => {
                return Err(LedgerCallFailed::reverted(op, "injected failure"))
            }
            None => {}
        }
        let registry = self.shared.registry.lock();
        f(&*registry).map_err(|e| LedgerCallFailed::reverted(op, e.to_string()))
    }

    fn submit<F>(&self, op: LedgerOp, from: &Address, apply: F) -> LedgerResult<PendingTx>
    where
        F: FnOnce(&mut VaultRegistry) -> Result<(), ContractError> + Send + 'static,
    {
        let revert = match self.enter(op) {
            Some(Fault::Reject) => {
                return Err(LedgerCallFailed::rejected(op, "transaction rejected"))
            }
            Some(Fault::Unreachable) => {
                return Err(LedgerCallFailed::transport(op, "ledger unreachable"))
            }
            Some(Fault::Revert) => true,
            None => false,
        };

        let tx_hash = self.next_tx_hash(op, from);
        tracing::debug!(%op, %tx_hash, from = %from, "transaction submitted");

        let (done, confirmation) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        let hash = tx_hash.clone();
        tokio::spawn(async move {
            if !shared.confirmation_delay.is_zero() {
                tokio::time::sleep(shared.confirmation_delay).await;
            }
            let outcome = shared.execute(op, hash, revert, apply);
            // The submitter may have dropped its handle.
            let _ = done.send(outcome);
        });

        Ok(PendingTx::new(op, tx_hash, async move {
            confirmation
                .await
                .unwrap_or_else(|_| Err(LedgerCallFailed::transport(op, "ledger dropped the transaction")))
        }))
    }

    fn next_tx_hash(&self, op: LedgerOp, from: &Address) -> String {
        let nonce = self.shared.nonce.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(op.name().as_bytes());
        hasher.update(from.as_bytes());
        hasher.update(nonce.to_be_bytes());
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

impl Shared {
    fn execute<F>(&self, op: LedgerOp, tx_hash: String, revert: bool, apply: F) -> LedgerResult<TxReceipt>
    where
        F: FnOnce(&mut VaultRegistry) -> Result<(), ContractError>,
    {
        if revert {
            tracing::debug!(%op, %tx_hash, "transaction reverted (injected)");
            return Err(LedgerCallFailed::reverted(op, "execution reverted"));
        }
        let mut registry = self.registry.lock();
        if let Err(e) = apply(&mut *registry) {
            tracing::debug!(%op, %tx_hash, error = %e, "transaction reverted");
            return Err(LedgerCallFailed::reverted(op, e.to_string()));
        }
        let block_number = self.block_height.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(%op, %tx_hash, block_number, "transaction committed");
        Ok(TxReceipt {
            op,
            tx_hash,
            block_number,
        })
    }
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for a [`LocalLedger`].
#[derive(Debug, Default)]
pub struct LocalLedgerBuilder {
    registry: Option<VaultRegistry>,
    confirmation_delay: Duration,
    read_delay: Duration,
    skip_journal: bool,
}

impl LocalLedgerBuilder {
    /// Starts from an existing registry instead of an empty one.
    pub fn registry(mut self, registry: VaultRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Time between submission and commit of every transaction.
    pub fn confirmation_delay(mut self, delay: Duration) -> Self {
        self.confirmation_delay = delay;
        self
    }

    /// Latency added to every read call.
    pub fn read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Stops recording calls. For long-running ledgers such as the devnet
    /// node, where nobody reads the journal.
    pub fn without_journal(mut self) -> Self {
        self.skip_journal = true;
        self
    }

    pub fn build(self) -> LocalLedger {
        LocalLedger {
            shared: Arc::new(Shared {
                registry: Mutex::new(self.registry.unwrap_or_default()),
                journal: Mutex::new(Vec::new()),
                faults: Mutex::new(HashMap::new()),
                block_height: AtomicU64::new(0),
                nonce: AtomicU64::new(0),
                confirmation_delay: self.confirmation_delay,
                read_delay: self.read_delay,
                journaling: !self.skip_journal,
            }),
        }
    }
}

#[async_trait]
impl LedgerClient for LocalLedger {
    async fn list_depositor_vaults(&self, depositor: &Address) -> LedgerResult<Vec<VaultId>> {
        self.read(LedgerOp::ListDepositorVaults, |r| Ok(r.depositor_vaults(depositor)))
            .await
    }

    async fn list_recipient_vaults(&self, recipient: &Address) -> LedgerResult<Vec<VaultId>> {
        self.read(LedgerOp::ListRecipientVaults, |r| Ok(r.recipient_vaults(recipient)))
            .await
    }

    async fn vault_name(&self, vault: VaultId) -> LedgerResult<String> {
        self.read(LedgerOp::GetVaultName, |r| r.vault_name(vault)).await
    }

    async fn total_deposit(&self, vault: VaultId) -> LedgerResult<Wei> {
        self.read(LedgerOp::GetTotalDeposit, |r| r.total_deposit(vault)).await
    }

    async fn total_allocated(&self, vault: VaultId) -> LedgerResult<Wei> {
        self.read(LedgerOp::GetTotalAllocated, |r| r.total_allocated(vault)).await
    }

    async fn recipient_id(&self, vault: VaultId, address: &Address) -> LedgerResult<RecipientId> {
        self.read(LedgerOp::GetRecipientId, |r| r.recipient_id(vault, address))
            .await
    }

    async fn recipient_balance(&self, vault: VaultId, recipient: RecipientId) -> LedgerResult<Wei> {
        self.read(LedgerOp::GetRecipientBalance, |r| {
            r.recipient_balance(vault, recipient)
        })
        .await
    }

    async fn list_recipients(&self, vault: VaultId) -> LedgerResult<Vec<RecipientEntry>> {
        self.read(LedgerOp::ListRecipients, |r| r.list_recipients(vault)).await
    }

    async fn native_balance(&self, address: &Address) -> LedgerResult<Wei> {
        self.read(LedgerOp::GetNativeBalance, |r| Ok(r.native_balance(address)))
            .await
    }

    async fn create_vault(&self, from: &Address, name: &str) -> LedgerResult<PendingTx> {
        let (caller, name) = (from.clone(), name.to_string());
        self.submit(LedgerOp::CreateVault, from, move |r| {
            r.create_vault(&caller, &name).map(|_| ())
        })
    }

    async fn deposit(&self, from: &Address, vault: VaultId, amount: Wei) -> LedgerResult<PendingTx> {
        let caller = from.clone();
        self.submit(LedgerOp::Deposit, from, move |r| {
            r.deposit(&caller, vault, amount)
        })
    }

    async fn depositor_withdraw(
        &self,
        from: &Address,
        vault: VaultId,
        amount: Wei,
    ) -> LedgerResult<PendingTx> {
        let caller = from.clone();
        self.submit(LedgerOp::DepositorWithdraw, from, move |r| {
            r.depositor_withdraw(&caller, vault, amount)
        })
    }

    async fn register_recipient(
        &self,
        from: &Address,
        vault: VaultId,
        recipient: &Address,
    ) -> LedgerResult<PendingTx> {
        let (caller, recipient) = (from.clone(), recipient.clone());
        self.submit(LedgerOp::RegisterRecipient, from, move |r| {
            r.register_recipient(&caller, vault, &recipient).map(|_| ())
        })
    }

    async fn allocate(
        &self,
        from: &Address,
        vault: VaultId,
        amount: Wei,
        recipient: RecipientId,
    ) -> LedgerResult<PendingTx> {
        let caller = from.clone();
        self.submit(LedgerOp::Allocate, from, move |r| {
            r.allocate(&caller, vault, amount, recipient)
        })
    }

    async fn recipient_withdraw(
        &self,
        from: &Address,
        vault: VaultId,
        amount: Wei,
        recipient: RecipientId,
    ) -> LedgerResult<PendingTx> {
        let caller = from.clone();
        self.submit(LedgerOp::RecipientWithdraw, from, move |r| {
            r.recipient_withdraw(&caller, vault, amount, recipient)
        })
    }
}
