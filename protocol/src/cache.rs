//! # Vault Cache
//!
//! An invalidate-and-refetch projection of the ledger for one connected
//! wallet. The ledger is the source of truth; the cache only remembers what
//! the last successful refresh saw so that validation (e.g. "is this
//! withdrawal larger than the deposit?") can answer without a round trip.
//!
//! ## Refresh semantics
//!
//! A refresh is all-or-nothing. Every per-vault read is issued together, and
//! the new [`VaultSet`] replaces the old one in a single swap only after all
//! of them succeeded. If any read fails, the previous set stays exactly as it
//! was. There is no partial or merged update.
//!
//! [`VaultCache::invalidate`] clears the cache and bumps a generation
//! counter; a refresh that was already in flight when that happened does not
//! install its result. Two overlapping refreshes within one generation are
//! last-writer-wins.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::amount::Wei;
use crate::error::{VaultError, VaultResult};
use crate::ledger::{LedgerClient, RecipientId, VaultId};

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Which side of a vault the connected wallet is looking from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Funds vaults, allocates to recipients.
    Depositor,
    /// Claims what was allocated to it.
    Recipient,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Depositor => write!(f, "depositor"),
            Role::Recipient => write!(f, "recipient"),
        }
    }
}

/// One vault as observed by the last refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    /// Ledger id.
    pub id: VaultId,
    /// Name given at creation.
    pub name: String,
    /// Total deposited.
    pub total_deposited: Wei,
    /// Total allocated to recipients.
    pub total_allocated: Wei,
    /// The connected wallet's recipient id. Recipient view only.
    pub recipient_id: Option<RecipientId>,
    /// What the connected wallet may withdraw. Recipient view only.
    pub caller_claimable: Option<Wei>,
}

impl VaultSnapshot {
    /// Deposited funds not yet allocated to anyone.
    pub fn unallocated(&self) -> Wei {
        self.total_deposited.saturating_sub(self.total_allocated)
    }
}

/// The visible vault set, tagged by the role it was loaded for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "vaults", rename_all = "snake_case")]
pub enum VaultSet {
    /// Vaults the wallet deposits into.
    Depositor(Vec<VaultSnapshot>),
    /// Vaults the wallet can claim from.
    Recipient(Vec<VaultSnapshot>),
}

impl VaultSet {
    fn new(role: Role, vaults: Vec<VaultSnapshot>) -> Self {
        match role {
            Role::Depositor => VaultSet::Depositor(vaults),
            Role::Recipient => VaultSet::Recipient(vaults),
        }
    }

    /// The role this set was loaded for.
    pub fn role(&self) -> Role {
        match self {
            VaultSet::Depositor(_) => Role::Depositor,
            VaultSet::Recipient(_) => Role::Recipient,
        }
    }

    /// Snapshots in ledger list order.
    pub fn vaults(&self) -> &[VaultSnapshot] {
        match self {
            VaultSet::Depositor(v) | VaultSet::Recipient(v) => v,
        }
    }

    /// Looks up one vault.
    pub fn get(&self, id: VaultId) -> Option<&VaultSnapshot> {
        self.vaults().iter().find(|v| v.id == id)
    }

    /// Ids in ledger list order.
    pub fn ids(&self) -> Vec<VaultId> {
        self.vaults().iter().map(|v| v.id).collect()
    }

    /// Number of vaults.
    pub fn len(&self) -> usize {
        self.vaults().len()
    }

    /// `true` if nothing is visible.
    pub fn is_empty(&self) -> bool {
        self.vaults().is_empty()
    }
}

// ---------------------------------------------------------------------------
// VaultCache
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CachedView {
    owner: Address,
    set: VaultSet,
    refreshed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheState {
    generation: u64,
    view: Option<CachedView>,
}

/// Last-known vault snapshots for one wallet session.
pub struct VaultCache<L: ?Sized> {
    ledger: Arc<L>,
    state: RwLock<CacheState>,
}

impl<L: LedgerClient + ?Sized> VaultCache<L> {
    /// An empty cache reading through `ledger`.
    pub fn new(ledger: Arc<L>) -> Self {
        Self {
            ledger,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Re-fetches every vault visible to `address` under `role` and replaces
    /// the cached set with the result.
    ///
    /// On failure the previous set is left untouched.
    pub async fn refresh_all(&self, role: Role, address: &Address) -> VaultResult<VaultSet> {
        let generation = self.state.read().generation;

        let ids = match role {
            Role::Depositor => self.ledger.list_depositor_vaults(address).await?,
            Role::Recipient => self.ledger.list_recipient_vaults(address).await?,
        };

        let fetches = ids.iter().map(|&id| self.fetch_vault(role, id, address));
        let vaults = try_join_all(fetches).await.map_err(|e| {
            tracing::warn!(%role, error = %e, "vault refresh failed; keeping previous snapshot");
            e
        })?;
        let set = VaultSet::new(role, vaults);

        let mut state = self.state.write();
        if state.generation != generation {
            tracing::debug!(%role, "cache invalidated during refresh; discarding result");
            return Err(VaultError::StateInconsistent(
                "wallet session changed while vaults were loading".to_string(),
            ));
        }
        state.view = Some(CachedView {
            owner: address.clone(),
            set: set.clone(),
            refreshed_at: Utc::now(),
        });
        tracing::debug!(%role, vaults = set.len(), "vault cache refreshed");

        Ok(set)
    }

    async fn fetch_vault(
        &self,
        role: Role,
        id: VaultId,
        address: &Address,
    ) -> VaultResult<VaultSnapshot> {
        let ledger = &*self.ledger;
        match role {
            Role::Depositor => {
                let (name, total_deposited, total_allocated) = futures::try_join!(
                    ledger.vault_name(id),
                    ledger.total_deposit(id),
                    ledger.total_allocated(id),
                )?;
                Ok(VaultSnapshot {
                    id,
                    name,
                    total_deposited,
                    total_allocated,
                    recipient_id: None,
                    caller_claimable: None,
                })
            }
            Role::Recipient => {
                let claim = async {
                    let recipient = ledger.recipient_id(id, address).await?;
                    let balance = ledger.recipient_balance(id, recipient).await?;
                    Ok((recipient, balance))
                };
                let (name, total_deposited, total_allocated, (recipient, claimable)) = futures::try_join!(
                    ledger.vault_name(id),
                    ledger.total_deposit(id),
                    ledger.total_allocated(id),
                    claim,
                )?;
                Ok(VaultSnapshot {
                    id,
                    name,
                    total_deposited,
                    total_allocated,
                    recipient_id: Some(recipient),
                    caller_claimable: Some(claimable),
                })
            }
        }
    }

    /// The last snapshot of `id`, or `None` if it is not in the cached set.
    pub fn get(&self, id: VaultId) -> Option<VaultSnapshot> {
        self.state
            .read()
            .view
            .as_ref()
            .and_then(|v| v.set.get(id).cloned())
    }

    /// The whole cached set.
    pub fn view(&self) -> Option<VaultSet> {
        self.state.read().view.as_ref().map(|v| v.set.clone())
    }

    /// Ids in the cached set, in ledger order. Empty if nothing is cached.
    pub fn vault_ids(&self) -> Vec<VaultId> {
        self.state
            .read()
            .view
            .as_ref()
            .map(|v| v.set.ids())
            .unwrap_or_default()
    }

    /// Role the cached set was loaded for.
    pub fn role(&self) -> Option<Role> {
        self.state.read().view.as_ref().map(|v| v.set.role())
    }

    /// Address the cached set was loaded for.
    pub fn owner(&self) -> Option<Address> {
        self.state.read().view.as_ref().map(|v| v.owner.clone())
    }

    /// When the cached set was installed.
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().view.as_ref().map(|v| v.refreshed_at)
    }

    /// `true` if nothing has been cached (or it was invalidated).
    pub fn is_empty(&self) -> bool {
        self.state.read().view.is_none()
    }

    /// Clears the cache. In-flight refreshes will not install their result.
    pub fn invalidate(&self) {
        let mut state = self.state.write();
        state.generation += 1;
        state.view = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerCallFailed, LedgerOp, LedgerResult, PendingTx, RecipientEntry};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    #[derive(Clone)]
    struct StubVault {
        name: &'static str,
        deposit: u128,
        allocated: u128,
        claimable: u128,
    }

    /// Read-only ledger with switchable failures.
    #[derive(Default)]
    struct StubLedger {
        vaults: Mutex<BTreeMap<u64, StubVault>>,
        fail_names: Mutex<bool>,
    }

    impl StubLedger {
        fn with(vaults: &[(u64, StubVault)]) -> Arc<Self> {
            let ledger = StubLedger::default();
            ledger.vaults.lock().extend(vaults.iter().cloned());
            Arc::new(ledger)
        }

        fn vault(&self, id: VaultId, op: LedgerOp) -> LedgerResult<StubVault> {
            self.vaults
                .lock()
                .get(&id.0)
                .cloned()
                .ok_or_else(|| LedgerCallFailed::reverted(op, "no such vault"))
        }
    }

    #[async_trait]
    impl LedgerClient for StubLedger {
        async fn list_depositor_vaults(&self, _: &Address) -> LedgerResult<Vec<VaultId>> {
            Ok(self.vaults.lock().keys().map(|&k| VaultId(k)).collect())
        }
        async fn list_recipient_vaults(&self, _: &Address) -> LedgerResult<Vec<VaultId>> {
            Ok(self
                .vaults
                .lock()
                .iter()
                .filter(|(_, v)| v.claimable > 0)
                .map(|(&k, _)| VaultId(k))
                .collect())
        }
        async fn vault_name(&self, vault: VaultId) -> LedgerResult<String> {
            if *self.fail_names.lock() {
                return Err(LedgerCallFailed::transport(LedgerOp::GetVaultName, "down"));
            }
            Ok(self.vault(vault, LedgerOp::GetVaultName)?.name.to_string())
        }
        async fn total_deposit(&self, vault: VaultId) -> LedgerResult<Wei> {
            Ok(Wei::new(self.vault(vault, LedgerOp::GetTotalDeposit)?.deposit))
        }
        async fn total_allocated(&self, vault: VaultId) -> LedgerResult<Wei> {
            Ok(Wei::new(self.vault(vault, LedgerOp::GetTotalAllocated)?.allocated))
        }
        async fn recipient_id(&self, _: VaultId, _: &Address) -> LedgerResult<RecipientId> {
            Ok(RecipientId(1))
        }
        async fn recipient_balance(&self, vault: VaultId, _: RecipientId) -> LedgerResult<Wei> {
            Ok(Wei::new(self.vault(vault, LedgerOp::GetRecipientBalance)?.claimable))
        }
        async fn list_recipients(&self, _: VaultId) -> LedgerResult<Vec<RecipientEntry>> {
            Ok(Vec::new())
        }
        async fn native_balance(&self, _: &Address) -> LedgerResult<Wei> {
            Ok(Wei::ZERO)
        }
        async fn create_vault(&self, _: &Address, _: &str) -> LedgerResult<PendingTx> {
            Err(LedgerCallFailed::rejected(LedgerOp::CreateVault, "read-only"))
        }
        async fn deposit(&self, _: &Address, _: VaultId, _: Wei) -> LedgerResult<PendingTx> {
            Err(LedgerCallFailed::rejected(LedgerOp::Deposit, "read-only"))
        }
        async fn depositor_withdraw(
            &self,
            _: &Address,
            _: VaultId,
            _: Wei,
        ) -> LedgerResult<PendingTx> {
            Err(LedgerCallFailed::rejected(LedgerOp::DepositorWithdraw, "read-only"))
        }
        async fn register_recipient(
            &self,
            _: &Address,
            _: VaultId,
            _: &Address,
        ) -> LedgerResult<PendingTx> {
            Err(LedgerCallFailed::rejected(LedgerOp::RegisterRecipient, "read-only"))
        }
        async fn allocate(
            &self,
            _: &Address,
            _: VaultId,
            _: Wei,
            _: RecipientId,
        ) -> LedgerResult<PendingTx> {
            Err(LedgerCallFailed::rejected(LedgerOp::Allocate, "read-only"))
        }
        async fn recipient_withdraw(
            &self,
            _: &Address,
            _: VaultId,
            _: Wei,
            _: RecipientId,
        ) -> LedgerResult<PendingTx> {
            Err(LedgerCallFailed::rejected(LedgerOp::RecipientWithdraw, "read-only"))
        }
    }

    fn owner() -> Address {
        Address::parse("0x00000000000000000000000000000000000000e1").unwrap()
    }

    fn stub(name: &'static str, deposit: u128, allocated: u128, claimable: u128) -> StubVault {
        StubVault {
            name,
            deposit,
            allocated,
            claimable,
        }
    }

    #[tokio::test]
    async fn refresh_replaces_the_whole_set() {
        let ledger = StubLedger::with(&[(1, stub("a", 10, 0, 0)), (2, stub("b", 20, 5, 0))]);
        let cache = VaultCache::new(Arc::clone(&ledger));

        cache.refresh_all(Role::Depositor, &owner()).await.unwrap();
        assert_eq!(cache.vault_ids(), vec![VaultId(1), VaultId(2)]);
        assert_eq!(cache.get(VaultId(2)).unwrap().unallocated(), Wei::new(15));

        ledger.vaults.lock().remove(&1);
        cache.refresh_all(Role::Depositor, &owner()).await.unwrap();
        assert!(cache.get(VaultId(1)).is_none());
        assert_eq!(cache.vault_ids(), vec![VaultId(2)]);
    }

    #[tokio::test]
    async fn refresh_is_idempotent_without_mutation() {
        let ledger = StubLedger::with(&[(4, stub("a", 10, 3, 0))]);
        let cache = VaultCache::new(ledger);

        let first = cache.refresh_all(Role::Depositor, &owner()).await.unwrap();
        let second = cache.refresh_all(Role::Depositor, &owner()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.view(), Some(second));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_set() {
        let ledger = StubLedger::with(&[(1, stub("a", 10, 0, 0))]);
        let cache = VaultCache::new(Arc::clone(&ledger));
        cache.refresh_all(Role::Depositor, &owner()).await.unwrap();

        ledger.vaults.lock().insert(2, stub("b", 99, 0, 0));
        *ledger.fail_names.lock() = true;

        let err = cache.refresh_all(Role::Depositor, &owner()).await.unwrap_err();
        assert_eq!(err.failed_op(), Some(LedgerOp::GetVaultName));
        assert_eq!(cache.vault_ids(), vec![VaultId(1)]);
        assert!(cache.get(VaultId(2)).is_none());
    }

    #[tokio::test]
    async fn recipient_view_carries_claimable_and_filters_zero() {
        let ledger = StubLedger::with(&[(1, stub("a", 10, 4, 4)), (2, stub("b", 10, 0, 0))]);
        let cache = VaultCache::new(ledger);

        let set = cache.refresh_all(Role::Recipient, &owner()).await.unwrap();
        assert_eq!(set.role(), Role::Recipient);
        assert_eq!(set.ids(), vec![VaultId(1)]);
        let snap = cache.get(VaultId(1)).unwrap();
        assert_eq!(snap.caller_claimable, Some(Wei::new(4)));
        assert_eq!(snap.recipient_id, Some(RecipientId(1)));
    }

    #[tokio::test]
    async fn invalidate_clears_everything() {
        let ledger = StubLedger::with(&[(1, stub("a", 10, 0, 0))]);
        let cache = VaultCache::new(ledger);
        cache.refresh_all(Role::Depositor, &owner()).await.unwrap();
        assert_eq!(cache.owner(), Some(owner()));
        assert!(cache.refreshed_at().is_some());

        cache.invalidate();
        assert!(cache.is_empty());
        assert!(cache.get(VaultId(1)).is_none());
        assert!(cache.owner().is_none());
    }

    #[test]
    fn vault_set_serializes_with_role_tag() {
        let set = VaultSet::Recipient(Vec::new());
        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(value["role"], "recipient");
        assert!(value["vaults"].as_array().unwrap().is_empty());
    }
}
