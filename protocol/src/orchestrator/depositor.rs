//! Depositor-side operations: create, deposit, withdraw, allocate.
//!
//! Each mutating operation validates locally, issues exactly one mutating
//! call, waits for it to commit and then refreshes the depositor view once.
//! A failed operation never touches the cache.

use serde::Serialize;

use super::{positive_amount, AllocationFlow, VaultOrchestrator};
use crate::address::Address;
use crate::cache::{Role, VaultSet, VaultSnapshot};
use crate::error::{VaultError, VaultResult};
use crate::ledger::{LedgerClient, TxReceipt, VaultId};
use crate::operation::OperationKind;

/// A committed deposit or withdrawal, with the vault as seen afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultMutation {
    pub receipt: TxReceipt,
    pub vault: VaultSnapshot,
}

/// A committed vault creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedVaults {
    pub receipt: TxReceipt,
    /// Vaults present after the refresh that were not cached before it.
    /// Normally exactly one.
    pub created: Vec<VaultSnapshot>,
}

/// Operations available to a depositor.
pub struct DepositorDesk<L: ?Sized> {
    orchestrator: VaultOrchestrator<L>,
}

impl<L: LedgerClient + ?Sized> DepositorDesk<L> {
    pub(super) fn new(orchestrator: VaultOrchestrator<L>) -> Self {
        Self { orchestrator }
    }

    /// Loads every vault the connected wallet deposits into.
    pub async fn refresh(&self) -> VaultResult<VaultSet> {
        let address = self.orchestrator.connected_address()?;
        self.orchestrator.refresh(Role::Depositor, &address).await
    }

    /// Creates a vault named `name`.
    ///
    /// The name is trimmed and must not be empty. Duplicate names are allowed.
    pub async fn create(&self, name: &str) -> VaultResult<CreatedVaults> {
        let orchestrator = &self.orchestrator;
        orchestrator
            .track(OperationKind::Create, async {
                let from = orchestrator.connected_address()?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(VaultError::Validation(
                        "vault name must not be empty".to_string(),
                    ));
                }

                let known = match orchestrator.vaults() {
                    Some(set) if set.role() == Role::Depositor => set.ids(),
                    _ => Vec::new(),
                };

                let pending = orchestrator.ledger().create_vault(&from, name).await?;
                let receipt = orchestrator.confirm(pending).await?;
                let set = orchestrator
                    .refresh_after(Role::Depositor, &from, &receipt)
                    .await?;

                let created: Vec<VaultSnapshot> = set
                    .vaults()
                    .iter()
                    .filter(|v| !known.contains(&v.id))
                    .cloned()
                    .collect();
                tracing::info!(name, created = created.len(), "vault created");
                Ok(CreatedVaults { receipt, created })
            })
            .await
    }

    /// Deposits `amount` whole units into `vault`.
    pub async fn deposit(&self, vault: VaultId, amount: &str) -> VaultResult<VaultMutation> {
        let orchestrator = &self.orchestrator;
        orchestrator
            .track(OperationKind::Deposit, async {
                let from = orchestrator.connected_address()?;
                let amount = positive_amount(amount)?;

                let pending = orchestrator.ledger().deposit(&from, vault, amount).await?;
                let receipt = orchestrator.confirm(pending).await?;
                let vault = self.refreshed(&from, vault, &receipt).await?;
                tracing::info!(vault = %vault.id, %amount, total = %vault.total_deposited, "deposit committed");
                Ok(VaultMutation { receipt, vault })
            })
            .await
    }

    /// Withdraws `amount` whole units from `vault` back to the depositor.
    ///
    /// The amount must not exceed the cached total deposit. The vault has to
    /// be in the cached depositor view for that check to be possible.
    pub async fn withdraw(&self, vault: VaultId, amount: &str) -> VaultResult<VaultMutation> {
        let orchestrator = &self.orchestrator;
        orchestrator
            .track(OperationKind::Withdraw, async {
                let from = orchestrator.connected_address()?;
                let amount = positive_amount(amount)?;
                let cached = orchestrator
                    .cached(Role::Depositor, vault)
                    .ok_or_else(|| VaultError::vault_missing(vault))?;
                if amount > cached.total_deposited {
                    return Err(VaultError::InsufficientFunds {
                        requested: amount,
                        available: cached.total_deposited,
                    });
                }

                let pending = orchestrator
                    .ledger()
                    .depositor_withdraw(&from, vault, amount)
                    .await?;
                let receipt = orchestrator.confirm(pending).await?;
                let vault = self.refreshed(&from, vault, &receipt).await?;
                tracing::info!(vault = %vault.id, %amount, total = %vault.total_deposited, "withdrawal committed");
                Ok(VaultMutation { receipt, vault })
            })
            .await
    }

    /// Prepares an allocation of `amount` whole units of `vault` to the
    /// recipient at `recipient`. Nothing is sent until the flow is started.
    pub fn allocate(&self, vault: VaultId, recipient: &str, amount: &str) -> AllocationFlow<L> {
        AllocationFlow::new(self.orchestrator.clone(), vault, recipient, amount)
    }

    /// Refreshes after `receipt` and returns the target vault, which must
    /// still be visible.
    async fn refreshed(
        &self,
        from: &Address,
        vault: VaultId,
        receipt: &TxReceipt,
    ) -> VaultResult<VaultSnapshot> {
        let set = self
            .orchestrator
            .refresh_after(Role::Depositor, from, receipt)
            .await?;
        set.get(vault)
            .cloned()
            .ok_or_else(|| VaultError::vault_missing(vault))
    }
}
