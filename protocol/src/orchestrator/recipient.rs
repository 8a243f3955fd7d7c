//! Recipient-side operations: refresh and claim.

use serde::Serialize;

use super::VaultOrchestrator;
use crate::amount::Wei;
use crate::cache::{Role, VaultSet};
use crate::error::VaultResult;
use crate::ledger::{LedgerClient, TxReceipt, VaultId};
use crate::operation::OperationKind;

/// Result of a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimOutcome {
    /// The full cached claimable balance was withdrawn.
    Claimed {
        receipt: TxReceipt,
        amount: Wei,
        /// Recipient view after the refresh. A fully claimed vault is gone
        /// from it.
        remaining: VaultSet,
    },
    /// The vault is not in the recipient view, or nothing is claimable.
    /// No ledger call was made.
    NothingToClaim,
}

/// Operations available to a recipient.
pub struct RecipientDesk<L: ?Sized> {
    orchestrator: VaultOrchestrator<L>,
}

impl<L: LedgerClient + ?Sized> RecipientDesk<L> {
    pub(super) fn new(orchestrator: VaultOrchestrator<L>) -> Self {
        Self { orchestrator }
    }

    /// Loads every vault where the connected wallet has something to claim.
    pub async fn refresh(&self) -> VaultResult<VaultSet> {
        let address = self.orchestrator.connected_address()?;
        self.orchestrator.refresh(Role::Recipient, &address).await
    }

    /// Withdraws the whole cached claimable balance of `vault`.
    pub async fn claim(&self, vault: VaultId) -> VaultResult<ClaimOutcome> {
        let orchestrator = &self.orchestrator;
        let from = orchestrator.connected_address()?;
        let amount = match orchestrator
            .cached(Role::Recipient, vault)
            .and_then(|v| v.caller_claimable)
        {
            Some(amount) if !amount.is_zero() => amount,
            _ => {
                tracing::debug!(%vault, "nothing to claim");
                return Ok(ClaimOutcome::NothingToClaim);
            }
        };

        orchestrator
            .track(OperationKind::Claim, async {
                let ledger = orchestrator.ledger();
                let recipient_id = ledger.recipient_id(vault, &from).await?;
                let pending = ledger
                    .recipient_withdraw(&from, vault, amount, recipient_id)
                    .await?;
                let receipt = orchestrator.confirm(pending).await?;
                tracing::info!(%vault, %recipient_id, %amount, "claim committed");

                let remaining = orchestrator
                    .refresh_after(Role::Recipient, &from, &receipt)
                    .await?;
                Ok(ClaimOutcome::Claimed {
                    receipt,
                    amount,
                    remaining,
                })
            })
            .await
    }
}
