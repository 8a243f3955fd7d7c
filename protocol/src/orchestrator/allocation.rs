//! # Two-Phase Allocation
//!
//! Allocating to an address that is not yet a recipient of the vault takes
//! two chained transactions: register, then allocate. The flow stops between
//! the check and the first transaction so the user can agree to that.
//!
//! ```text
//!  CheckingRegistration ──registered──────────────────────┐
//!          │                                               ▼
//!          └─not registered─▶ NeedsConfirmation ─confirm─▶ Registering ─▶ Allocating
//!                                   │                                          │
//!                                 cancel                                       ▼
//!                                   ▼                                     Refreshing ─▶ Done
//!                               Cancelled
//! ```
//!
//! `Failed` is reachable from every non-terminal state. A failure after the
//! registration committed says so; nothing is rolled back.

use serde::Serialize;
use thiserror::Error;

use super::{positive_amount, VaultOrchestrator};
use crate::address::Address;
use crate::amount::Wei;
use crate::cache::{Role, VaultSnapshot};
use crate::error::VaultError;
use crate::ledger::{LedgerClient, RecipientId, TxReceipt, VaultId};
use crate::operation::OperationKind;

/// The sub-step an allocation was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStep {
    /// Input or flow-usage checks, before any ledger call.
    Validate,
    /// Reading the vault's recipient list.
    CheckRegistration,
    /// Submitting or confirming the registration.
    Register,
    /// Reading the recipient id.
    LookupRecipient,
    /// Submitting or confirming the allocation.
    Allocate,
    /// Refreshing the depositor view.
    Refresh,
}

impl std::fmt::Display for AllocationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AllocationStep::Validate => "validate",
            AllocationStep::CheckRegistration => "check registration",
            AllocationStep::Register => "register recipient",
            AllocationStep::LookupRecipient => "look up recipient id",
            AllocationStep::Allocate => "allocate",
            AllocationStep::Refresh => "refresh",
        };
        f.write_str(s)
    }
}

/// Why an allocation stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("allocation failed at {step} (registration committed: {registration_committed}): {error}")]
pub struct AllocationFailure {
    /// Where it broke.
    pub step: AllocationStep,
    /// `true` if the recipient registration was committed by this flow.
    pub registration_committed: bool,
    /// The underlying error.
    pub error: VaultError,
}

/// A completed allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationReceipt {
    /// Present when this flow registered the recipient.
    pub registration: Option<TxReceipt>,
    pub allocation: TxReceipt,
    pub recipient_id: RecipientId,
    /// The vault after the refresh.
    pub vault: VaultSnapshot,
}

/// Where the flow is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationStage {
    CheckingRegistration,
    /// Suspended. Two transactions are needed; waiting for the user.
    NeedsConfirmation,
    Registering,
    Allocating,
    Refreshing,
    Done(AllocationReceipt),
    Cancelled,
    Failed(AllocationFailure),
}

impl AllocationStage {
    /// `Done`, `Cancelled` and `Failed` never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AllocationStage::Done(_) | AllocationStage::Cancelled | AllocationStage::Failed(_)
        )
    }
}

/// What [`AllocationFlow::start`] stopped at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationProgress {
    /// The recipient is not registered. Call [`AllocationFlow::confirm`] or
    /// [`AllocationFlow::cancel`].
    NeedsConfirmation,
    /// The recipient was already registered and the allocation committed.
    Done(AllocationReceipt),
}

/// One allocation request, driven step by step.
pub struct AllocationFlow<L: ?Sized> {
    orchestrator: VaultOrchestrator<L>,
    vault: VaultId,
    recipient_input: String,
    amount_input: String,
    validated: Option<Validated>,
    registration: Option<TxReceipt>,
    needs_registration: bool,
    started: bool,
    stage: AllocationStage,
}

#[derive(Debug, Clone)]
struct Validated {
    from: Address,
    recipient: Address,
    amount: Wei,
}

type StepResult<T> = Result<T, AllocationFailure>;

impl<L: LedgerClient + ?Sized> AllocationFlow<L> {
    pub(super) fn new(
        orchestrator: VaultOrchestrator<L>,
        vault: VaultId,
        recipient: &str,
        amount: &str,
    ) -> Self {
        Self {
            orchestrator,
            vault,
            recipient_input: recipient.trim().to_string(),
            amount_input: amount.to_string(),
            validated: None,
            registration: None,
            needs_registration: false,
            started: false,
            stage: AllocationStage::CheckingRegistration,
        }
    }

    /// Current stage.
    pub fn stage(&self) -> &AllocationStage {
        &self.stage
    }

    /// Target vault.
    pub fn vault(&self) -> VaultId {
        self.vault
    }

    /// `true` once the flow knows a registration must precede the
    /// allocation.
    pub fn requires_two_transactions(&self) -> bool {
        self.needs_registration
    }

    /// Validates, checks registration, and either suspends at
    /// `NeedsConfirmation` or runs the allocation to the end.
    pub async fn start(&mut self) -> StepResult<AllocationProgress> {
        if self.started {
            return Err(self.misuse("allocation flow was already started"));
        }
        self.started = true;
        let orchestrator = self.orchestrator.clone();
        orchestrator.board().begin(OperationKind::Allocate);

        let outcome = self.check_and_maybe_allocate().await;
        match &outcome {
            Ok(AllocationProgress::NeedsConfirmation) => orchestrator.park(OperationKind::Allocate),
            Ok(AllocationProgress::Done(_)) => {
                orchestrator.board().finish(OperationKind::Allocate, &Ok(()))
            }
            Err(failure) => self.record_failure(failure),
        }
        outcome
    }

    /// Resumes a suspended flow: registers the recipient, then allocates.
    pub async fn confirm(&mut self) -> StepResult<AllocationReceipt> {
        if self.stage != AllocationStage::NeedsConfirmation {
            return Err(self.misuse("allocation is not waiting for confirmation"));
        }
        let validated = match &self.validated {
            Some(v) => v.clone(),
            None => return Err(self.misuse("allocation was not validated")),
        };
        match self.orchestrator.connected_address() {
            Ok(current) if current == validated.from => {}
            _ => {
                return Err(self.misuse("wallet session changed since the allocation was started"))
            }
        }

        let orchestrator = self.orchestrator.clone();
        orchestrator.board().begin(OperationKind::Allocate);
        let outcome = self.register_then_allocate(&validated).await;
        match &outcome {
            Ok(_) => orchestrator.board().finish(OperationKind::Allocate, &Ok(())),
            Err(failure) => self.record_failure(failure),
        }
        outcome
    }

    /// Declines the registration. No ledger call is made.
    pub fn cancel(&mut self) -> StepResult<()> {
        if self.stage != AllocationStage::NeedsConfirmation {
            return Err(self.misuse("allocation is not waiting for confirmation"));
        }
        tracing::info!(vault = %self.vault, "allocation cancelled before registration");
        self.stage = AllocationStage::Cancelled;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    async fn check_and_maybe_allocate(&mut self) -> StepResult<AllocationProgress> {
        let validated = self.validate()?;
        self.validated = Some(validated.clone());

        let entries = self
            .orchestrator
            .ledger()
            .list_recipients(self.vault)
            .await
            .map_err(|e| self.fail(AllocationStep::CheckRegistration, e.into()))?;
        let registered = entries.iter().find(|e| e.address == validated.recipient);

        match registered {
            Some(entry) => {
                tracing::debug!(
                    vault = %self.vault,
                    recipient = %validated.recipient,
                    listed_id = %entry.recipient_id,
                    "recipient already registered"
                );
                let receipt = self.allocate(&validated).await?;
                Ok(AllocationProgress::Done(receipt))
            }
            None => {
                tracing::info!(
                    vault = %self.vault,
                    recipient = %validated.recipient,
                    "recipient not registered; registration and allocation need confirmation"
                );
                self.needs_registration = true;
                self.stage = AllocationStage::NeedsConfirmation;
                Ok(AllocationProgress::NeedsConfirmation)
            }
        }
    }

    fn validate(&self) -> StepResult<Validated> {
        let checks = || -> Result<Validated, VaultError> {
            let amount = positive_amount(&self.amount_input)?;
            let recipient = Address::parse(&self.recipient_input)?;
            let from = self.orchestrator.connected_address()?;
            Ok(Validated {
                from,
                recipient,
                amount,
            })
        };
        checks().map_err(|e| self.fail(AllocationStep::Validate, e))
    }

    async fn register_then_allocate(&mut self, validated: &Validated) -> StepResult<AllocationReceipt> {
        self.stage = AllocationStage::Registering;
        let ledger = self.orchestrator.ledger();
        let pending = ledger
            .register_recipient(&validated.from, self.vault, &validated.recipient)
            .await
            .map_err(|e| self.fail(AllocationStep::Register, e.into()))?;
        let receipt = self
            .orchestrator
            .confirm(pending)
            .await
            .map_err(|e| self.fail(AllocationStep::Register, e))?;
        tracing::info!(
            vault = %self.vault,
            recipient = %validated.recipient,
            "recipient registered"
        );
        self.registration = Some(receipt);

        self.allocate(validated).await
    }

    async fn allocate(&mut self, validated: &Validated) -> StepResult<AllocationReceipt> {
        self.stage = AllocationStage::Allocating;
        let ledger = self.orchestrator.ledger();

        let recipient_id = ledger
            .recipient_id(self.vault, &validated.recipient)
            .await
            .map_err(|e| self.fail(AllocationStep::LookupRecipient, e.into()))?;
        let pending = ledger
            .allocate(&validated.from, self.vault, validated.amount, recipient_id)
            .await
            .map_err(|e| self.fail(AllocationStep::Allocate, e.into()))?;
        let allocation = self
            .orchestrator
            .confirm(pending)
            .await
            .map_err(|e| self.fail(AllocationStep::Allocate, e))?;
        tracing::info!(
            vault = %self.vault,
            %recipient_id,
            amount = %validated.amount,
            "allocation committed"
        );

        self.stage = AllocationStage::Refreshing;
        let set = self
            .orchestrator
            .refresh_after(Role::Depositor, &validated.from, &allocation)
            .await
            .map_err(|e| self.fail(AllocationStep::Refresh, e))?;
        let vault = set
            .get(self.vault)
            .cloned()
            .ok_or_else(|| self.fail(AllocationStep::Refresh, VaultError::vault_missing(self.vault)))?;

        let receipt = AllocationReceipt {
            registration: self.registration.clone(),
            allocation,
            recipient_id,
            vault,
        };
        self.stage = AllocationStage::Done(receipt.clone());
        Ok(receipt)
    }

    // -----------------------------------------------------------------------
    // Failure bookkeeping
    // -----------------------------------------------------------------------

    fn fail(&self, step: AllocationStep, error: VaultError) -> AllocationFailure {
        AllocationFailure {
            step,
            registration_committed: self.registration.is_some(),
            error,
        }
    }

    /// A call the flow cannot honor in its current stage. The stage is left
    /// as it is.
    fn misuse(&self, reason: &str) -> AllocationFailure {
        self.fail(
            AllocationStep::Validate,
            VaultError::StateInconsistent(reason.to_string()),
        )
    }

    fn record_failure(&mut self, failure: &AllocationFailure) {
        self.stage = AllocationStage::Failed(failure.clone());
        let outcome: Result<(), VaultError> = Err(failure.error.clone());
        self.orchestrator
            .board()
            .finish(OperationKind::Allocate, &outcome);
        if failure.registration_committed {
            tracing::warn!(
                vault = %self.vault,
                step = %failure.step,
                error = %failure.error,
                "allocation failed after the recipient registration committed"
            );
        } else {
            tracing::warn!(vault = %self.vault, step = %failure.step, error = %failure.error, "allocation failed");
        }
    }
}
