//! End-to-end tests for the vault operation orchestrator.
//!
//! The orchestrator runs against a `LocalLedger`, so every test can check
//! both the outcome and the exact ledger calls that produced it: validation
//! that never reaches the ledger, single refreshes after commits, the
//! two-phase allocation pause, partial failures and session changes.

use std::sync::Arc;
use std::time::Duration;

use edu_vault_contracts::local_ledger::{Fault, LocalLedger};
use edu_vault_contracts::vault_registry::VaultRegistry;
use edu_vault_protocol::address::Address;
use edu_vault_protocol::amount::Wei;
use edu_vault_protocol::cache::Role;
use edu_vault_protocol::error::VaultError;
use edu_vault_protocol::ledger::{LedgerOp, VaultId};
use edu_vault_protocol::operation::{OperationKind, OperationState};
use edu_vault_protocol::orchestrator::{
    AllocationProgress, AllocationStage, AllocationStep, ClaimOutcome, VaultOrchestrator,
};
use edu_vault_protocol::session::WalletSession;

const DEPOSITOR: &str = "0x1111111111111111111111111111111111111111";
const NEW_RECIPIENT: &str = "0xAbCdEf0123456789aBcDeF0123456789AbCdEf01";

/// Helper: parses an address.
fn addr(text: &str) -> Address {
    Address::parse(text).unwrap()
}

/// Helper: whole EDU.
fn edu(n: u128) -> Wei {
    Wei::new(n * 10u128.pow(18))
}

/// Helper: a registry whose only vault is vault 7, owned by the depositor,
/// holding `deposit` EDU.
fn vault_seven(deposit: u128) -> VaultRegistry {
    let mut reg = VaultRegistry::starting_at(7);
    let vault = reg
        .create_vault(&addr(DEPOSITOR), "Scholarship Fund A")
        .unwrap();
    assert_eq!(vault, VaultId(7));
    if deposit > 0 {
        reg.deposit(&addr(DEPOSITOR), vault, edu(deposit)).unwrap();
    }
    reg
}

/// Helper: an orchestrator for `who` over a shared ledger.
fn connect(ledger: &LocalLedger, who: &str) -> (Arc<WalletSession>, VaultOrchestrator<LocalLedger>) {
    let session = Arc::new(WalletSession::connected(addr(who)));
    let orchestrator = VaultOrchestrator::new(Arc::new(ledger.clone()), Arc::clone(&session));
    (session, orchestrator)
}

fn ledger_with(registry: VaultRegistry) -> LocalLedger {
    LocalLedger::builder().registry(registry).build()
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_adds_exactly_one_empty_vault() {
    let ledger = LocalLedger::new();
    let (_, vaults) = connect(&ledger, DEPOSITOR);
    let desk = vaults.depositor();

    let created = desk.create("Scholarship Fund A").await.unwrap();
    assert_eq!(created.created.len(), 1);
    let vault = &created.created[0];
    assert_eq!(vault.name, "Scholarship Fund A");
    assert_eq!(vault.total_deposited, Wei::ZERO);
    assert_eq!(vault.caller_claimable, None);
    assert_eq!(created.receipt.op, LedgerOp::CreateVault);

    assert_eq!(ledger.mutations(), vec![LedgerOp::CreateVault]);
    assert_eq!(ledger.calls(LedgerOp::ListDepositorVaults), 1);
    assert!(vaults.snapshot(vault.id).is_some());
}

#[tokio::test]
async fn create_reports_only_the_new_vault() {
    let ledger = ledger_with(vault_seven(0));
    let (_, vaults) = connect(&ledger, DEPOSITOR);
    let desk = vaults.depositor();
    desk.refresh().await.unwrap();

    // Duplicate names are allowed.
    let created = desk.create("  Scholarship Fund A ").await.unwrap();
    assert_eq!(created.created.len(), 1);
    assert_eq!(created.created[0].id, VaultId(8));
    assert_eq!(vaults.vaults().unwrap().ids(), vec![VaultId(7), VaultId(8)]);
}

#[tokio::test]
async fn blank_name_never_reaches_the_ledger() {
    let ledger = LocalLedger::new();
    let (_, vaults) = connect(&ledger, DEPOSITOR);

    let err = vaults.depositor().create("   ").await.unwrap_err();
    assert!(matches!(err, VaultError::Validation(_)));
    assert!(ledger.journal().is_empty());
    assert_eq!(vaults.last_error(OperationKind::Create), Some(err));
}

// ---------------------------------------------------------------------------
// Deposit / Withdraw
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deposit_adds_to_total_and_refreshes_once() {
    let ledger = ledger_with(vault_seven(50));
    let (_, vaults) = connect(&ledger, DEPOSITOR);
    let desk = vaults.depositor();
    desk.refresh().await.unwrap();
    ledger.clear_journal();

    let done = desk.deposit(VaultId(7), "100").await.unwrap();
    assert_eq!(done.vault.total_deposited, edu(150));
    assert_eq!(vaults.snapshot(VaultId(7)).unwrap().total_deposited, edu(150));

    assert_eq!(ledger.mutations(), vec![LedgerOp::Deposit]);
    assert_eq!(ledger.calls(LedgerOp::ListDepositorVaults), 1);
    assert_eq!(
        vaults.board().state(OperationKind::Deposit),
        OperationState::Succeeded
    );
}

#[tokio::test]
async fn non_positive_amounts_make_no_calls() {
    let ledger = ledger_with(vault_seven(50));
    let (_, vaults) = connect(&ledger, DEPOSITOR);
    let desk = vaults.depositor();
    desk.refresh().await.unwrap();
    ledger.clear_journal();

    for amount in ["0", "0.000", "-5", "", "ten"] {
        let err = desk.deposit(VaultId(7), amount).await.unwrap_err();
        assert!(err.is_validation(), "deposit {amount:?}: {err:?}");
        let err = desk.withdraw(VaultId(7), amount).await.unwrap_err();
        assert!(err.is_validation(), "withdraw {amount:?}: {err:?}");
    }
    assert!(ledger.journal().is_empty());
}

#[tokio::test]
async fn withdraw_above_cached_deposit_is_refused_locally() {
    let ledger = ledger_with(vault_seven(50));
    let (_, vaults) = connect(&ledger, DEPOSITOR);
    let desk = vaults.depositor();
    desk.refresh().await.unwrap();
    ledger.clear_journal();

    let err = desk.withdraw(VaultId(7), "50.5").await.unwrap_err();
    assert_eq!(
        err,
        VaultError::InsufficientFunds {
            requested: Wei::parse_ether("50.5").unwrap(),
            available: edu(50),
        }
    );
    assert!(ledger.journal().is_empty());
}

#[tokio::test]
async fn withdraw_commits_and_refreshes() {
    let ledger = ledger_with(vault_seven(50));
    let (_, vaults) = connect(&ledger, DEPOSITOR);
    let desk = vaults.depositor();
    desk.refresh().await.unwrap();

    let done = desk.withdraw(VaultId(7), "20").await.unwrap();
    assert_eq!(done.vault.total_deposited, edu(30));
    assert_eq!(done.receipt.op, LedgerOp::DepositorWithdraw);
}

#[tokio::test]
async fn withdraw_from_uncached_vault_is_inconsistent() {
    let ledger = ledger_with(vault_seven(50));
    let (_, vaults) = connect(&ledger, DEPOSITOR);

    let err = vaults.depositor().withdraw(VaultId(7), "1").await.unwrap_err();
    assert!(matches!(err, VaultError::StateInconsistent(_)));
    assert!(ledger.journal().is_empty());
}

#[tokio::test]
async fn ledger_guard_still_applies_after_local_check() {
    // The cached total passes the local check, but part of it is allocated.
    let mut reg = vault_seven(50);
    let rid = reg
        .register_recipient(&addr(DEPOSITOR), VaultId(7), &addr(NEW_RECIPIENT))
        .unwrap();
    reg.allocate(&addr(DEPOSITOR), VaultId(7), edu(40), rid).unwrap();
    let ledger = ledger_with(reg);
    let (_, vaults) = connect(&ledger, DEPOSITOR);
    let desk = vaults.depositor();
    desk.refresh().await.unwrap();

    let err = desk.withdraw(VaultId(7), "20").await.unwrap_err();
    assert_eq!(err.failed_op(), Some(LedgerOp::DepositorWithdraw));
    assert_eq!(vaults.snapshot(VaultId(7)).unwrap().total_deposited, edu(50));
}

#[tokio::test]
async fn failed_mutation_leaves_cache_untouched() {
    let ledger = ledger_with(vault_seven(50));
    let (_, vaults) = connect(&ledger, DEPOSITOR);
    let desk = vaults.depositor();
    let before = desk.refresh().await.unwrap();
    ledger.clear_journal();
    ledger.inject(LedgerOp::Deposit, Fault::Revert);

    let err = desk.deposit(VaultId(7), "1").await.unwrap_err();
    assert_eq!(err.failed_op(), Some(LedgerOp::Deposit));
    assert_eq!(vaults.vaults(), Some(before));
    assert_eq!(ledger.journal(), vec![LedgerOp::Deposit]);

    assert!(vaults.last_error(OperationKind::Deposit).is_some());
    vaults.board().reset(OperationKind::Deposit);
    assert_eq!(vaults.last_error(OperationKind::Deposit), None);
}

#[tokio::test]
async fn refresh_failure_after_commit_names_the_read() {
    let ledger = ledger_with(vault_seven(50));
    let (_, vaults) = connect(&ledger, DEPOSITOR);
    let desk = vaults.depositor();
    desk.refresh().await.unwrap();
    ledger.inject(LedgerOp::GetTotalDeposit, Fault::Unreachable);

    let err = desk.deposit(VaultId(7), "5").await.unwrap_err();
    assert_eq!(err.failed_op(), Some(LedgerOp::GetTotalDeposit));

    // The deposit itself committed; the stale snapshot is kept.
    assert_eq!(
        ledger.with_registry(|r| r.total_deposit(VaultId(7)).unwrap()),
        edu(55)
    );
    assert_eq!(vaults.snapshot(VaultId(7)).unwrap().total_deposited, edu(50));
}

#[tokio::test]
async fn operations_require_a_connected_wallet() {
    let ledger = ledger_with(vault_seven(50));
    let session = Arc::new(WalletSession::new());
    let vaults = VaultOrchestrator::new(Arc::new(ledger.clone()), session);

    assert_eq!(
        vaults.depositor().deposit(VaultId(7), "1").await.unwrap_err(),
        VaultError::NotConnected
    );
    assert_eq!(
        vaults.depositor().refresh().await.unwrap_err(),
        VaultError::NotConnected
    );
    assert_eq!(
        vaults.recipient().claim(VaultId(7)).await.unwrap_err(),
        VaultError::NotConnected
    );
    assert!(ledger.journal().is_empty());
}

#[tokio::test]
async fn independent_deposits_may_overlap() {
    let ledger = LocalLedger::builder()
        .registry(vault_seven(0))
        .confirmation_delay(Duration::from_millis(5))
        .build();
    let (_, vaults) = connect(&ledger, DEPOSITOR);
    let desk = vaults.depositor();

    let (a, b) = futures::join!(desk.deposit(VaultId(7), "1"), desk.deposit(VaultId(7), "2"));
    a.unwrap();
    b.unwrap();
    assert_eq!(ledger.mutations(), vec![LedgerOp::Deposit, LedgerOp::Deposit]);

    // Overlapping refreshes are last-writer-wins; a fresh one sees both.
    desk.refresh().await.unwrap();
    assert_eq!(vaults.snapshot(VaultId(7)).unwrap().total_deposited, edu(3));
}

#[tokio::test(start_paused = true)]
async fn in_progress_while_waiting_for_confirmation() {
    let ledger = LocalLedger::builder()
        .registry(vault_seven(0))
        .confirmation_delay(Duration::from_secs(2))
        .build();
    let (_, vaults) = connect(&ledger, DEPOSITOR);

    let desk = vaults.depositor();
    let task = tokio::spawn(async move { desk.deposit(VaultId(7), "1").await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(vaults.in_progress(OperationKind::Deposit));
    assert!(!vaults.in_progress(OperationKind::Withdraw));

    task.await.unwrap().unwrap();
    assert!(!vaults.in_progress(OperationKind::Deposit));
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unregistered_recipient_pauses_then_registers_and_allocates() {
    let ledger = ledger_with(vault_seven(50));
    let (_, vaults) = connect(&ledger, DEPOSITOR);
    let desk = vaults.depositor();
    desk.refresh().await.unwrap();
    ledger.clear_journal();

    let mut flow = desk.allocate(VaultId(7), NEW_RECIPIENT, "10");
    assert_eq!(
        flow.start().await.unwrap(),
        AllocationProgress::NeedsConfirmation
    );
    assert_eq!(flow.stage(), &AllocationStage::NeedsConfirmation);
    assert!(flow.requires_two_transactions());
    assert!(ledger.mutations().is_empty());
    assert!(!vaults.in_progress(OperationKind::Allocate));

    let receipt = flow.confirm().await.unwrap();
    assert_eq!(
        ledger.mutations(),
        vec![LedgerOp::RegisterRecipient, LedgerOp::Allocate]
    );
    assert!(receipt.registration.is_some());
    assert_eq!(receipt.vault.total_allocated, edu(10));
    assert_eq!(vaults.snapshot(VaultId(7)).unwrap().total_allocated, edu(10));
    assert!(matches!(flow.stage(), AllocationStage::Done(_)));

    // The recipient now sees 10 EDU to claim.
    let (_, theirs) = connect(&ledger, NEW_RECIPIENT);
    theirs.recipient().refresh().await.unwrap();
    assert_eq!(
        theirs.snapshot(VaultId(7)).unwrap().caller_claimable,
        Some(edu(10))
    );
}

#[tokio::test]
async fn registered_recipient_skips_registration() {
    let mut reg = vault_seven(50);
    reg.register_recipient(
        &addr(DEPOSITOR),
        VaultId(7),
        &addr(&NEW_RECIPIENT.to_lowercase()),
    )
    .unwrap();
    let ledger = ledger_with(reg);
    let (_, vaults) = connect(&ledger, DEPOSITOR);

    // Same address, different spelling.
    let mut flow = vaults
        .depositor()
        .allocate(VaultId(7), &NEW_RECIPIENT.to_uppercase().replace("0X", "0x"), "3");
    let progress = flow.start().await.unwrap();

    let AllocationProgress::Done(receipt) = progress else {
        panic!("expected the allocation to complete, got {progress:?}");
    };
    assert!(receipt.registration.is_none());
    assert!(!flow.requires_two_transactions());
    assert_eq!(ledger.calls(LedgerOp::RegisterRecipient), 0);
    assert_eq!(ledger.calls(LedgerOp::Allocate), 1);
    assert_eq!(ledger.mutations(), vec![LedgerOp::Allocate]);
}

#[tokio::test]
async fn declining_makes_no_ledger_mutation() {
    let ledger = ledger_with(vault_seven(50));
    let (_, vaults) = connect(&ledger, DEPOSITOR);
    let mut flow = vaults.depositor().allocate(VaultId(7), NEW_RECIPIENT, "10");

    flow.start().await.unwrap();
    flow.cancel().unwrap();
    assert_eq!(flow.stage(), &AllocationStage::Cancelled);

    let failure = flow.confirm().await.unwrap_err();
    assert_eq!(failure.step, AllocationStep::Validate);
    assert!(matches!(failure.error, VaultError::StateInconsistent(_)));
    assert_eq!(flow.stage(), &AllocationStage::Cancelled);
    assert!(ledger.mutations().is_empty());
}

#[tokio::test]
async fn allocation_failure_after_registration_says_registration_committed() {
    let ledger = ledger_with(vault_seven(50));
    let (_, vaults) = connect(&ledger, DEPOSITOR);
    let mut flow = vaults.depositor().allocate(VaultId(7), NEW_RECIPIENT, "10");
    flow.start().await.unwrap();
    ledger.inject(LedgerOp::Allocate, Fault::Revert);

    let failure = flow.confirm().await.unwrap_err();
    assert_eq!(failure.step, AllocationStep::Allocate);
    assert!(failure.registration_committed);
    assert_eq!(failure.error.failed_op(), Some(LedgerOp::Allocate));
    assert!(matches!(flow.stage(), AllocationStage::Failed(_)));

    // No rollback: the registration stays.
    assert!(ledger
        .with_registry(|r| r.recipient_id(VaultId(7), &addr(NEW_RECIPIENT)))
        .is_ok());
    assert_eq!(
        vaults.last_error(OperationKind::Allocate),
        Some(failure.error.clone())
    );
}

#[tokio::test]
async fn rejected_registration_stops_before_allocating() {
    let ledger = ledger_with(vault_seven(50));
    let (_, vaults) = connect(&ledger, DEPOSITOR);
    let mut flow = vaults.depositor().allocate(VaultId(7), NEW_RECIPIENT, "10");
    flow.start().await.unwrap();
    ledger.inject(LedgerOp::RegisterRecipient, Fault::Reject);

    let failure = flow.confirm().await.unwrap_err();
    assert_eq!(failure.step, AllocationStep::Register);
    assert!(!failure.registration_committed);
    assert_eq!(ledger.calls(LedgerOp::Allocate), 0);
}

#[tokio::test]
async fn allocation_validates_before_any_call() {
    let ledger = ledger_with(vault_seven(50));
    let (_, vaults) = connect(&ledger, DEPOSITOR);

    for (recipient, amount) in [(NEW_RECIPIENT, "0"), ("0x1234", "1"), ("not an address", "1")] {
        let mut flow = vaults.depositor().allocate(VaultId(7), recipient, amount);
        let failure = flow.start().await.unwrap_err();
        assert_eq!(failure.step, AllocationStep::Validate);
        assert!(failure.error.is_validation());
    }
    assert!(ledger.journal().is_empty());
}

#[tokio::test]
async fn confirm_after_session_change_is_refused() {
    let ledger = ledger_with(vault_seven(50));
    let (session, vaults) = connect(&ledger, DEPOSITOR);
    let mut flow = vaults.depositor().allocate(VaultId(7), NEW_RECIPIENT, "10");
    flow.start().await.unwrap();

    session.connect(addr(NEW_RECIPIENT));
    let failure = flow.confirm().await.unwrap_err();
    assert!(matches!(failure.error, VaultError::StateInconsistent(_)));
    assert!(ledger.mutations().is_empty());
}

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

/// Helper: vault 7 with 10 EDU allocated to the new recipient.
fn allocated_to_recipient() -> LocalLedger {
    let mut reg = vault_seven(50);
    let rid = reg
        .register_recipient(&addr(DEPOSITOR), VaultId(7), &addr(NEW_RECIPIENT))
        .unwrap();
    reg.allocate(&addr(DEPOSITOR), VaultId(7), edu(10), rid).unwrap();
    ledger_with(reg)
}

#[tokio::test]
async fn claiming_full_balance_removes_vault_from_view() {
    let ledger = allocated_to_recipient();
    let (_, vaults) = connect(&ledger, NEW_RECIPIENT);
    let desk = vaults.recipient();
    let set = desk.refresh().await.unwrap();
    assert_eq!(set.role(), Role::Recipient);
    assert_eq!(set.ids(), vec![VaultId(7)]);

    let outcome = desk.claim(VaultId(7)).await.unwrap();
    let ClaimOutcome::Claimed { amount, remaining, .. } = outcome else {
        panic!("expected a claim, got {outcome:?}");
    };
    assert_eq!(amount, edu(10));
    assert!(remaining.get(VaultId(7)).is_none());
    assert!(vaults.snapshot(VaultId(7)).is_none());

    let listed = ledger.with_registry(|r| r.recipient_vaults(&addr(NEW_RECIPIENT)));
    assert!(!listed.contains(&VaultId(7)));
    assert_eq!(
        ledger.with_registry(|r| r.total_deposit(VaultId(7)).unwrap()),
        edu(40)
    );
}

#[tokio::test]
async fn claim_is_paid_into_the_wallet_balance() {
    let ledger = allocated_to_recipient();
    let (_, vaults) = connect(&ledger, NEW_RECIPIENT);
    let before = vaults.wallet_balance().await.unwrap();

    let desk = vaults.recipient();
    desk.refresh().await.unwrap();
    desk.claim(VaultId(7)).await.unwrap();

    let after = vaults.wallet_balance().await.unwrap();
    assert_eq!(after, before.checked_add(edu(10)).unwrap());
    assert_eq!(ledger.calls(LedgerOp::GetNativeBalance), 2);
}

#[tokio::test]
async fn wallet_balance_needs_a_connected_wallet() {
    let ledger = LocalLedger::new();
    let (session, vaults) = connect(&ledger, DEPOSITOR);
    session.disconnect();
    assert_eq!(vaults.wallet_balance().await, Err(VaultError::NotConnected));
    assert!(ledger.journal().is_empty());
}

#[tokio::test]
async fn claim_without_balance_is_inert() {
    let ledger = allocated_to_recipient();
    let (_, vaults) = connect(&ledger, NEW_RECIPIENT);

    // Nothing cached yet.
    let outcome = vaults.recipient().claim(VaultId(7)).await.unwrap();
    assert_eq!(outcome, ClaimOutcome::NothingToClaim);

    // Cached, but for a vault that is not in the recipient view.
    vaults.recipient().refresh().await.unwrap();
    let outcome = vaults.recipient().claim(VaultId(8)).await.unwrap();
    assert_eq!(outcome, ClaimOutcome::NothingToClaim);

    assert!(ledger.mutations().is_empty());
    assert_eq!(
        vaults.board().state(OperationKind::Claim),
        OperationState::Idle
    );
}

#[tokio::test]
async fn selection_disappearing_is_inconsistent() {
    let ledger = allocated_to_recipient();
    let (_, vaults) = connect(&ledger, NEW_RECIPIENT);
    vaults.recipient().refresh().await.unwrap();

    let selected = vaults.select(VaultId(7)).unwrap();
    assert_eq!(selected.caller_claimable, Some(edu(10)));
    vaults.recipient().claim(VaultId(7)).await.unwrap();

    assert!(matches!(
        vaults.selected(),
        Err(VaultError::StateInconsistent(_))
    ));
    assert_eq!(vaults.selected(), Ok(None));
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_change_drops_the_cache() {
    let ledger = ledger_with(vault_seven(50));
    let (session, vaults) = connect(&ledger, DEPOSITOR);
    vaults.depositor().refresh().await.unwrap();
    assert!(vaults.snapshot(VaultId(7)).is_some());

    session.connect(addr(NEW_RECIPIENT));
    assert!(vaults.vaults().is_none());
    assert!(vaults.snapshot(VaultId(7)).is_none());

    // The new wallet deposits nowhere.
    let set = vaults.depositor().refresh().await.unwrap();
    assert!(set.is_empty());
}

#[tokio::test(start_paused = true)]
async fn refresh_in_flight_when_session_ends_is_discarded() {
    let ledger = LocalLedger::builder()
        .registry(vault_seven(50))
        .read_delay(Duration::from_millis(50))
        .build();
    let (session, vaults) = connect(&ledger, DEPOSITOR);

    let desk = vaults.depositor();
    let refresh = tokio::spawn(async move { desk.refresh().await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    session.disconnect();
    assert!(vaults.vaults().is_none());

    let err = refresh.await.unwrap().unwrap_err();
    assert!(matches!(err, VaultError::StateInconsistent(_)));
    assert!(vaults.vaults().is_none());
}

#[tokio::test(start_paused = true)]
async fn mutation_confirmed_after_wallet_switch_does_not_fill_the_new_cache() {
    let ledger = LocalLedger::builder()
        .registry(vault_seven(50))
        .confirmation_delay(Duration::from_secs(2))
        .build();
    let (session, vaults) = connect(&ledger, DEPOSITOR);

    let desk = vaults.depositor();
    let deposit = tokio::spawn(async move { desk.deposit(VaultId(7), "1").await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    session.connect(addr(NEW_RECIPIENT));
    assert!(vaults.vaults().is_none());

    let err = deposit.await.unwrap().unwrap_err();
    assert!(matches!(err, VaultError::StateInconsistent(_)));
    // The deposit itself committed.
    assert_eq!(
        ledger.with_registry(|r| r.total_deposit(VaultId(7)).unwrap()),
        edu(51)
    );

    assert!(vaults.vaults().is_none());
    assert!(vaults.snapshot(VaultId(7)).is_none());
    let err = vaults.depositor().withdraw(VaultId(7), "1").await.unwrap_err();
    assert!(matches!(err, VaultError::StateInconsistent(_)));
    assert!(vaults.depositor().refresh().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn wallet_switch_without_reads_still_hides_previous_vaults() {
    let ledger = LocalLedger::builder()
        .registry(vault_seven(50))
        .confirmation_delay(Duration::from_secs(2))
        .build();
    let (session, vaults) = connect(&ledger, DEPOSITOR);

    let desk = vaults.depositor();
    let deposit = tokio::spawn(async move { desk.deposit(VaultId(7), "1").await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Nothing reads the cache between the switch and the confirmation.
    session.connect(addr(NEW_RECIPIENT));
    let err = deposit.await.unwrap().unwrap_err();
    assert!(matches!(err, VaultError::StateInconsistent(_)));

    assert!(vaults.vaults().is_none());
    assert!(vaults.snapshot(VaultId(7)).is_none());
}

#[tokio::test(start_paused = true)]
async fn refresh_finishing_after_wallet_switch_is_dropped_on_next_read() {
    let ledger = LocalLedger::builder()
        .registry(vault_seven(50))
        .read_delay(Duration::from_millis(50))
        .build();
    let (session, vaults) = connect(&ledger, DEPOSITOR);

    let desk = vaults.depositor();
    let refresh = tokio::spawn(async move { desk.refresh().await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    session.connect(addr(NEW_RECIPIENT));
    // The old wallet's refresh may finish; its result must not be served.
    let _ = refresh.await.unwrap();

    assert!(vaults.vaults().is_none());
    assert!(vaults.snapshot(VaultId(7)).is_none());
}
