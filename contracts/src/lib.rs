//! # EDU Vault Contracts
//!
//! The ledger side of EDU Vault, modeled in process. The real vault contract
//! lives on the Open Campus chain; this crate reproduces its rules so the
//! orchestrator can be exercised end to end and so the devnet node has
//! something to serve:
//!
//! - **Vault Registry** — vaults, recipients and claimable balances, with
//!   the contract's authorization and headroom rules.
//! - **Local Ledger** — a `LedgerClient` over the registry with real
//!   submit/confirm separation, a call journal and fault injection.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow. Amounts are `Wei`, never
//!    floats.
//! 2. A failed call changes nothing.
//! 3. Every public type is serializable (serde) so the devnet can expose it.

pub mod local_ledger;
pub mod vault_registry;

pub use local_ledger::{Fault, LocalLedger, LocalLedgerBuilder};
pub use vault_registry::{ContractError, Recipient, Vault, VaultRegistry};
