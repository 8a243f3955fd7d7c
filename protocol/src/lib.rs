// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # EDU Vault — Core Library
//!
//! EDU Vault lets a depositor lock native EDU in named vaults, earmark parts
//! of them for recipients, and lets each recipient claim what was earmarked.
//! The vault contract on the ledger holds the money and the rules. This crate
//! is the client side: it turns intents into ordered ledger calls, waits for
//! them to commit, and keeps a projection of the ledger that can be checked
//! before anything is sent.
//!
//! ## Architecture
//!
//! Leaf first:
//!
//! - **config** — Network identity, unit decimals, ports and timings.
//! - **amount** — Exact whole-unit ⇄ smallest-unit conversion.
//! - **address** — Validated account addresses, compared case-insensitively.
//! - **ledger** — The `LedgerClient` contract and its JSON-RPC wire types.
//! - **session** — The connected wallet, with an explicit lifecycle.
//! - **cache** — Per-session vault snapshots, refreshed all-or-nothing.
//! - **operation** — Per-operation in-progress flag and last error.
//! - **orchestrator** — Create, deposit, withdraw, allocate, claim.
//! - **error** — The orchestrator's error taxonomy.
//!
//! ## Ground rules
//!
//! 1. The ledger is the source of truth. The cache is only ever replaced
//!    wholesale by a refresh.
//! 2. A mutation is done when its transaction committed, not when it was
//!    submitted.
//! 3. Bad input never reaches the ledger.
//! 4. Amounts are integers in the smallest unit; no floating point.

pub mod address;
pub mod amount;
pub mod cache;
pub mod config;
pub mod error;
pub mod ledger;
pub mod operation;
pub mod orchestrator;
pub mod session;

pub use address::Address;
pub use amount::Wei;
pub use cache::{Role, VaultCache, VaultSet, VaultSnapshot};
pub use error::{VaultError, VaultResult};
pub use ledger::{LedgerCallFailed, LedgerClient, LedgerOp, PendingTx, RecipientId, TxReceipt, VaultId};
pub use orchestrator::VaultOrchestrator;
pub use session::WalletSession;
