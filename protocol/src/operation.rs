//! # Operation Status
//!
//! Each high-level operation kind carries a small state machine:
//!
//! ```text
//! Idle ──begin──▶ InFlight ──finish──▶ Succeeded | Failed
//!   ▲                                        │
//!   └───────────────── reset ────────────────┘
//! ```
//!
//! The [`OperationBoard`] holds one of these per kind and is what a caller
//! polls for an "in progress" flag or the last error. It is bookkeeping only;
//! it never blocks a second operation of the same kind from starting.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// The user-facing operations tracked on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Deposit,
    Withdraw,
    Allocate,
    Claim,
}

impl OperationKind {
    /// Every tracked kind.
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Create,
        OperationKind::Deposit,
        OperationKind::Withdraw,
        OperationKind::Allocate,
        OperationKind::Claim,
    ];
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationKind::Create => "create",
            OperationKind::Deposit => "deposit",
            OperationKind::Withdraw => "withdraw",
            OperationKind::Allocate => "allocate",
            OperationKind::Claim => "claim",
        };
        f.write_str(s)
    }
}

/// Where one operation kind currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OperationState {
    /// Nothing running, nothing to report.
    #[default]
    Idle,
    /// Submitted or waiting on the ledger.
    InFlight,
    /// Terminal: the last run completed.
    Succeeded,
    /// Terminal: the last run failed with this error.
    Failed(VaultError),
}

impl OperationState {
    /// Returns `true` for `Succeeded` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Succeeded | OperationState::Failed(_))
    }
}

/// Per-kind operation status, shared by everything holding the orchestrator.
#[derive(Debug, Default)]
pub struct OperationBoard {
    states: Mutex<HashMap<OperationKind, OperationState>>,
}

impl OperationBoard {
    /// A board with every kind idle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of `kind`.
    pub fn state(&self, kind: OperationKind) -> OperationState {
        self.states.lock().get(&kind).cloned().unwrap_or_default()
    }

    /// Marks `kind` in flight. Any previous outcome is overwritten.
    pub fn begin(&self, kind: OperationKind) {
        self.states.lock().insert(kind, OperationState::InFlight);
    }

    /// Records the outcome of a run of `kind`.
    ///
    /// Only moves out of `InFlight`; a board that was reset while the run was
    /// still going keeps its `Idle`.
    pub fn finish<T>(&self, kind: OperationKind, outcome: &VaultResult<T>) {
        let mut states = self.states.lock();
        let entry = states.entry(kind).or_default();
        if *entry != OperationState::InFlight {
            return;
        }
        *entry = match outcome {
            Ok(_) => OperationState::Succeeded,
            Err(e) => OperationState::Failed(e.clone()),
        };
    }

    /// Parks an in-flight `kind` back at `Idle` without an outcome. Used when
    /// an operation suspends waiting on the user.
    pub fn park(&self, kind: OperationKind) {
        let mut states = self.states.lock();
        if let Some(entry @ OperationState::InFlight) = states.get_mut(&kind) {
            *entry = OperationState::Idle;
        }
    }

    /// Clears a terminal state so the caller can retry.
    pub fn reset(&self, kind: OperationKind) {
        let mut states = self.states.lock();
        if let Some(entry) = states.get_mut(&kind) {
            if entry.is_terminal() {
                *entry = OperationState::Idle;
            }
        }
    }

    /// `true` while `kind` is in flight.
    pub fn in_progress(&self, kind: OperationKind) -> bool {
        self.state(kind) == OperationState::InFlight
    }

    /// The error of the last failed run of `kind`, if that is the current
    /// state.
    pub fn last_error(&self, kind: OperationKind) -> Option<VaultError> {
        match self.state(kind) {
            OperationState::Failed(e) => Some(e),
            _ => None,
        }
    }
}
