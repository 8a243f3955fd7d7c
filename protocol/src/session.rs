//! # Wallet Session
//!
//! The connected wallet is a scoped object with an explicit lifecycle rather
//! than ambient global state. A [`WalletSession`] is created once, shared by
//! the orchestrator and whatever drives it, and moves between connected and
//! disconnected through [`connect`](WalletSession::connect) and
//! [`disconnect`](WalletSession::disconnect).
//!
//! Each transition bumps the session epoch. Anything derived from the
//! session (the vault cache in particular) is only valid for the epoch it was
//! built under.

use tokio::sync::watch;

use crate::address::Address;

/// What the session looks like right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// The connected address, if any.
    pub address: Option<Address>,
    /// Incremented on every connect and disconnect.
    pub epoch: u64,
}

/// The connected-wallet session.
#[derive(Debug)]
pub struct WalletSession {
    state: watch::Sender<SessionState>,
}

impl WalletSession {
    /// A session with no wallet connected.
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState {
            address: None,
            epoch: 0,
        });
        Self { state }
    }

    /// A session already connected to `address`.
    pub fn connected(address: Address) -> Self {
        let session = Self::new();
        session.connect(address);
        session
    }

    /// Connects `address`, replacing any previous one.
    pub fn connect(&self, address: Address) {
        self.state.send_modify(|s| {
            s.address = Some(address);
            s.epoch += 1;
        });
        tracing::info!(epoch = self.epoch(), "wallet connected");
    }

    /// Ends the session. The address is cleared.
    pub fn disconnect(&self) {
        self.state.send_modify(|s| {
            s.address = None;
            s.epoch += 1;
        });
        tracing::info!(epoch = self.epoch(), "wallet disconnected");
    }

    /// The connected address, if any.
    pub fn current_address(&self) -> Option<Address> {
        self.state.borrow().address.clone()
    }

    /// The current epoch.
    pub fn epoch(&self) -> u64 {
        self.state.borrow().epoch
    }

    /// A consistent copy of address and epoch.
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Subscribes to session changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }
}

impl Default for WalletSession {
    fn default() -> Self {
        Self::new()
    }
}
