//! # Network Configuration & Constants
//!
//! Every magic number in EDU Vault lives here. The orchestrator talks to
//! exactly one network at a time; which one is decided by a [`NetworkConfig`],
//! and the defaults below describe the Open Campus Codex testnet that the
//! vault contract is deployed on.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Network Identity
// ---------------------------------------------------------------------------

/// Chain id of Open Campus Codex Sepolia (`0xa045c`).
pub const OPEN_CAMPUS_CHAIN_ID: u64 = 0xa045c;

/// Human-readable chain name, as wallets display it.
pub const OPEN_CAMPUS_CHAIN_NAME: &str = "Open Campus Codex Sepolia";

/// Public JSON-RPC endpoint for the Open Campus testnet.
pub const OPEN_CAMPUS_RPC_URL: &str = "https://open-campus-codex-sepolia.drpc.org";

/// Block explorer for the Open Campus testnet.
pub const OPEN_CAMPUS_EXPLORER_URL: &str = "https://opencampus-codex.blockscout.com";

/// Ticker of the native currency. Amounts in the UI are shown in EDU.
pub const NATIVE_SYMBOL: &str = "EDU";

/// Native currency decimals. One EDU is `10^18` of the smallest unit.
/// The ledger only ever sees integers in the smallest unit.
pub const NATIVE_DECIMALS: u8 = 18;

/// Chain id reported by the local devnet node.
pub const DEVNET_CHAIN_ID: u64 = 0xed0;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// How often an HTTP ledger client polls for a transaction receipt while a
/// pending handle is awaited. There is deliberately no overall timeout:
/// confirmation resolves or rejects on the ledger's terms.
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Simulated block delay of the devnet node, in milliseconds. A submitted
/// transaction is committed one block after submission.
pub const DEVNET_BLOCK_DELAY_MS: u64 = 1_000;

/// Seconds a settled receipt stays queryable on the devnet node before it is
/// expired. Pending receipts never expire.
pub const RECEIPT_RETENTION_SECS: u64 = 600;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default JSON-RPC port of the devnet node.
pub const DEFAULT_RPC_PORT: u16 = 8645;

/// Default Prometheus metrics port of the devnet node.
pub const DEFAULT_METRICS_PORT: u16 = 8646;

/// Default RPC endpoint a client talks to when none is configured.
pub const DEFAULT_CLIENT_RPC_URL: &str = "http://127.0.0.1:8645";

/// Vault ids handed out by a fresh devnet ledger start here.
pub const FIRST_VAULT_ID: u64 = 1;

/// Native balance, in whole EDU, of an account the devnet ledger has not
/// seen before.
pub const DEVNET_STARTING_BALANCE_EDU: u128 = 10_000;

/// Recipient ids within a vault start here.
pub const FIRST_RECIPIENT_ID: u64 = 1;

// ---------------------------------------------------------------------------
// NetworkConfig
// ---------------------------------------------------------------------------

/// The single network the orchestrator is configured against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Display name of the chain.
    pub chain_name: String,
    /// JSON-RPC endpoint used for ledger calls.
    pub rpc_url: String,
    /// Block explorer base URL.
    pub explorer_url: String,
    /// Native currency ticker.
    pub symbol: String,
    /// Native currency decimals.
    pub decimals: u8,
}

impl NetworkConfig {
    /// The Open Campus Codex testnet the vault contract targets.
    pub fn open_campus_codex() -> Self {
        Self {
            chain_id: OPEN_CAMPUS_CHAIN_ID,
            chain_name: OPEN_CAMPUS_CHAIN_NAME.to_string(),
            rpc_url: OPEN_CAMPUS_RPC_URL.to_string(),
            explorer_url: OPEN_CAMPUS_EXPLORER_URL.to_string(),
            symbol: NATIVE_SYMBOL.to_string(),
            decimals: NATIVE_DECIMALS,
        }
    }

    /// A local devnet node at `rpc_url`.
    pub fn devnet(rpc_url: impl Into<String>) -> Self {
        Self {
            chain_id: DEVNET_CHAIN_ID,
            chain_name: "EDU Vault Devnet".to_string(),
            rpc_url: rpc_url.into(),
            explorer_url: String::new(),
            symbol: NATIVE_SYMBOL.to_string(),
            decimals: NATIVE_DECIMALS,
        }
    }

    /// Chain id as the `0x`-prefixed hex string wallets expect.
    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    /// Parameter object for a `wallet_addEthereumChain` request, so a wallet
    /// can be pointed at this network.
    pub fn add_chain_params(&self) -> serde_json::Value {
        let explorers: Vec<&str> = if self.explorer_url.is_empty() {
            Vec::new()
        } else {
            vec![self.explorer_url.as_str()]
        };

        serde_json::json!({
            "chainId": self.chain_id_hex(),
            "chainName": self.chain_name,
            "nativeCurrency": {
                "name": self.symbol,
                "symbol": self.symbol,
                "decimals": self.decimals,
            },
            "rpcUrls": [self.rpc_url],
            "blockExplorerUrls": explorers,
        })
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::open_campus_codex()
    }
}
