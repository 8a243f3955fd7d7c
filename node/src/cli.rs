//! # CLI Interface
//!
//! Defines the command-line argument structure for `edu-vault-node` using
//! `clap` derive. `serve` runs a devnet ledger; every other subcommand is an
//! operator action that drives the vault orchestrator against a ledger
//! reachable at `--rpc-url` on behalf of `--address`.

use clap::{Args, Parser, Subcommand, ValueEnum};

use edu_vault_protocol::cache::Role;
use edu_vault_protocol::config::{
    DEFAULT_CLIENT_RPC_URL, DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT, DEVNET_BLOCK_DELAY_MS,
    FIRST_VAULT_ID, RECEIPT_RETENTION_SECS,
};

use crate::logging::LogFormat;

/// EDU Vault node and operator tool.
///
/// Serves a local devnet copy of the vault ledger over JSON-RPC, and lets an
/// operator create and fund vaults, allocate to recipients and claim
/// allocations against any ledger that speaks the same RPC surface.
#[derive(Parser, Debug)]
#[command(
    name = "edu-vault-node",
    about = "EDU Vault devnet node and operator CLI",
    version,
    propagate_version = true
)]
pub struct EduVaultCli {
    /// Log output format.
    #[arg(long, global = true, value_enum, env = "EDU_VAULT_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a devnet ledger node.
    Serve(ServeArgs),
    /// Show the wallet's native EDU balance.
    Balance(BalanceArgs),
    /// List the vaults visible to the wallet in a role.
    Vaults(VaultsArgs),
    /// Create a vault.
    Create(CreateArgs),
    /// Deposit EDU into a vault you own.
    Deposit(AmountArgs),
    /// Withdraw unallocated EDU from a vault you own.
    Withdraw(AmountArgs),
    /// Allocate EDU from a vault to a recipient, registering it if needed.
    Allocate(AllocateArgs),
    /// Claim everything allocated to you in a vault.
    Claim(ClaimArgs),
    /// Print the network parameters a wallet needs to add the chain.
    Network(NetworkArgs),
    /// Print version information and exit.
    Version,
}

/// Connection options shared by the operator subcommands.
#[derive(Args, Debug, Clone)]
pub struct WalletArgs {
    /// JSON-RPC endpoint of the vault ledger.
    #[arg(long, env = "EDU_VAULT_RPC_URL", default_value = DEFAULT_CLIENT_RPC_URL)]
    pub rpc_url: String,

    /// Wallet address the operation is performed as.
    #[arg(long, env = "EDU_VAULT_ADDRESS")]
    pub address: String,
}

/// Arguments for the `serve` subcommand.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port for the JSON-RPC API.
    #[arg(long, env = "EDU_VAULT_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "EDU_VAULT_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Milliseconds between submission and commit of a transaction.
    #[arg(long, env = "EDU_VAULT_BLOCK_DELAY_MS", default_value_t = DEVNET_BLOCK_DELAY_MS)]
    pub block_delay_ms: u64,

    /// Id given to the first vault created on this ledger.
    #[arg(long, default_value_t = FIRST_VAULT_ID)]
    pub first_vault_id: u64,

    /// Seconds a settled transaction receipt stays queryable.
    #[arg(long, env = "EDU_VAULT_RECEIPT_RETENTION_SECS", default_value_t = RECEIPT_RETENTION_SECS)]
    pub receipt_retention_secs: u64,
}

/// Which side of the vaults to list.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleArg {
    Depositor,
    Recipient,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Depositor => Role::Depositor,
            RoleArg::Recipient => Role::Recipient,
        }
    }
}

/// Arguments for the `balance` subcommand.
#[derive(Args, Debug)]
pub struct BalanceArgs {
    #[command(flatten)]
    pub wallet: WalletArgs,
}

/// Arguments for the `vaults` subcommand.
#[derive(Args, Debug)]
pub struct VaultsArgs {
    #[command(flatten)]
    pub wallet: WalletArgs,

    /// Role to list vaults for.
    #[arg(long, value_enum, default_value_t = RoleArg::Depositor)]
    pub role: RoleArg,
}

/// Arguments for the `create` subcommand.
#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub wallet: WalletArgs,

    /// Display name of the new vault.
    pub name: String,
}

/// Arguments for `deposit` and `withdraw`.
#[derive(Args, Debug)]
pub struct AmountArgs {
    #[command(flatten)]
    pub wallet: WalletArgs,

    /// Vault id.
    pub vault: u64,

    /// Amount in EDU, e.g. `12.5`.
    pub amount: String,
}

/// Arguments for the `allocate` subcommand.
#[derive(Args, Debug)]
pub struct AllocateArgs {
    #[command(flatten)]
    pub wallet: WalletArgs,

    /// Vault id.
    pub vault: u64,

    /// Recipient address.
    pub recipient: String,

    /// Amount in EDU.
    pub amount: String,

    /// Agree up front to registering the recipient first (two transactions).
    /// Without it, the command asks on stdin.
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// Arguments for the `claim` subcommand.
#[derive(Args, Debug)]
pub struct ClaimArgs {
    #[command(flatten)]
    pub wallet: WalletArgs,

    /// Vault id.
    pub vault: u64,
}

/// Arguments for the `network` subcommand.
#[derive(Args, Debug)]
pub struct NetworkArgs {
    /// Describe a devnet node at this URL instead of the Open Campus testnet.
    #[arg(long)]
    pub devnet: Option<String>,
}
