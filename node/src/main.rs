// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # EDU Vault Node
//!
//! Entry point for the `edu-vault-node` binary. Parses CLI arguments,
//! initializes logging, and either serves a devnet ledger or runs one
//! operator action through the vault orchestrator.
//!
//! - `serve`    — devnet ledger over JSON-RPC, plus Prometheus metrics
//! - `balance`  — native EDU balance of the wallet
//! - `vaults`   — list vaults for a role
//! - `create`, `deposit`, `withdraw`, `allocate` — depositor actions
//! - `claim`    — recipient action
//! - `network`  — wallet parameters for the configured chain
//! - `version`  — print build version information
//!
//! Operator results are printed to stdout as JSON; logs go to stderr.

mod api;
mod cli;
mod client;
mod logging;
mod metrics;
mod receipts;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::io::AsyncBufReadExt;
use tokio::signal;

use edu_vault_contracts::{LocalLedger, VaultRegistry};
use edu_vault_protocol::address::Address;
use edu_vault_protocol::amount::Wei;
use edu_vault_protocol::cache::Role;
use edu_vault_protocol::config::{NetworkConfig, NATIVE_SYMBOL};
use edu_vault_protocol::ledger::VaultId;
use edu_vault_protocol::orchestrator::{AllocationProgress, ClaimOutcome};
use edu_vault_protocol::{VaultOrchestrator, WalletSession};

use cli::{Commands, EduVaultCli, WalletArgs};
use client::RpcLedgerClient;
use logging::LogProfile;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = EduVaultCli::parse();

    let profile = match cli.command {
        Commands::Serve(_) => LogProfile::Node,
        _ => LogProfile::Operator,
    };
    logging::init_logging(profile, cli.log_format).context("failed to initialize logging")?;

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Balance(args) => show_balance(args).await,
        Commands::Vaults(args) => list_vaults(args).await,
        Commands::Create(args) => create_vault(args).await,
        Commands::Deposit(args) => deposit(args).await,
        Commands::Withdraw(args) => withdraw(args).await,
        Commands::Allocate(args) => allocate(args).await,
        Commands::Claim(args) => claim(args).await,
        Commands::Network(args) => print_network(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Devnet node
// ---------------------------------------------------------------------------

/// Serves a devnet ledger until interrupted.
async fn serve(args: cli::ServeArgs) -> Result<()> {
    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        block_delay_ms = args.block_delay_ms,
        first_vault_id = args.first_vault_id,
        receipt_retention_secs = args.receipt_retention_secs,
        "starting edu-vault devnet node"
    );

    let ledger = LocalLedger::builder()
        .registry(VaultRegistry::starting_at(args.first_vault_id))
        .confirmation_delay(Duration::from_millis(args.block_delay_ms))
        .without_journal()
        .build();

    let node_metrics = Arc::new(NodeMetrics::new());
    let network = NetworkConfig::devnet(format!("http://127.0.0.1:{}", args.rpc_port));
    let app_state = api::AppState::new(ledger, network, Arc::clone(&node_metrics))
        .with_receipt_retention(Duration::from_secs(args.receipt_retention_secs));

    // --- Receipt expiry ---
    let receipts = app_state.receipts.clone();
    let expiry_period = (receipts.retention() / 4).max(Duration::from_secs(1));
    let expiry = tokio::spawn(receipts.run_expiry(expiry_period));

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("JSON-RPC server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    expiry.abort();
    tracing::info!("edu-vault-node stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Operator actions
// ---------------------------------------------------------------------------

/// Builds an orchestrator acting as `wallet.address` against `wallet.rpc_url`.
async fn connect(wallet: &WalletArgs) -> Result<VaultOrchestrator<RpcLedgerClient>> {
    let address = Address::parse(&wallet.address)
        .with_context(|| format!("invalid wallet address {:?}", wallet.address))?;
    let client = RpcLedgerClient::new(&wallet.rpc_url).context("failed to build HTTP client")?;
    let chain_id = client
        .chain_id()
        .await
        .with_context(|| format!("ledger at {} is not reachable", wallet.rpc_url))?;
    tracing::info!(rpc_url = %wallet.rpc_url, chain_id, address = %address, "connected to ledger");

    Ok(VaultOrchestrator::new(
        Arc::new(client),
        Arc::new(WalletSession::connected(address)),
    ))
}

async fn show_balance(args: cli::BalanceArgs) -> Result<()> {
    let orchestrator = connect(&args.wallet).await?;
    let balance = orchestrator
        .wallet_balance()
        .await
        .context("failed to read wallet balance")?;
    print_json(&WalletBalance {
        display: format!("{} {}", balance.format_ether(), NATIVE_SYMBOL),
        address: args.wallet.address,
        balance,
    })
}

#[derive(Serialize)]
struct WalletBalance {
    address: String,
    balance: Wei,
    display: String,
}

async fn list_vaults(args: cli::VaultsArgs) -> Result<()> {
    let orchestrator = connect(&args.wallet).await?;
    let vaults = match Role::from(args.role) {
        Role::Depositor => orchestrator.depositor().refresh().await,
        Role::Recipient => orchestrator.recipient().refresh().await,
    }
    .context("failed to load vaults")?;
    print_json(&vaults)
}

async fn create_vault(args: cli::CreateArgs) -> Result<()> {
    let orchestrator = connect(&args.wallet).await?;
    let created = orchestrator
        .depositor()
        .create(&args.name)
        .await
        .context("create failed")?;
    print_json(&created)
}

async fn deposit(args: cli::AmountArgs) -> Result<()> {
    let orchestrator = connect(&args.wallet).await?;
    let mutation = orchestrator
        .depositor()
        .deposit(VaultId(args.vault), &args.amount)
        .await
        .context("deposit failed")?;
    print_json(&mutation)
}

async fn withdraw(args: cli::AmountArgs) -> Result<()> {
    let orchestrator = connect(&args.wallet).await?;
    let desk = orchestrator.depositor();
    // The balance guard reads the cached view.
    desk.refresh().await.context("failed to load vaults")?;
    let mutation = desk
        .withdraw(VaultId(args.vault), &args.amount)
        .await
        .context("withdraw failed")?;
    print_json(&mutation)
}

async fn allocate(args: cli::AllocateArgs) -> Result<()> {
    let orchestrator = connect(&args.wallet).await?;
    let mut flow = orchestrator
        .depositor()
        .allocate(VaultId(args.vault), &args.recipient, &args.amount);

    let receipt = match flow.start().await? {
        AllocationProgress::Done(receipt) => receipt,
        AllocationProgress::NeedsConfirmation => {
            let agreed = args.yes
                || confirm_on_stdin(&format!(
                    "{} is not a recipient of vault {}. Register it and then allocate (2 transactions)? [y/N] ",
                    args.recipient, args.vault
                ))
                .await?;
            if !agreed {
                flow.cancel()?;
                eprintln!("allocation cancelled");
                return Ok(());
            }
            flow.confirm().await?
        }
    };
    print_json(&receipt)
}

async fn claim(args: cli::ClaimArgs) -> Result<()> {
    let orchestrator = connect(&args.wallet).await?;
    let desk = orchestrator.recipient();
    desk.refresh().await.context("failed to load vaults")?;
    let outcome = desk.claim(VaultId(args.vault)).await.context("claim failed")?;
    if outcome == ClaimOutcome::NothingToClaim {
        eprintln!("nothing to claim in vault {}", args.vault);
    }
    print_json(&outcome)
}

fn print_network(args: cli::NetworkArgs) -> Result<()> {
    let network = match args.devnet {
        Some(url) => NetworkConfig::devnet(url),
        None => NetworkConfig::open_campus_codex(),
    };
    print_json(&serde_json::json!({
        "network": network,
        "wallet_add_chain": network.add_chain_params(),
    }))
}

/// Asks a yes/no question on stderr and reads the answer from stdin.
async fn confirm_on_stdin(question: &str) -> Result<bool> {
    eprint!("{}", question);
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let answer = lines
        .next_line()
        .await
        .context("failed to read confirmation")?
        .unwrap_or_default();
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Ok(true),
        "" | "n" | "no" => Ok(false),
        other => bail!("unrecognized answer {:?}", other),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to encode result")?;
    println!("{}", text);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("edu-vault-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc          {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
