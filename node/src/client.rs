//! # HTTP Ledger Client
//!
//! [`RpcLedgerClient`] implements the ledger client contract over JSON-RPC
//! with `reqwest`. Mutating calls return once the node accepts the
//! transaction. The pending handle then polls `vault_getTransactionReceipt`
//! until the transaction commits or reverts.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use edu_vault_protocol::address::Address;
use edu_vault_protocol::amount::Wei;
use edu_vault_protocol::config::RECEIPT_POLL_INTERVAL;
use edu_vault_protocol::ledger::rpc::{
    AddressParams, CreateVaultParams, ReceiptParams, ReceiptResponse, RecipientAmountParams,
    RecipientBalanceParams, RecipientLookupParams, RegisterRecipientParams, RpcError, RpcMethod,
    RpcRequest, RpcResponse, SubmitResponse, TxStatus, VaultAmountParams, VaultParams,
};
use edu_vault_protocol::ledger::{
    LedgerCallFailed, LedgerClient, LedgerOp, LedgerResult, PendingTx, RecipientEntry,
    RecipientId, TxReceipt, VaultId,
};

/// Why a single RPC exchange failed.
#[derive(Debug)]
pub enum RpcFault {
    /// The node could not be reached or answered with a non-2xx status.
    Transport(String),
    /// The answer was not a usable JSON-RPC response.
    Malformed(String),
    /// The node answered with a JSON-RPC error.
    Rpc(RpcError),
}

impl RpcFault {
    fn into_ledger_failure(self, op: LedgerOp) -> LedgerCallFailed {
        match self {
            RpcFault::Transport(reason) => LedgerCallFailed::transport(op, reason),
            RpcFault::Malformed(reason) => LedgerCallFailed::malformed(op, reason),
            RpcFault::Rpc(error) => error.into_ledger_failure(op),
        }
    }
}

impl fmt::Display for RpcFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcFault::Transport(reason) => write!(f, "transport error: {}", reason),
            RpcFault::Malformed(reason) => write!(f, "malformed response: {}", reason),
            RpcFault::Rpc(error) => write!(f, "rpc error {}: {}", error.code, error.message),
        }
    }
}

impl std::error::Error for RpcFault {}

/// Ledger client speaking JSON-RPC over HTTP. Cloning shares the connection
/// pool and the request id counter.
#[derive(Clone)]
pub struct RpcLedgerClient {
    http: reqwest::Client,
    url: String,
    next_id: Arc<AtomicU64>,
    poll_interval: Duration,
}

impl RpcLedgerClient {
    /// Client for the node whose base URL is `rpc_url`. Requests go to
    /// `{rpc_url}/rpc`.
    pub fn new(rpc_url: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("edu-vault-node/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            url: format!("{}/rpc", rpc_url.trim_end_matches('/')),
            next_id: Arc::new(AtomicU64::new(1)),
            poll_interval: RECEIPT_POLL_INTERVAL,
        })
    }

    /// Overrides how often pending transactions poll for their receipt.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The node's chain id.
    pub async fn chain_id(&self) -> Result<u64, RpcFault> {
        let hex: String = self.send(RpcMethod::ChainId, Value::Null).await?;
        u64::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|e| RpcFault::Malformed(format!("chain id {:?}: {}", hex, e)))
    }

    async fn send<T: DeserializeOwned>(&self, method: RpcMethod, params: Value) -> Result<T, RpcFault> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| RpcFault::Transport(e.to_string()))?;
        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| RpcFault::Malformed(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(RpcFault::Rpc(error));
        }
        let result = body
            .result
            .ok_or_else(|| RpcFault::Malformed("response has neither result nor error".into()))?;
        serde_json::from_value(result).map_err(|e| RpcFault::Malformed(e.to_string()))
    }

    async fn call<P, T>(&self, op: LedgerOp, params: P) -> LedgerResult<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let params =
            serde_json::to_value(params).map_err(|e| LedgerCallFailed::malformed(op, e.to_string()))?;
        self.send(RpcMethod::Ledger(op), params)
            .await
            .map_err(|fault| fault.into_ledger_failure(op))
    }

    async fn submit<P: Serialize>(&self, op: LedgerOp, params: P) -> LedgerResult<PendingTx> {
        let submitted: SubmitResponse = self.call(op, params).await?;
        tracing::debug!(%op, tx_hash = %submitted.tx_hash, "transaction submitted");

        let client = self.clone();
        let tx_hash = submitted.tx_hash.clone();
        Ok(PendingTx::new(op, submitted.tx_hash, async move {
            client.await_receipt(op, tx_hash).await
        }))
    }

    async fn await_receipt(&self, op: LedgerOp, tx_hash: String) -> LedgerResult<TxReceipt> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let params = ReceiptParams {
                tx_hash: tx_hash.clone(),
            };
            let params = serde_json::to_value(params)
                .map_err(|e| LedgerCallFailed::malformed(op, e.to_string()))?;
            let receipt: ReceiptResponse = self
                .send(RpcMethod::GetTransactionReceipt, params)
                .await
                .map_err(|fault| fault.into_ledger_failure(op))?;

            match receipt.status {
                TxStatus::Pending => continue,
                TxStatus::Confirmed => {
                    let block_number = receipt.block_number.ok_or_else(|| {
                        LedgerCallFailed::malformed(op, "confirmed receipt without block number")
                    })?;
                    return Ok(TxReceipt {
                        op,
                        tx_hash,
                        block_number,
                    });
                }
                TxStatus::Reverted => {
                    let reason = receipt
                        .reason
                        .unwrap_or_else(|| "execution reverted".to_string());
                    return Err(LedgerCallFailed::reverted(op, reason));
                }
            }
        }
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn list_depositor_vaults(&self, depositor: &Address) -> LedgerResult<Vec<VaultId>> {
        let params = AddressParams {
            address: depositor.clone(),
        };
        self.call(LedgerOp::ListDepositorVaults, params).await
    }

    async fn list_recipient_vaults(&self, recipient: &Address) -> LedgerResult<Vec<VaultId>> {
        let params = AddressParams {
            address: recipient.clone(),
        };
        self.call(LedgerOp::ListRecipientVaults, params).await
    }

    async fn vault_name(&self, vault: VaultId) -> LedgerResult<String> {
        self.call(LedgerOp::GetVaultName, VaultParams { vault_id: vault })
            .await
    }

    async fn total_deposit(&self, vault: VaultId) -> LedgerResult<Wei> {
        self.call(LedgerOp::GetTotalDeposit, VaultParams { vault_id: vault })
            .await
    }

    async fn total_allocated(&self, vault: VaultId) -> LedgerResult<Wei> {
        self.call(LedgerOp::GetTotalAllocated, VaultParams { vault_id: vault })
            .await
    }

    async fn recipient_id(&self, vault: VaultId, address: &Address) -> LedgerResult<RecipientId> {
        let params = RecipientLookupParams {
            vault_id: vault,
            address: address.clone(),
        };
        self.call(LedgerOp::GetRecipientId, params).await
    }

    async fn recipient_balance(&self, vault: VaultId, recipient: RecipientId) -> LedgerResult<Wei> {
        let params = RecipientBalanceParams {
            vault_id: vault,
            recipient_id: recipient,
        };
        self.call(LedgerOp::GetRecipientBalance, params).await
    }

    async fn list_recipients(&self, vault: VaultId) -> LedgerResult<Vec<RecipientEntry>> {
        self.call(LedgerOp::ListRecipients, VaultParams { vault_id: vault })
            .await
    }

    async fn native_balance(&self, address: &Address) -> LedgerResult<Wei> {
        let params = AddressParams {
            address: address.clone(),
        };
        self.call(LedgerOp::GetNativeBalance, params).await
    }

    async fn create_vault(&self, from: &Address, name: &str) -> LedgerResult<PendingTx> {
        let params = CreateVaultParams {
            from: from.clone(),
            name: name.to_string(),
        };
        self.submit(LedgerOp::CreateVault, params).await
    }

    async fn deposit(&self, from: &Address, vault: VaultId, amount: Wei) -> LedgerResult<PendingTx> {
        let params = VaultAmountParams {
            from: from.clone(),
            vault_id: vault,
            amount,
        };
        self.submit(LedgerOp::Deposit, params).await
    }

    async fn depositor_withdraw(
        &self,
        from: &Address,
        vault: VaultId,
        amount: Wei,
    ) -> LedgerResult<PendingTx> {
        let params = VaultAmountParams {
            from: from.clone(),
            vault_id: vault,
            amount,
        };
        self.submit(LedgerOp::DepositorWithdraw, params).await
    }

    async fn register_recipient(
        &self,
        from: &Address,
        vault: VaultId,
        recipient: &Address,
    ) -> LedgerResult<PendingTx> {
        let params = RegisterRecipientParams {
            from: from.clone(),
            vault_id: vault,
            recipient: recipient.clone(),
        };
        self.submit(LedgerOp::RegisterRecipient, params).await
    }

    async fn allocate(
        &self,
        from: &Address,
        vault: VaultId,
        amount: Wei,
        recipient: RecipientId,
    ) -> LedgerResult<PendingTx> {
        let params = RecipientAmountParams {
            from: from.clone(),
            vault_id: vault,
            amount,
            recipient_id: recipient,
        };
        self.submit(LedgerOp::Allocate, params).await
    }

    async fn recipient_withdraw(
        &self,
        from: &Address,
        vault: VaultId,
        amount: Wei,
        recipient: RecipientId,
    ) -> LedgerResult<PendingTx> {
        let params = RecipientAmountParams {
            from: from.clone(),
            vault_id: vault,
            amount,
            recipient_id: recipient,
        };
        self.submit(LedgerOp::RecipientWithdraw, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{create_router, AppState};
    use crate::metrics::NodeMetrics;
    use edu_vault_contracts::{LocalLedger, VaultRegistry};
    use edu_vault_protocol::config::{NetworkConfig, DEVNET_CHAIN_ID};
    use edu_vault_protocol::ledger::FailureCause;
    use edu_vault_protocol::{Role, VaultOrchestrator, WalletSession};

    /// Helper: serves `ledger` on an ephemeral local port and returns a
    /// client pointed at it.
    async fn serve(ledger: LocalLedger) -> RpcLedgerClient {
        let state = AppState::new(
            ledger,
            NetworkConfig::devnet("http://127.0.0.1:0"),
            Arc::new(NodeMetrics::new()),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });
        RpcLedgerClient::new(&format!("http://{}", addr))
            .unwrap()
            .with_poll_interval(Duration::from_millis(10))
    }

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).unwrap()
    }

    #[tokio::test]
    async fn reports_chain_id() {
        let client = serve(LocalLedger::new()).await;
        assert_eq!(client.chain_id().await.unwrap(), DEVNET_CHAIN_ID);
    }

    #[tokio::test]
    async fn pending_transaction_resolves_after_the_block_delay() {
        let ledger = LocalLedger::builder()
            .confirmation_delay(Duration::from_millis(30))
            .build();
        let client = serve(ledger.clone()).await;

        let pending = client.create_vault(&addr(1), "fund").await.unwrap();
        assert_eq!(ledger.vault_count(), 0);
        let receipt = pending.confirmed().await.unwrap();
        assert_eq!(receipt.op, LedgerOp::CreateVault);
        assert_eq!(ledger.vault_count(), 1);
        assert_eq!(client.vault_name(VaultId(1)).await.unwrap(), "fund");
    }

    #[tokio::test]
    async fn revert_and_read_failures_keep_their_cause() {
        let client = serve(LocalLedger::new()).await;

        let pending = client.deposit(&addr(1), VaultId(5), Wei::new(1)).await.unwrap();
        let err = pending.confirmed().await.unwrap_err();
        assert_eq!(err.op, LedgerOp::Deposit);
        assert_eq!(err.cause, FailureCause::Reverted);

        let err = client.total_deposit(VaultId(5)).await.unwrap_err();
        assert_eq!(err.op, LedgerOp::GetTotalDeposit);
        assert_eq!(err.cause, FailureCause::Reverted);
    }

    #[tokio::test]
    async fn native_balance_tracks_deposits() {
        let ledger = LocalLedger::builder()
            .registry(VaultRegistry::new().with_starting_balance(Wei::new(1_000)))
            .build();
        let client = serve(ledger).await;
        assert_eq!(client.native_balance(&addr(1)).await.unwrap(), Wei::new(1_000));

        client.create_vault(&addr(1), "fund").await.unwrap().confirmed().await.unwrap();
        client
            .deposit(&addr(1), VaultId(1), Wei::new(400))
            .await
            .unwrap()
            .confirmed()
            .await
            .unwrap();
        assert_eq!(client.native_balance(&addr(1)).await.unwrap(), Wei::new(600));

        let err = client
            .deposit(&addr(1), VaultId(1), Wei::new(601))
            .await
            .unwrap()
            .confirmed()
            .await
            .unwrap_err();
        assert_eq!(err.cause, FailureCause::Reverted);
        assert!(err.reason.contains("insufficient native balance"), "{}", err.reason);
    }

    #[tokio::test]
    async fn unreachable_node_is_a_transport_failure() {
        let client = RpcLedgerClient::new("http://127.0.0.1:1").unwrap();
        let err = client.list_depositor_vaults(&addr(1)).await.unwrap_err();
        assert_eq!(err.op, LedgerOp::ListDepositorVaults);
        assert_eq!(err.cause, FailureCause::Transport);
    }

    #[tokio::test]
    async fn orchestrator_runs_over_http() {
        let client = serve(LocalLedger::new()).await;
        let depositor = addr(1);
        let student = addr(2);
        let orchestrator = VaultOrchestrator::new(
            Arc::new(client.clone()),
            Arc::new(WalletSession::connected(depositor)),
        );

        let created = orchestrator.depositor().create("Scholarship Fund A").await.unwrap();
        let vault = created.created[0].id;
        orchestrator.depositor().deposit(vault, "100").await.unwrap();

        let mut flow = orchestrator
            .depositor()
            .allocate(vault, student.as_str(), "10");
        flow.start().await.unwrap();
        let receipt = flow.confirm().await.unwrap();
        assert!(receipt.registration.is_some());
        assert_eq!(receipt.vault.total_allocated, Wei::parse_ether("10").unwrap());

        orchestrator.session().connect(student);
        let outcome = orchestrator.recipient().refresh().await.unwrap();
        assert_eq!(outcome.role(), Role::Recipient);
        assert_eq!(outcome.len(), 1);
    }
}
