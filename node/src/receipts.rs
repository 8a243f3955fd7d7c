//! Receipt book for transactions submitted through the devnet node.
//!
//! Every accepted mutation is recorded as pending and later overwritten with
//! its confirmed or reverted outcome. Settled receipts are kept for a
//! retention window and then expired by [`ReceiptBook::expire_settled`],
//! which the node runs on a timer. Pending receipts are never expired.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use edu_vault_protocol::ledger::rpc::{ReceiptResponse, TxStatus};

#[derive(Debug, Clone)]
struct Entry {
    receipt: ReceiptResponse,
    settled_at: Option<Instant>,
}

/// Receipts by transaction hash. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ReceiptBook {
    entries: Arc<DashMap<String, Entry>>,
    retention: Duration,
}

impl ReceiptBook {
    /// An empty book that keeps settled receipts for `retention`.
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            retention,
        }
    }

    /// How long settled receipts are kept.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Records `receipt`, replacing any earlier one for the same hash.
    /// A non-pending receipt starts its retention window now.
    pub fn record(&self, receipt: ReceiptResponse) {
        let settled_at = (receipt.status != TxStatus::Pending).then(Instant::now);
        self.entries
            .insert(receipt.tx_hash.clone(), Entry { receipt, settled_at });
    }

    /// The receipt for `tx_hash`, if it is still held.
    pub fn get(&self, tx_hash: &str) -> Option<ReceiptResponse> {
        self.entries.get(tx_hash).map(|e| e.value().receipt.clone())
    }

    /// Number of transactions still waiting for their outcome.
    pub fn pending(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.value().settled_at.is_none())
            .count()
    }

    /// Number of receipts held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Removes settled receipts older than the retention window. Returns the
    /// number removed.
    pub fn expire_settled(&self) -> usize {
        // Collect first; removing while iterating would deadlock the shard.
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| {
                e.value()
                    .settled_at
                    .is_some_and(|at| at.elapsed() >= self.retention)
            })
            .map(|e| e.key().clone())
            .collect();

        for hash in &expired {
            self.entries.remove(hash);
        }
        if !expired.is_empty() {
            tracing::debug!(expired = expired.len(), held = self.entries.len(), "settled receipts expired");
        }
        expired.len()
    }

    /// Expires settled receipts every `period` until the task is dropped.
    pub async fn run_expiry(self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.expire_settled();
        }
    }
}
