//! # Prometheus Metrics
//!
//! Operational metrics for the devnet ledger node, scraped by Prometheus at
//! `/metrics` on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// JSON-RPC requests served, by method.
    pub rpc_requests_total: IntCounterVec,
    /// Mutating calls accepted for inclusion.
    pub tx_submitted_total: IntCounter,
    /// Transactions that committed.
    pub tx_confirmed_total: IntCounter,
    /// Transactions that reverted at execution.
    pub tx_reverted_total: IntCounter,
    /// Vaults on the ledger.
    pub vaults: IntGauge,
    /// Height of the last block that committed a transaction.
    pub block_height: IntGauge,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("edu_vault".into()), None)
            .expect("failed to create prometheus registry");

        let rpc_requests_total = IntCounterVec::new(
            Opts::new("rpc_requests_total", "JSON-RPC requests served"),
            &["method"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(rpc_requests_total.clone()))
            .expect("metric registration");

        let tx_submitted_total = IntCounter::new(
            "tx_submitted_total",
            "Mutating calls accepted for inclusion",
        )
        .expect("metric creation");
        registry
            .register(Box::new(tx_submitted_total.clone()))
            .expect("metric registration");

        let tx_confirmed_total =
            IntCounter::new("tx_confirmed_total", "Transactions committed to a block")
                .expect("metric creation");
        registry
            .register(Box::new(tx_confirmed_total.clone()))
            .expect("metric registration");

        let tx_reverted_total =
            IntCounter::new("tx_reverted_total", "Transactions reverted at execution")
                .expect("metric creation");
        registry
            .register(Box::new(tx_reverted_total.clone()))
            .expect("metric registration");

        let vaults = IntGauge::new("vaults", "Number of vaults on the ledger")
            .expect("metric creation");
        registry
            .register(Box::new(vaults.clone()))
            .expect("metric registration");

        let block_height = IntGauge::new(
            "block_height",
            "Height of the last block that committed a transaction",
        )
        .expect("metric creation");
        registry
            .register(Box::new(block_height.clone()))
            .expect("metric registration");

        Self {
            registry,
            rpc_requests_total,
            tx_submitted_total,
            tx_confirmed_total,
            tx_reverted_total,
            vaults,
            block_height,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
