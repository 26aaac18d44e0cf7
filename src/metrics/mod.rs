//! Prometheus metrics
//!
//! Exposes metrics for:
//! - Wallet connects and chain switches
//! - Pending transaction lifecycle
//! - Data source fetches
//! - Submitted action flows

use crate::chain::ChainId;
use crate::flow::ActionKind;
use crate::tx::{PendingTransaction, TransactionKind};
use crate::wallet::WalletProviderKind;

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};

lazy_static! {
    // Session metrics
    pub static ref WALLET_CONNECTS: CounterVec = register_counter_vec!(
        "vaultlink_wallet_connects_total",
        "Wallet connect attempts by provider and outcome",
        &["provider", "outcome"]
    ).unwrap();

    pub static ref CHAIN_SWITCHES: CounterVec = register_counter_vec!(
        "vaultlink_chain_switches_total",
        "Chain switch requests by outcome",
        &["outcome"]
    ).unwrap();

    // Transaction metrics
    pub static ref TX_ADDED: CounterVec = register_counter_vec!(
        "vaultlink_transactions_added_total",
        "Transactions registered for tracking",
        &["chain_id", "kind"]
    ).unwrap();

    pub static ref TX_SETTLED: CounterVec = register_counter_vec!(
        "vaultlink_transactions_settled_total",
        "Transactions reaching a terminal status",
        &["chain_id", "status"]
    ).unwrap();

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "vaultlink_transaction_settle_seconds",
        "Time from submission to terminal status",
        &["chain_id"],
        vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 900.0, 3600.0]
    ).unwrap();

    pub static ref STORAGE_FAILURES: CounterVec = register_counter_vec!(
        "vaultlink_storage_failures_total",
        "Failed writes to durable storage",
        &["key"]
    ).unwrap();

    // Data metrics
    pub static ref SOURCE_FETCHES: CounterVec = register_counter_vec!(
        "vaultlink_source_fetches_total",
        "Data source fetches by outcome",
        &["source", "outcome"]
    ).unwrap();

    pub static ref SOURCE_LATENCY: HistogramVec = register_histogram_vec!(
        "vaultlink_source_fetch_seconds",
        "Data source fetch latency",
        &["source"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    pub static ref SOURCE_FAILING: GaugeVec = register_gauge_vec!(
        "vaultlink_source_failing",
        "Whether the last fetch of a source failed (1=failed, 0=ok)",
        &["source"]
    ).unwrap();

    // Flow metrics
    pub static ref FLOWS_SUBMITTED: CounterVec = register_counter_vec!(
        "vaultlink_flows_submitted_total",
        "Action flows that reached the wallet and were signed",
        &["action"]
    ).unwrap();
}

/// Prometheus text exposition of every registered metric
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

// Helper functions to record metrics

pub fn record_wallet_connect(kind: WalletProviderKind, outcome: &str) {
    WALLET_CONNECTS
        .with_label_values(&[kind.name(), outcome])
        .inc();
}

pub fn record_chain_switch(outcome: &str) {
    CHAIN_SWITCHES.with_label_values(&[outcome]).inc();
}

pub fn record_tx_added(chain: ChainId, kind: TransactionKind) {
    TX_ADDED
        .with_label_values(&[&chain.to_string(), kind.name()])
        .inc();
}

pub fn record_tx_settled(tx: &PendingTransaction) {
    let chain = tx.chain.to_string();
    TX_SETTLED
        .with_label_values(&[&chain, tx.status.name()])
        .inc();

    if let Some(settled_at) = tx.settled_at {
        let latency = (settled_at - tx.submitted_at).num_milliseconds().max(0) as f64 / 1000.0;
        TX_LATENCY.with_label_values(&[&chain]).observe(latency);
    }
}

pub fn record_storage_failure(key: &str) {
    STORAGE_FAILURES.with_label_values(&[key]).inc();
}

pub fn record_fetch(source: &str, outcome: &str, latency_secs: f64) {
    SOURCE_FETCHES.with_label_values(&[source, outcome]).inc();
    SOURCE_LATENCY
        .with_label_values(&[source])
        .observe(latency_secs);

    match outcome {
        "success" => SOURCE_FAILING.with_label_values(&[source]).set(0.0),
        "error" => SOURCE_FAILING.with_label_values(&[source]).set(1.0),
        _ => {}
    }
}

pub fn record_flow_submitted(kind: ActionKind) {
    FLOWS_SUBMITTED.with_label_values(&[kind.name()]).inc();
}
