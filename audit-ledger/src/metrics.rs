//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `audit_ledger_transactions_total` - Transactions accepted into the pending buffer
//! - `audit_ledger_blocks_sealed_total` - Blocks sealed and persisted
//! - `audit_ledger_seal_failures_total` - Seals aborted by a persistence failure
//! - `audit_ledger_pending_transactions` - Current pending buffer size
//! - `audit_ledger_block_size` - Histogram of transactions per sealed block
//! - `audit_ledger_seal_duration_seconds` - Histogram of seal latencies

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Transactions accepted
    pub transactions_total: IntCounter,

    /// Blocks sealed
    pub blocks_sealed_total: IntCounter,

    /// Failed seals
    pub seal_failures_total: IntCounter,

    /// Pending buffer size
    pub pending_transactions: IntGauge,

    /// Block size histogram
    pub block_size: Histogram,

    /// Seal duration histogram
    pub seal_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_total = IntCounter::new(
            "audit_ledger_transactions_total",
            "Transactions accepted into the pending buffer",
        )?;
        registry.register(Box::new(transactions_total.clone()))?;

        let blocks_sealed_total = IntCounter::new(
            "audit_ledger_blocks_sealed_total",
            "Blocks sealed and persisted",
        )?;
        registry.register(Box::new(blocks_sealed_total.clone()))?;

        let seal_failures_total = IntCounter::new(
            "audit_ledger_seal_failures_total",
            "Seals aborted by a persistence failure",
        )?;
        registry.register(Box::new(seal_failures_total.clone()))?;

        let pending_transactions = IntGauge::new(
            "audit_ledger_pending_transactions",
            "Current pending buffer size",
        )?;
        registry.register(Box::new(pending_transactions.clone()))?;

        let block_size = Histogram::with_opts(
            HistogramOpts::new("audit_ledger_block_size", "Transactions per sealed block")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]),
        )?;
        registry.register(Box::new(block_size.clone()))?;

        let seal_duration = Histogram::with_opts(
            HistogramOpts::new("audit_ledger_seal_duration_seconds", "Histogram of seal latencies")
                .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(seal_duration.clone()))?;

        Ok(Self {
            transactions_total,
            blocks_sealed_total,
            seal_failures_total,
            pending_transactions,
            block_size,
            seal_duration,
            registry,
        })
    }

    /// Record a transaction entering the pending buffer
    pub fn record_submission(&self, pending: usize) {
        self.transactions_total.inc();
        self.pending_transactions.set(pending as i64);
    }

    /// Record a successful seal
    pub fn record_seal(&self, event_count: u32, duration_seconds: f64) {
        self.blocks_sealed_total.inc();
        self.block_size.observe(event_count as f64);
        self.seal_duration.observe(duration_seconds);
        self.pending_transactions.set(0);
    }

    /// Record a failed seal
    pub fn record_seal_failure(&self) {
        self.seal_failures_total.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the Prometheus text format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
