//! Metrics collection for observability
//!
//! Prometheus metrics for monitoring the ledger:
//!
//! - `wallet_ledger_ops_total{kind}` - Ledger entries appended, by kind
//! - `wallet_payout_transitions_total{status}` - Payout transitions
//! - `wallet_disputes_resolved_total` - Disputes resolved
//! - `wallet_op_duration_seconds` - Operation latency histogram

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Ledger entries appended, labeled by entry kind
    pub ops_total: IntCounterVec,

    /// Payout state transitions, labeled by resulting status
    pub payout_transitions_total: IntCounterVec,

    /// Disputes resolved (either favor)
    pub disputes_resolved_total: IntCounter,

    /// Operation duration histogram
    pub op_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let ops_total = IntCounterVec::new(
            Opts::new("wallet_ledger_ops_total", "Ledger entries appended"),
            &["kind"],
        )?;
        registry.register(Box::new(ops_total.clone()))?;

        let payout_transitions_total = IntCounterVec::new(
            Opts::new(
                "wallet_payout_transitions_total",
                "Payout state transitions",
            ),
            &["status"],
        )?;
        registry.register(Box::new(payout_transitions_total.clone()))?;

        let disputes_resolved_total = IntCounter::new(
            "wallet_disputes_resolved_total",
            "Disputes resolved in either favor",
        )?;
        registry.register(Box::new(disputes_resolved_total.clone()))?;

        let op_duration = Histogram::with_opts(
            HistogramOpts::new(
                "wallet_op_duration_seconds",
                "Ledger operation latency",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )?;
        registry.register(Box::new(op_duration.clone()))?;

        Ok(Self {
            ops_total,
            payout_transitions_total,
            disputes_resolved_total,
            op_duration,
            registry,
        })
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
