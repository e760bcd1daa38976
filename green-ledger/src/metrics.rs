//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the wallet.
//!
//! # Metrics
//!
//! - `wallet_redemptions_total{outcome}` - Redemption attempts by outcome
//! - `wallet_balance` - Balance after the last successful apply
//! - `wallet_apply_duration_seconds` - Histogram of apply (commit) latencies
//! - `wallet_persist_failures_total` - Commits that failed

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Redemption attempts by outcome
    pub redemptions_total: IntCounterVec,

    /// Current balance
    pub balance: IntGauge,

    /// Apply duration histogram
    pub apply_duration: Histogram,

    /// Failed commits
    pub persist_failures: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector on a private registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let redemptions_total = IntCounterVec::new(
            Opts::new("wallet_redemptions_total", "Redemption attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(redemptions_total.clone()))?;

        let balance = IntGauge::new("wallet_balance", "Balance after the last successful apply")?;
        registry.register(Box::new(balance.clone()))?;

        let apply_duration = Histogram::with_opts(
            HistogramOpts::new(
                "wallet_apply_duration_seconds",
                "Histogram of apply latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(apply_duration.clone()))?;

        let persist_failures =
            IntCounter::new("wallet_persist_failures_total", "Commits that failed")?;
        registry.register(Box::new(persist_failures.clone()))?;

        Ok(Self {
            redemptions_total,
            balance,
            apply_duration,
            persist_failures,
            registry,
        })
    }

    /// Record a redemption outcome
    pub fn record_redemption(&self, outcome: &str) {
        self.redemptions_total.with_label_values(&[outcome]).inc();
    }

    /// Record a committed apply
    pub fn record_apply(&self, duration_seconds: f64, balance: u64) {
        self.apply_duration.observe(duration_seconds);
        self.balance.set(i64::try_from(balance).unwrap_or(i64::MAX));
    }

    /// Record a failed commit
    pub fn record_persist_failure(&self) {
        self.persist_failures.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
