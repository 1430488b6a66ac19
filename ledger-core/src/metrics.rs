//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `ledger_balance` - Current balance per peer
//! - `ledger_balance_updates_total` - Committed updates per peer
//! - `ledger_balance_bound_violations_total` - Rejected updates per peer

use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};

/// Ledger metrics
#[derive(Clone, Debug)]
pub struct LedgerMetrics {
    /// Current balance
    pub balance: IntGaugeVec,

    /// Committed updates
    pub updates_total: IntCounterVec,

    /// Rejected updates
    pub bound_violations_total: IntCounterVec,
}

impl LedgerMetrics {
    /// Create metrics and register them with `registry`
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let balance = IntGaugeVec::new(
            Opts::new("ledger_balance", "Current balance per peer"),
            &["peer"],
        )?;
        registry.register(Box::new(balance.clone()))?;

        let updates_total = IntCounterVec::new(
            Opts::new(
                "ledger_balance_updates_total",
                "Committed balance updates per peer",
            ),
            &["peer"],
        )?;
        registry.register(Box::new(updates_total.clone()))?;

        let bound_violations_total = IntCounterVec::new(
            Opts::new(
                "ledger_balance_bound_violations_total",
                "Balance updates rejected for violating bounds",
            ),
            &["peer"],
        )?;
        registry.register(Box::new(bound_violations_total.clone()))?;

        Ok(Self {
            balance,
            updates_total,
            bound_violations_total,
        })
    }

    /// Record committed update
    pub fn record_update(&self, peer_id: &str, balance: i64) {
        self.balance.with_label_values(&[peer_id]).set(balance);
        self.updates_total.with_label_values(&[peer_id]).inc();
    }

    /// Record rejected update
    pub fn record_violation(&self, peer_id: &str) {
        self.bound_violations_total
            .with_label_values(&[peer_id])
            .inc();
    }

    /// Set balance gauge without counting an update
    pub fn set_balance(&self, peer_id: &str, balance: i64) {
        self.balance.with_label_values(&[peer_id]).set(balance);
    }

    /// Drop every series for a peer
    pub fn remove_peer(&self, peer_id: &str) {
        // Series that were never touched are absent; that is fine
        let _ = self.balance.remove_label_values(&[peer_id]);
        let _ = self.updates_total.remove_label_values(&[peer_id]);
        let _ = self.bound_violations_total.remove_label_values(&[peer_id]);
    }
}
