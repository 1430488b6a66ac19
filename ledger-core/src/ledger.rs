//! Balance ledger
//!
//! Balances live in a `DashMap` keyed by peer id. Each update runs while
//! holding the entry's shard lock, so the bounds check and the commit are
//! one atomic step with respect to other updates for the same peer.
//!
//! # Example
//!
//! ```
//! use ledger_core::{BalanceConfig, BalanceLedger};
//!
//! let ledger = BalanceLedger::new();
//! ledger.create("alice", BalanceConfig::bounded(-100, 100)).unwrap();
//! assert_eq!(ledger.update("alice", 40).unwrap(), 40);
//! assert!(ledger.update("alice", 61).is_err());
//! assert_eq!(ledger.get("alice").unwrap(), 40);
//! ```

use crate::{
    types::{Balance, BalanceConfig, BalanceSnapshot},
    Error, LedgerMetrics, Result,
};
use dashmap::{mapref::entry::Entry, DashMap};

/// Per-peer balance ledger
#[derive(Debug, Default)]
pub struct BalanceLedger {
    balances: DashMap<String, Balance>,
    metrics: Option<LedgerMetrics>,
}

impl BalanceLedger {
    /// Create new ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Create new ledger reporting to `metrics`
    pub fn with_metrics(metrics: LedgerMetrics) -> Self {
        Self {
            balances: DashMap::new(),
            metrics: Some(metrics),
        }
    }

    /// Start tracking a peer
    pub fn create(&self, peer_id: &str, config: BalanceConfig) -> Result<()> {
        config.validate()?;
        match self.balances.entry(peer_id.to_string()) {
            Entry::Occupied(_) => Err(Error::PeerExists(peer_id.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(Balance::new(config));
                if let Some(metrics) = &self.metrics {
                    metrics.set_balance(peer_id, config.initial);
                }
                tracing::debug!(
                    "Tracking balance for {} in [{}, {}]",
                    peer_id,
                    config.minimum,
                    config.maximum
                );
                Ok(())
            }
        }
    }

    /// Stop tracking a peer, returning its final state
    pub fn delete(&self, peer_id: &str) -> Option<BalanceSnapshot> {
        let removed = self
            .balances
            .remove(peer_id)
            .map(|(id, balance)| snapshot(&id, &balance));
        if let Some(metrics) = &self.metrics {
            metrics.remove_peer(peer_id);
        }
        removed
    }

    /// Current balance
    pub fn get(&self, peer_id: &str) -> Result<i64> {
        self.balances
            .get(peer_id)
            .map(|balance| balance.current)
            .ok_or_else(|| Error::PeerNotFound(peer_id.to_string()))
    }

    /// Balance with its bounds
    pub fn snapshot(&self, peer_id: &str) -> Result<BalanceSnapshot> {
        self.balances
            .get(peer_id)
            .map(|balance| snapshot(peer_id, &balance))
            .ok_or_else(|| Error::PeerNotFound(peer_id.to_string()))
    }

    /// Apply a signed delta, returning the new balance
    ///
    /// Fails with [`Error::BoundsViolation`] and leaves the balance
    /// unchanged if the result would fall outside `[minimum, maximum]`.
    pub fn update(&self, peer_id: &str, delta: i64) -> Result<i64> {
        let mut balance = self
            .balances
            .get_mut(peer_id)
            .ok_or_else(|| Error::PeerNotFound(peer_id.to_string()))?;

        let next = balance.checked_apply(delta);
        match next {
            Some(next) => {
                balance.current = next;
                // Still under the entry lock, so gauge writes follow update order
                if let Some(metrics) = &self.metrics {
                    metrics.record_update(peer_id, next);
                }
                drop(balance);
                Ok(next)
            }
            None => {
                let err = Error::BoundsViolation {
                    peer_id: peer_id.to_string(),
                    current: balance.current,
                    delta,
                    minimum: balance.config.minimum,
                    maximum: balance.config.maximum,
                };
                drop(balance);
                if let Some(metrics) = &self.metrics {
                    metrics.record_violation(peer_id);
                }
                Err(err)
            }
        }
    }

    /// Increase the balance by `amount`
    pub fn credit(&self, peer_id: &str, amount: u64) -> Result<i64> {
        self.update(peer_id, to_delta(amount)?)
    }

    /// Decrease the balance by `amount`
    pub fn debit(&self, peer_id: &str, amount: u64) -> Result<i64> {
        self.update(peer_id, -to_delta(amount)?)
    }

    /// Every tracked balance, ordered by peer id
    pub fn list(&self) -> Vec<BalanceSnapshot> {
        let mut balances: Vec<BalanceSnapshot> = self
            .balances
            .iter()
            .map(|entry| snapshot(entry.key(), entry.value()))
            .collect();
        balances.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        balances
    }

    /// Whether a peer is tracked
    pub fn contains(&self, peer_id: &str) -> bool {
        self.balances.contains_key(peer_id)
    }

    /// Number of tracked peers
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    /// Whether no peer is tracked
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

fn to_delta(amount: u64) -> Result<i64> {
    i64::try_from(amount)
        .map_err(|_| Error::Overflow(format!("amount {} exceeds i64::MAX", amount)))
}

fn snapshot(peer_id: &str, balance: &Balance) -> BalanceSnapshot {
    BalanceSnapshot {
        peer_id: peer_id.to_string(),
        balance: balance.current,
        minimum: balance.config.minimum,
        maximum: balance.config.maximum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;
    use std::sync::Arc;

    #[test]
    fn test_create_and_get() {
        let ledger = BalanceLedger::new();
        ledger
            .create(
                "alice",
                BalanceConfig {
                    minimum: -10,
                    maximum: 10,
                    initial: 5,
                },
            )
            .unwrap();
        assert_eq!(ledger.get("alice").unwrap(), 5);
        assert_eq!(
            ledger.create("alice", BalanceConfig::default()),
            Err(Error::PeerExists("alice".to_string()))
        );
    }

    #[test]
    fn test_bounds_violation_leaves_balance_unchanged() {
        let ledger = BalanceLedger::new();
        ledger.create("alice", BalanceConfig::bounded(0, 100)).unwrap();
        ledger.credit("alice", 60).unwrap();

        let err = ledger.credit("alice", 41).unwrap_err();
        assert!(matches!(err, Error::BoundsViolation { current: 60, delta: 41, .. }));
        assert_eq!(ledger.get("alice").unwrap(), 60);

        assert!(ledger.debit("alice", 61).is_err());
        assert_eq!(ledger.debit("alice", 60).unwrap(), 0);
    }

    #[test]
    fn test_unknown_peer() {
        let ledger = BalanceLedger::new();
        assert_eq!(
            ledger.update("ghost", 1),
            Err(Error::PeerNotFound("ghost".to_string()))
        );
    }

    #[test]
    fn test_amount_overflow() {
        let ledger = BalanceLedger::new();
        ledger.create("alice", BalanceConfig::default()).unwrap();
        assert!(matches!(ledger.credit("alice", u64::MAX), Err(Error::Overflow(_))));
    }

    #[test]
    fn test_delete() {
        let ledger = BalanceLedger::new();
        ledger.create("alice", BalanceConfig::default()).unwrap();
        ledger.credit("alice", 7).unwrap();
        let last = ledger.delete("alice").unwrap();
        assert_eq!(last.balance, 7);
        assert!(!ledger.contains("alice"));
        assert!(ledger.delete("alice").is_none());
    }

    #[test]
    fn test_list_sorted() {
        let ledger = BalanceLedger::new();
        for peer in ["carol", "alice", "bob"] {
            ledger.create(peer, BalanceConfig::default()).unwrap();
        }
        let ids: Vec<String> = ledger.list().into_iter().map(|b| b.peer_id).collect();
        assert_eq!(ids, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_metrics_follow_updates() {
        let registry = Registry::new();
        let ledger = BalanceLedger::with_metrics(LedgerMetrics::new(&registry).unwrap());
        ledger.create("alice", BalanceConfig::bounded(0, 10)).unwrap();
        ledger.credit("alice", 4).unwrap();
        let _ = ledger.credit("alice", 100);

        let metrics = ledger.metrics.as_ref().unwrap();
        assert_eq!(metrics.balance.with_label_values(&["alice"]).get(), 4);
        assert_eq!(
            metrics
                .bound_violations_total
                .with_label_values(&["alice"])
                .get(),
            1
        );
    }

    #[test]
    fn test_concurrent_updates_respect_bounds() {
        let ledger = Arc::new(BalanceLedger::new());
        ledger.create("alice", BalanceConfig::bounded(0, 1000)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    (0..500).filter(|_| ledger.credit("alice", 1).is_ok()).count()
                })
            })
            .collect();

        let committed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(committed, 1000);
        assert_eq!(ledger.get("alice").unwrap(), 1000);
    }

    #[test]
    fn test_balance_gauge_matches_ledger_after_concurrent_updates() {
        let registry = Registry::new();
        let ledger = Arc::new(BalanceLedger::with_metrics(
            LedgerMetrics::new(&registry).unwrap(),
        ));
        ledger.create("alice", BalanceConfig::default()).unwrap();

        let handles: Vec<_> = (0..8i64)
            .map(|worker| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for i in 0..2_000i64 {
                        let delta = if (worker + i) % 2 == 0 { i } else { -i / 2 };
                        ledger.update("alice", delta).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let metrics = ledger.metrics.as_ref().unwrap();
        assert_eq!(
            metrics.balance.with_label_values(&["alice"]).get(),
            ledger.get("alice").unwrap()
        );
        assert_eq!(
            metrics.updates_total.with_label_values(&["alice"]).get(),
            16_000
        );
    }
}
