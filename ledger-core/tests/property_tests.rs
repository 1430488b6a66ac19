//! Property-based tests for ledger invariants
//!
//! - Bounds: minimum <= current <= maximum after any sequence of updates
//! - Rejected updates leave the balance unchanged
//! - Committed updates sum to the final balance

use ledger_core::{BalanceConfig, BalanceLedger, Error};
use proptest::prelude::*;

/// Strategy for generating valid bounds around zero
fn bounds_strategy() -> impl Strategy<Value = BalanceConfig> {
    (-1_000_000i64..=0, 0i64..=1_000_000).prop_map(|(minimum, maximum)| BalanceConfig {
        minimum,
        maximum,
        initial: 0,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: the balance never leaves its bounds
    #[test]
    fn prop_bounds_hold(
        config in bounds_strategy(),
        deltas in prop::collection::vec(-500_000i64..500_000, 1..100),
    ) {
        let ledger = BalanceLedger::new();
        ledger.create("peer", config).unwrap();

        for delta in deltas {
            let before = ledger.get("peer").unwrap();
            match ledger.update("peer", delta) {
                Ok(after) => prop_assert_eq!(after, before + delta),
                Err(Error::BoundsViolation { current, .. }) => {
                    prop_assert_eq!(current, before);
                    prop_assert_eq!(ledger.get("peer").unwrap(), before);
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
            let now = ledger.get("peer").unwrap();
            prop_assert!(now >= config.minimum && now <= config.maximum);
        }
    }

    /// Property: the final balance is the sum of committed deltas
    #[test]
    fn prop_committed_deltas_sum(
        config in bounds_strategy(),
        deltas in prop::collection::vec(-10_000i64..10_000, 1..200),
    ) {
        let ledger = BalanceLedger::new();
        ledger.create("peer", config).unwrap();

        let committed: i64 = deltas
            .iter()
            .filter(|delta| ledger.update("peer", **delta).is_ok())
            .sum();
        prop_assert_eq!(ledger.get("peer").unwrap(), committed);
    }

    /// Property: a credit followed by an equal debit restores the balance
    #[test]
    fn prop_credit_then_debit_restores(amount in 0u64..1_000_000) {
        let ledger = BalanceLedger::new();
        ledger.create("peer", BalanceConfig::default()).unwrap();
        ledger.credit("peer", amount).unwrap();
        prop_assert_eq!(ledger.debit("peer", amount).unwrap(), 0);
    }
}
