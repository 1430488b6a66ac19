//! Peer Balance Ledger
//!
//! Tracks one signed balance per peer, bounded by a configured minimum and
//! maximum. The connector's balance rule is the only routine writer;
//! operators may adjust a balance through the same bounds-checked path.
//!
//! # Invariants
//!
//! - `minimum <= current <= maximum` for every peer at all times
//! - A rejected update leaves the balance unchanged
//! - Updates for one peer are atomic with respect to each other

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod error;
pub mod ledger;
pub mod metrics;
pub mod types;

// Re-exports
pub use error::{Error, Result};
pub use ledger::BalanceLedger;
pub use metrics::LedgerMetrics;
pub use types::{Balance, BalanceConfig, BalanceSnapshot};
