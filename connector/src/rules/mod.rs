//! Per-peer rules
//!
//! # Order
//!
//! ```text
//! incoming: stats → heartbeat → error-handler → max-packet-amount → rate-limit
//!           → throughput → reduce-expiry → balance → ildcp → ccp → (route)
//! outgoing: ccp → ildcp → stats → balance → throughput → reduce-expiry
//!           → alert → expire → validate-fulfillment → (transport)
//! ```
//!
//! Balance sits behind rate limiting and amount checks so a refused packet
//! never reaches accounting. On the way out, fulfillment validation is the
//! innermost rule, so balance only sees Fulfills that were checked.

pub mod alert;
pub mod balance;
pub mod error_handler;
pub mod expire;
pub mod heartbeat;
pub mod max_packet_amount;
pub mod rate_limit;
pub mod reduce_expiry;
pub mod stats;
pub mod throughput;
pub mod validate_fulfillment;

pub use alert::AlertRule;
pub use balance::BalanceRule;
pub use error_handler::ErrorHandlerRule;
pub use expire::ExpireRule;
pub use heartbeat::HeartbeatRule;
pub use max_packet_amount::MaxPacketAmountRule;
pub use rate_limit::RateLimitRule;
pub use reduce_expiry::ReduceExpiryRule;
pub use stats::StatsRule;
pub use throughput::ThroughputRule;
pub use validate_fulfillment::ValidateFulfillmentRule;

use std::time::Duration;

/// Convert a std duration for timestamp arithmetic, saturating
pub(crate) fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(duration.as_millis().min(i64::MAX as u128) as i64)
}
