//! Error types for the ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No balance is tracked for the peer
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// A balance is already tracked for the peer
    #[error("Peer already exists: {0}")]
    PeerExists(String),

    /// Update would leave the balance outside its bounds
    #[error(
        "Balance bound violation for {peer_id}: {current} + {delta} outside [{minimum}, {maximum}]"
    )]
    BoundsViolation {
        /// Peer
        peer_id: String,
        /// Balance before the update
        current: i64,
        /// Attempted change
        delta: i64,
        /// Lower bound
        minimum: i64,
        /// Upper bound
        maximum: i64,
    },

    /// Amount does not fit a signed 64-bit balance
    #[error("Amount overflow: {0}")]
    Overflow(String),

    /// Invalid balance configuration
    #[error("Configuration error: {0}")]
    Config(String),
}
