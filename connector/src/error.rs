//! Error types for the connector
//!
//! Every error maps to a stable ILP error code so it can be returned to a
//! peer as a Reject.

use crate::transport::TransportError;
use bytes::Bytes;
use packet_core::{oer::Writer, Address, ErrorCode, Reject};
use thiserror::Error;

/// Result type for connector operations
pub type Result<T> = std::result::Result<T, Error>;

/// Connector errors
#[derive(Error, Debug)]
pub enum Error {
    /// No route matches the destination
    #[error("No route to {0}")]
    NoRoute(String),

    /// Peer is not configured
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Peer id already in use
    #[error("Peer already exists: {0}")]
    PeerExists(String),

    /// Token bucket exhausted
    #[error("Rate limit exceeded for peer {0}")]
    RateLimited(String),

    /// Amount above the peer's maximum packet amount
    #[error("Packet amount {amount} exceeds maximum {max}")]
    AmountTooLarge {
        /// Received amount
        amount: u64,
        /// Configured maximum
        max: u64,
    },

    /// Not enough time left to forward the packet
    #[error("Insufficient timeout: {0}")]
    InsufficientTimeout(String),

    /// Packet expired before a reply arrived
    #[error("Packet expired: {0}")]
    Expired(String),

    /// Fulfillment does not hash to the condition
    #[error("Fulfillment does not match condition: {0}")]
    WrongCondition(String),

    /// Balance ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_core::Error),

    /// Packet codec error
    #[error("Packet error: {0}")]
    Packet(#[from] packet_core::Error),

    /// Outbound transport failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Peer protocol misuse (ILDCP, CCP, Echo)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Peer store error
    #[error("Store error: {0}")]
    Store(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// ILP error code reported to peers
    pub fn reject_code(&self) -> ErrorCode {
        match self {
            Error::NoRoute(_) => ErrorCode::F02_UNREACHABLE,
            Error::PeerNotFound(_) | Error::PeerExists(_) | Error::Protocol(_) => {
                ErrorCode::F00_BAD_REQUEST
            }
            Error::RateLimited(_) => ErrorCode::T05_RATE_LIMITED,
            Error::AmountTooLarge { .. } => ErrorCode::F08_AMOUNT_TOO_LARGE,
            Error::InsufficientTimeout(_) => ErrorCode::R02_INSUFFICIENT_TIMEOUT,
            Error::Expired(_) => ErrorCode::R00_TRANSFER_TIMED_OUT,
            Error::WrongCondition(_) => ErrorCode::F05_WRONG_CONDITION,
            Error::Ledger(ledger_core::Error::BoundsViolation { .. }) => {
                ErrorCode::T04_INSUFFICIENT_LIQUIDITY
            }
            Error::Packet(_) => ErrorCode::F01_INVALID_PACKET,
            Error::Transport(_) => ErrorCode::T01_PEER_UNREACHABLE,
            _ => ErrorCode::T00_INTERNAL_ERROR,
        }
    }

    /// Convert into a Reject attributed to `triggered_by`
    pub fn to_reject(&self, triggered_by: Option<Address>) -> Reject {
        let code = self.reject_code();
        // Internal details stay in the logs
        let message = match code {
            ErrorCode::T00_INTERNAL_ERROR => "Internal error".to_string(),
            _ => self.to_string(),
        };
        let reject = Reject::new(code, message, triggered_by);
        match self {
            Error::AmountTooLarge { amount, max } => {
                let mut data = Writer::with_capacity(16);
                data.write_u64(*amount);
                data.write_u64(*max);
                reject.with_data(data.finalize())
            }
            _ => reject.with_data(Bytes::new()),
        }
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
