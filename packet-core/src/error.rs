//! Error types for packet encoding and validation

use thiserror::Error;

/// Result type for packet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Packet errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Buffer ended before a complete value was read
    #[error("Unexpected end of buffer: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        /// Bytes required by the field being read
        needed: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// Unknown packet type byte
    #[error("Unknown packet type: {0}")]
    UnknownPacketType(u8),

    /// Structurally invalid packet
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Malformed ILP address
    #[error("Invalid ILP address: {0}")]
    InvalidAddress(String),

    /// Malformed timestamp
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Malformed peer protocol payload (ILDCP, CCP, Echo)
    #[error("Invalid {protocol} payload: {reason}")]
    InvalidPayload {
        /// Protocol name
        protocol: &'static str,
        /// What was wrong
        reason: String,
    },

    /// Trailing bytes after a complete value
    #[error("Trailing bytes after packet: {0}")]
    TrailingBytes(usize),
}

impl Error {
    pub(crate) fn payload(protocol: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidPayload {
            protocol,
            reason: reason.into(),
        }
    }
}
