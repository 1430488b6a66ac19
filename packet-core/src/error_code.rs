//! Reject error codes
//!
//! Three-character codes from the ILP error taxonomy. The first character
//! is the class: `F` final, `T` temporary, `R` relative. These strings are
//! part of the wire contract and must never be renamed.

use crate::{Error, Result};
use std::fmt;

/// ILP error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode([u8; 3]);

/// Error class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retrying the same packet will not help
    Final,
    /// Retrying later may succeed
    Temporary,
    /// Depends on the relation between sender and receiver (amounts, timing)
    Relative,
}

impl ErrorCode {
    /// Bad request
    pub const F00_BAD_REQUEST: ErrorCode = ErrorCode(*b"F00");
    /// Invalid packet
    pub const F01_INVALID_PACKET: ErrorCode = ErrorCode(*b"F01");
    /// No route to the destination
    pub const F02_UNREACHABLE: ErrorCode = ErrorCode(*b"F02");
    /// Invalid amount
    pub const F03_INVALID_AMOUNT: ErrorCode = ErrorCode(*b"F03");
    /// Fulfillment does not match the execution condition
    pub const F05_WRONG_CONDITION: ErrorCode = ErrorCode(*b"F05");
    /// Unexpected payment
    pub const F06_UNEXPECTED_PAYMENT: ErrorCode = ErrorCode(*b"F06");
    /// Amount exceeds the peer's maximum packet amount
    pub const F08_AMOUNT_TOO_LARGE: ErrorCode = ErrorCode(*b"F08");
    /// Application error
    pub const F99_APPLICATION_ERROR: ErrorCode = ErrorCode(*b"F99");
    /// Internal error
    pub const T00_INTERNAL_ERROR: ErrorCode = ErrorCode(*b"T00");
    /// Next-hop peer unreachable
    pub const T01_PEER_UNREACHABLE: ErrorCode = ErrorCode(*b"T01");
    /// Peer busy
    pub const T02_PEER_BUSY: ErrorCode = ErrorCode(*b"T02");
    /// Connector busy
    pub const T03_CONNECTOR_BUSY: ErrorCode = ErrorCode(*b"T03");
    /// Insufficient liquidity, including balance bound violations
    pub const T04_INSUFFICIENT_LIQUIDITY: ErrorCode = ErrorCode(*b"T04");
    /// Rate limited
    pub const T05_RATE_LIMITED: ErrorCode = ErrorCode(*b"T05");
    /// Application error (temporary)
    pub const T99_APPLICATION_ERROR: ErrorCode = ErrorCode(*b"T99");
    /// Packet expired before a reply arrived
    pub const R00_TRANSFER_TIMED_OUT: ErrorCode = ErrorCode(*b"R00");
    /// Insufficient source amount
    pub const R01_INSUFFICIENT_SOURCE_AMOUNT: ErrorCode = ErrorCode(*b"R01");
    /// Not enough time left to forward the packet
    pub const R02_INSUFFICIENT_TIMEOUT: ErrorCode = ErrorCode(*b"R02");
    /// Application error (relative)
    pub const R99_APPLICATION_ERROR: ErrorCode = ErrorCode(*b"R99");

    /// Build from raw bytes; must be one of F/T/R followed by two digits
    pub fn from_bytes(bytes: [u8; 3]) -> Result<Self> {
        let valid = matches!(bytes[0], b'F' | b'T' | b'R')
            && bytes[1].is_ascii_digit()
            && bytes[2].is_ascii_digit();
        if !valid {
            return Err(Error::InvalidPacket(format!(
                "invalid error code: {:?}",
                String::from_utf8_lossy(&bytes)
            )));
        }
        Ok(Self(bytes))
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }

    /// Code as string
    pub fn as_str(&self) -> &str {
        // Constructors only admit ASCII
        std::str::from_utf8(&self.0).unwrap_or("T00")
    }

    /// Error class
    pub fn class(&self) -> ErrorClass {
        match self.0[0] {
            b'F' => ErrorClass::Final,
            b'R' => ErrorClass::Relative,
            _ => ErrorClass::Temporary,
        }
    }

    /// Standard name for the code
    pub fn name(&self) -> &'static str {
        match &self.0 {
            b"F00" => "Bad Request",
            b"F01" => "Invalid Packet",
            b"F02" => "Unreachable",
            b"F03" => "Invalid Amount",
            b"F04" => "Insufficient Destination Amount",
            b"F05" => "Wrong Condition",
            b"F06" => "Unexpected Payment",
            b"F07" => "Cannot Receive",
            b"F08" => "Amount Too Large",
            b"F99" => "Application Error",
            b"T00" => "Internal Error",
            b"T01" => "Peer Unreachable",
            b"T02" => "Peer Busy",
            b"T03" => "Connector Busy",
            b"T04" => "Insufficient Liquidity",
            b"T05" => "Rate Limited",
            b"T99" => "Application Error",
            b"R00" => "Transfer Timed Out",
            b"R01" => "Insufficient Source Amount",
            b"R02" => "Insufficient Timeout",
            b"R99" => "Application Error",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ErrorCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes: [u8; 3] = s
            .as_bytes()
            .try_into()
            .map_err(|_| Error::InvalidPacket(format!("invalid error code: {:?}", s)))?;
        ErrorCode::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ErrorCode::F02_UNREACHABLE.as_str(), "F02");
        assert_eq!(ErrorCode::T05_RATE_LIMITED.as_str(), "T05");
        assert_eq!(ErrorCode::F08_AMOUNT_TOO_LARGE.as_str(), "F08");
        assert_eq!(ErrorCode::R02_INSUFFICIENT_TIMEOUT.as_str(), "R02");
        assert_eq!(ErrorCode::R00_TRANSFER_TIMED_OUT.as_str(), "R00");
        assert_eq!(ErrorCode::F05_WRONG_CONDITION.as_str(), "F05");
        assert_eq!(ErrorCode::T04_INSUFFICIENT_LIQUIDITY.as_str(), "T04");
        assert_eq!(ErrorCode::T00_INTERNAL_ERROR.as_str(), "T00");
    }

    #[test]
    fn test_class() {
        assert_eq!(ErrorCode::F02_UNREACHABLE.class(), ErrorClass::Final);
        assert_eq!(ErrorCode::T05_RATE_LIMITED.class(), ErrorClass::Temporary);
        assert_eq!(ErrorCode::R00_TRANSFER_TIMED_OUT.class(), ErrorClass::Relative);
    }

    #[test]
    fn test_parse() {
        assert_eq!("T01".parse::<ErrorCode>().unwrap(), ErrorCode::T01_PEER_UNREACHABLE);
        assert!("X01".parse::<ErrorCode>().is_err());
        assert!("F0".parse::<ErrorCode>().is_err());
    }
}
