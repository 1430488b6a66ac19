//! Interledger Packet Core
//!
//! Wire types shared by every component of the connector.
//!
//! # Contents
//!
//! - **Addresses**: validated, segment-aware ILP addresses and route prefixes
//! - **Packets**: Prepare / Fulfill / Reject with their OER encoding
//! - **Error codes**: the stable reject taxonomy shared with other implementations
//! - **Conditions**: SHA-256 execution conditions and fulfillments
//! - **Peer protocols**: ILDCP, CCP and Echo payloads carried inside packets
//!
//! # Invariants
//!
//! - A Fulfill is only valid when `SHA-256(fulfillment) == execution_condition`
//! - Encoding is canonical: decode(encode(p)) == p for every well-formed packet
//! - Amounts are unsigned 64-bit integers, never floats

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod address;
pub mod ccp;
pub mod condition;
pub mod echo;
pub mod error;
pub mod error_code;
pub mod ildcp;
pub mod oer;
pub mod packet;

// Re-exports
pub use address::Address;
pub use condition::{
    fulfillment_matches, hash_fulfillment, PEER_PROTOCOL_CONDITION, PEER_PROTOCOL_FULFILLMENT,
};
pub use error::{Error, Result};
pub use error_code::ErrorCode;
pub use packet::{Fulfill, Packet, PacketType, Prepare, Reject, Reply};
