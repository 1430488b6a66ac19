//! Execution conditions and fulfillments
//!
//! A condition is the SHA-256 digest of a 32-byte fulfillment preimage.

use sha2::{Digest, Sha256};

/// Fulfillment used by peer-protocol packets (ILDCP, CCP, heartbeat)
pub const PEER_PROTOCOL_FULFILLMENT: [u8; 32] = [0u8; 32];

/// SHA-256 of [`PEER_PROTOCOL_FULFILLMENT`]
pub const PEER_PROTOCOL_CONDITION: [u8; 32] = [
    0x66, 0x68, 0x7a, 0xad, 0xf8, 0x62, 0xbd, 0x77, 0x6c, 0x8f, 0xc1, 0x8b, 0x8e, 0x9f, 0x8e,
    0x20, 0x08, 0x97, 0x14, 0x85, 0x6e, 0xe2, 0x33, 0xb3, 0x90, 0x2a, 0x59, 0x1d, 0x0d, 0x5f,
    0x29, 0x25,
];

/// Compute the condition for a fulfillment
pub fn hash_fulfillment(fulfillment: &[u8; 32]) -> [u8; 32] {
    Sha256::digest(fulfillment).into()
}

/// Whether `fulfillment` is the preimage of `condition`
pub fn fulfillment_matches(fulfillment: &[u8; 32], condition: &[u8; 32]) -> bool {
    hash_fulfillment(fulfillment) == *condition
}
