//! # Interledger Connector
//!
//! Packet-switching core of an Interledger node:
//! - Longest-prefix routing with route exchange (CCP)
//! - Per-peer rule pipelines (rate limit, expiry, balance, validation)
//! - Address negotiation (ILDCP) and echo diagnostics
//! - Peer liveness via heartbeat probes
//!
//! ## Architecture
//!
//! ```text
//!   peer A ──Prepare──► incoming rules (A) ──► route lookup ──► outgoing rules (B) ──► transport ──► peer B
//!          ◄──Reply──── incoming rules (A) ◄──────────────────── outgoing rules (B) ◄────────────
//! ```
//!
//! Every peer owns its rule arrays, token bucket, balance and heartbeat
//! state. They are created together in [`Connector::add_peer`] and torn down
//! together in [`Connector::remove_peer`].

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod alerts;
pub mod config;
pub mod connector;
pub mod error;
pub mod heartbeat;
pub mod metrics;
pub mod peer;
pub mod pipeline;
pub mod protocols;
pub mod routing;
pub mod rules;
pub mod store;
pub mod token_bucket;
pub mod transport;

pub use alerts::{Alert, AlertLog};
pub use config::ConnectorConfig;
pub use connector::Connector;
pub use error::{Error, Result};
pub use heartbeat::PeerStatus;
pub use peer::{EndpointInfo, PeerInfo, Relation, RulesConfig};
pub use store::{InMemoryPeerStore, PeerRecord, PeerStore, StaticRoute, TomlPeerStore};
pub use token_bucket::TokenBucket;
pub use transport::{HttpTransport, PeerTransport, TransportError, TransportFactory};

/// Default minimum expiry window (ms); half is reserved on each side of the node
pub const DEFAULT_MIN_EXPIRATION_WINDOW_MS: u64 = 2_000;

/// Default maximum time a forwarded packet may be held (ms)
pub const DEFAULT_MAX_HOLD_WINDOW_MS: u64 = 30_000;

/// Default heartbeat probe interval (ms)
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5 * 60 * 1_000;

/// Default consecutive failed probes before a peer is marked down
pub const DEFAULT_HEARTBEAT_FAILURE_THRESHOLD: u32 = 3;

/// Default heartbeat probe timeout (ms)
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;

/// Default route broadcast interval (ms)
pub const DEFAULT_ROUTE_BROADCAST_INTERVAL_MS: u64 = 30_000;

/// Default CCP hold-down time (ms)
pub const DEFAULT_ROUTE_HOLD_DOWN_MS: u32 = 45_000;

/// Default echo minimum message window (ms)
pub const DEFAULT_MIN_MESSAGE_WINDOW_MS: u64 = 1_500;

/// Default expiry of ILDCP and CCP requests (ms)
pub const DEFAULT_PEER_PROTOCOL_EXPIRY_MS: u64 = 30_000;

/// Default outbound HTTP timeout (ms)
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;

/// Default global address prefix
pub const DEFAULT_GLOBAL_PREFIX: &str = "test";

/// Destination answered by the heartbeat rule
pub const HEARTBEAT_DESTINATION: &str = "peer.heartbeat";
