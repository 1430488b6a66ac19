//! Peer configuration

use crate::{Error, Result, DEFAULT_HTTP_TIMEOUT_MS};
use ledger_core::BalanceConfig;
use packet_core::Address;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Business relationship with a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    /// Upstream provider; source of our address and default route
    Parent,
    /// Lateral peer
    Peer,
    /// Downstream customer; addressed under our address
    Child,
}

impl Relation {
    /// Route preference on ties; higher wins
    pub fn priority(&self) -> u8 {
        match self {
            Relation::Child => 3,
            Relation::Peer => 2,
            Relation::Parent => 1,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Relation::Parent => "parent",
            Relation::Peer => "peer",
            Relation::Child => "child",
        };
        write!(f, "{}", s)
    }
}

/// Rate limit settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Refill period (ms)
    pub refill_period_ms: u64,
    /// Tokens added per period
    pub refill_count: u64,
    /// Bucket capacity; defaults to `refill_count`
    pub capacity: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            refill_period_ms: 1_000,
            refill_count: 10_000,
            capacity: None,
        }
    }
}

/// Per-peer rule settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Balance bounds
    pub balance: BalanceConfig,
    /// Token bucket; no limit when absent
    pub rate_limit: Option<RateLimitConfig>,
    /// Largest accepted packet amount; no limit when absent
    pub max_packet_amount: Option<u64>,
}

/// Peer record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Unique id; also the address segment assigned to children
    pub id: String,
    /// Relation
    pub relation: Relation,
    /// Asset code of the relationship
    #[serde(default = "default_asset_code")]
    pub asset_code: String,
    /// Asset scale of the relationship
    #[serde(default)]
    pub asset_scale: u8,
    /// Explicit address; for children it overrides `<own>.<id>`
    #[serde(default)]
    pub ilp_address: Option<Address>,
    /// Advertise our routes to this peer
    #[serde(default = "enabled")]
    pub send_routes: bool,
    /// Accept routes advertised by this peer
    #[serde(default = "enabled")]
    pub receive_routes: bool,
    /// Rules
    #[serde(default)]
    pub rules: RulesConfig,
}

fn default_asset_code() -> String {
    "USD".to_string()
}

fn enabled() -> bool {
    true
}

impl PeerInfo {
    /// Create peer with default rules
    pub fn new(id: impl Into<String>, relation: Relation) -> Self {
        Self {
            id: id.into(),
            relation,
            asset_code: default_asset_code(),
            asset_scale: 9,
            ilp_address: None,
            send_routes: true,
            receive_routes: true,
            rules: RulesConfig::default(),
        }
    }

    /// Check the record before the peer is created
    pub fn validate(&self) -> Result<()> {
        let valid_id = !self.id.is_empty()
            && self
                .id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'~' | b'-'));
        if !valid_id {
            return Err(Error::Config(format!(
                "peer id {:?} is not a valid address segment",
                self.id
            )));
        }
        self.rules.balance.validate()?;
        if let Some(rate_limit) = &self.rules.rate_limit {
            if rate_limit.refill_period_ms == 0 {
                return Err(Error::Config(format!(
                    "peer {}: refill period must be positive",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Address assigned to this peer when it is our child
    pub fn child_address(&self, own: Option<&Address>) -> Option<Address> {
        if self.relation != Relation::Child {
            return None;
        }
        self.ilp_address
            .clone()
            .or_else(|| own.and_then(|own| own.with_suffix(&self.id).ok()))
    }
}

/// How to reach a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// ILP-over-HTTP URL
    pub url: String,
    /// Bearer token presented to the peer
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Request timeout (ms)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_HTTP_TIMEOUT_MS
}

impl EndpointInfo {
    /// Create endpoint with default timeout
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
        }
    }

    /// Set bearer token
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// The node's own address, shared by every component that needs it
#[derive(Debug, Clone, Default)]
pub struct NodeAddress(Arc<RwLock<Option<Address>>>);

impl NodeAddress {
    /// Create with an optional configured address
    pub fn new(address: Option<Address>) -> Self {
        Self(Arc::new(RwLock::new(address)))
    }

    /// Current address, if known
    pub fn get(&self) -> Option<Address> {
        self.0.read().clone()
    }

    /// Replace the address
    pub fn set(&self, address: Address) {
        *self.0.write() = Some(address);
    }

    /// Whether `address` is the node itself
    pub fn is_own(&self, address: &Address) -> bool {
        self.0.read().as_ref() == Some(address)
    }
}
