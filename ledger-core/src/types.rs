//! Balance types

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Per-peer balance bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    /// Lowest permitted balance
    pub minimum: i64,
    /// Highest permitted balance
    pub maximum: i64,
    /// Starting balance
    pub initial: i64,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            minimum: i64::MIN,
            maximum: i64::MAX,
            initial: 0,
        }
    }
}

impl BalanceConfig {
    /// Create bounded config starting at zero
    pub fn bounded(minimum: i64, maximum: i64) -> Self {
        Self {
            minimum,
            maximum,
            initial: 0,
        }
    }

    /// Validate bounds
    pub fn validate(&self) -> Result<()> {
        if self.minimum > self.maximum {
            return Err(Error::Config(format!(
                "minimum {} exceeds maximum {}",
                self.minimum, self.maximum
            )));
        }
        if self.initial < self.minimum || self.initial > self.maximum {
            return Err(Error::Config(format!(
                "initial balance {} outside [{}, {}]",
                self.initial, self.minimum, self.maximum
            )));
        }
        Ok(())
    }
}

/// Live balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    /// Current value
    pub current: i64,
    /// Bounds
    pub config: BalanceConfig,
}

impl Balance {
    /// Create new balance at the configured initial value
    pub fn new(config: BalanceConfig) -> Self {
        Self {
            current: config.initial,
            config,
        }
    }

    /// Value after applying `delta`, if it stays in bounds
    pub fn checked_apply(&self, delta: i64) -> Option<i64> {
        self.current
            .checked_add(delta)
            .filter(|next| *next >= self.config.minimum && *next <= self.config.maximum)
    }
}

/// Serializable view of a peer balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// Peer
    pub peer_id: String,
    /// Current value
    pub balance: i64,
    /// Lower bound
    pub minimum: i64,
    /// Upper bound
    pub maximum: i64,
}
