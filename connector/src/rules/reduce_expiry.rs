//! Expiry window enforcement
//!
//! Incoming: the packet must have at least the minimum incoming window left.
//! The forwarded expiry becomes
//! `min(expires_at - min_outgoing_window, now + max_hold_window)`.
//!
//! Outgoing: the expiry is capped at `now + max_hold_window`.

use super::chrono_duration;
use crate::config::ExpiryConfig;
use crate::pipeline::{Next, Rule};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use packet_core::{Prepare, Reply};

/// Reduces expiries so this node never holds a packet past its deadline
#[derive(Debug)]
pub struct ReduceExpiryRule {
    min_incoming_window: chrono::Duration,
    min_outgoing_window: chrono::Duration,
    max_hold_window: chrono::Duration,
}

impl ReduceExpiryRule {
    /// Create new rule
    pub fn new(config: &ExpiryConfig) -> Self {
        Self {
            min_incoming_window: chrono_duration(config.min_incoming_window()),
            min_outgoing_window: chrono_duration(config.min_outgoing_window()),
            max_hold_window: chrono_duration(config.max_hold_window()),
        }
    }
}

#[async_trait]
impl Rule for ReduceExpiryRule {
    fn name(&self) -> &'static str {
        "reduce-expiry"
    }

    async fn incoming(&self, mut request: Prepare, next: Next<'_>) -> Result<Reply> {
        let now = Utc::now();
        if request.is_expired_at(now) {
            return Err(Error::Expired(format!(
                "packet expired at {}",
                request.expires_at
            )));
        }
        let window = request.expires_at - now;
        if window < self.min_incoming_window {
            return Err(Error::InsufficientTimeout(format!(
                "{}ms left, need {}ms",
                window.num_milliseconds(),
                self.min_incoming_window.num_milliseconds()
            )));
        }

        let reduced = std::cmp::min(
            request.expires_at - self.min_outgoing_window,
            now + self.max_hold_window,
        );
        if reduced <= now {
            return Err(Error::InsufficientTimeout(
                "no time left to forward the packet".into(),
            ));
        }
        request.expires_at = reduced;
        next.run(request).await
    }

    async fn outgoing(&self, mut request: Prepare, next: Next<'_>) -> Result<Reply> {
        let cap = Utc::now() + self.max_hold_window;
        if request.expires_at > cap {
            request.expires_at = cap;
        }
        next.run(request).await
    }
}
