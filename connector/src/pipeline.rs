//! Rule pipeline
//!
//! A pipeline is a fixed slice of rules plus a terminal [`Endpoint`]. Each
//! rule receives the Prepare and a [`Next`] continuation; it may call
//! `next.run(..)` to continue down the chain or return early with its own
//! reply. The reply travels back up through the same rules in reverse.
//!
//! Rule arrays are built once per peer when the peer is added and shared
//! by every packet for that peer.

use crate::Result;
use async_trait::async_trait;
use packet_core::{Prepare, Reply};
use std::fmt;
use std::sync::Arc;

/// Direction of travel through a peer's rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Packet arrived from the peer
    Incoming,
    /// Packet is leaving towards the peer
    Outgoing,
}

impl Direction {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }
}

/// Terminal step of a pipeline
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Handle a Prepare that passed every rule
    async fn handle(&self, request: Prepare) -> Result<Reply>;
}

/// Rule with an incoming and an outgoing handler
///
/// Both handlers default to passing the packet through.
#[async_trait]
pub trait Rule: Send + Sync + fmt::Debug {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Handle a packet arriving from the peer
    async fn incoming(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        next.run(request).await
    }

    /// Handle a packet leaving towards the peer
    async fn outgoing(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        next.run(request).await
    }
}

/// Continuation over the remaining rules
#[derive(Clone, Copy)]
pub struct Next<'a> {
    direction: Direction,
    rules: &'a [Arc<dyn Rule>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    /// Start of a pipeline
    pub fn new(direction: Direction, rules: &'a [Arc<dyn Rule>], endpoint: &'a dyn Endpoint) -> Self {
        Self {
            direction,
            rules,
            endpoint,
        }
    }

    /// Run the remaining rules, then the endpoint
    pub async fn run(self, request: Prepare) -> Result<Reply> {
        match self.rules.split_first() {
            Some((rule, rest)) => {
                let next = Next { rules: rest, ..self };
                match self.direction {
                    Direction::Incoming => rule.incoming(request, next).await,
                    Direction::Outgoing => rule.outgoing(request, next).await,
                }
            }
            None => self.endpoint.handle(request).await,
        }
    }

    /// Skip the remaining rules and go straight to the endpoint
    pub async fn bypass(self, request: Prepare) -> Result<Reply> {
        self.endpoint.handle(request).await
    }

    /// Direction of this pipeline
    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("direction", &self.direction)
            .field(
                "remaining",
                &self.rules.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
