//! Answers heartbeat probes from peers

use crate::pipeline::{Next, Rule};
use crate::{Result, HEARTBEAT_DESTINATION};
use async_trait::async_trait;
use packet_core::{Fulfill, Prepare, Reply, PEER_PROTOCOL_FULFILLMENT};
use tracing::trace;

/// Fulfills `peer.heartbeat` Prepares; everything else passes through
#[derive(Debug)]
pub struct HeartbeatRule {
    peer_id: String,
}

impl HeartbeatRule {
    /// Create new rule
    pub fn new(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
        }
    }
}

#[async_trait]
impl Rule for HeartbeatRule {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    async fn incoming(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        if request.destination.as_str() == HEARTBEAT_DESTINATION {
            trace!("Heartbeat from peer {}", self.peer_id);
            return Ok(Reply::Fulfill(Fulfill::new(PEER_PROTOCOL_FULFILLMENT)));
        }
        next.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{prepare, run, FixedEndpoint};
    use crate::pipeline::Direction;
    use packet_core::Address;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_answers_probe_without_forwarding() {
        let endpoint = FixedEndpoint::fulfill();
        let mut probe = prepare(0);
        probe.destination = Address::new(HEARTBEAT_DESTINATION).unwrap();

        let reply = run(Arc::new(HeartbeatRule::new("bob")), Direction::Incoming, probe, &endpoint)
            .await
            .unwrap();
        assert!(reply.is_fulfill());
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_other_packets_pass() {
        let endpoint = FixedEndpoint::fulfill();
        run(Arc::new(HeartbeatRule::new("bob")), Direction::Incoming, prepare(5), &endpoint)
            .await
            .unwrap();
        assert_eq!(endpoint.calls(), 1);
    }
}
