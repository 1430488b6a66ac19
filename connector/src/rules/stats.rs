//! Packet outcome counters

use crate::metrics::{ConnectorMetrics, PacketResult};
use crate::pipeline::{Direction, Next, Rule};
use crate::Result;
use async_trait::async_trait;
use packet_core::{Prepare, Reply};
use std::sync::Arc;

/// Counts Prepares and their outcome per peer and direction
#[derive(Debug)]
pub struct StatsRule {
    peer_id: String,
    metrics: Arc<ConnectorMetrics>,
}

impl StatsRule {
    /// Create new rule
    pub fn new(peer_id: impl Into<String>, metrics: Arc<ConnectorMetrics>) -> Self {
        Self {
            peer_id: peer_id.into(),
            metrics,
        }
    }

    async fn count(&self, direction: Direction, request: Prepare, next: Next<'_>) -> Result<Reply> {
        self.metrics
            .record_packet(&self.peer_id, direction, PacketResult::Prepared);
        let result = next.run(request).await;
        let outcome = match &result {
            Ok(Reply::Fulfill(_)) => PacketResult::Fulfilled,
            Ok(Reply::Reject(_)) => PacketResult::Rejected,
            Err(_) => PacketResult::Failed,
        };
        self.metrics.record_packet(&self.peer_id, direction, outcome);
        result
    }
}

#[async_trait]
impl Rule for StatsRule {
    fn name(&self) -> &'static str {
        "stats"
    }

    async fn incoming(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        self.count(Direction::Incoming, request, next).await
    }

    async fn outgoing(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        self.count(Direction::Outgoing, request, next).await
    }
}
