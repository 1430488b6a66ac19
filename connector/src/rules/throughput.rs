//! Volume counters

use crate::metrics::ConnectorMetrics;
use crate::pipeline::{Direction, Next, Rule};
use crate::Result;
use async_trait::async_trait;
use packet_core::{Prepare, Reply};
use std::sync::Arc;

/// Adds prepared and fulfilled amounts to the peer's counters
#[derive(Debug)]
pub struct ThroughputRule {
    peer_id: String,
    metrics: Arc<ConnectorMetrics>,
}

impl ThroughputRule {
    /// Create new rule
    pub fn new(peer_id: impl Into<String>, metrics: Arc<ConnectorMetrics>) -> Self {
        Self {
            peer_id: peer_id.into(),
            metrics,
        }
    }

    async fn measure(&self, direction: Direction, request: Prepare, next: Next<'_>) -> Result<Reply> {
        let amount = request.amount;
        self.metrics
            .record_prepared_amount(&self.peer_id, direction, amount);
        let result = next.run(request).await;
        if let Ok(Reply::Fulfill(_)) = &result {
            self.metrics
                .record_fulfilled_amount(&self.peer_id, direction, amount);
        }
        result
    }
}

#[async_trait]
impl Rule for ThroughputRule {
    fn name(&self) -> &'static str {
        "throughput"
    }

    async fn incoming(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        self.measure(Direction::Incoming, request, next).await
    }

    async fn outgoing(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        self.measure(Direction::Outgoing, request, next).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{prepare, run, FixedEndpoint};
    use packet_core::{ErrorCode, Reject};

    #[tokio::test]
    async fn test_only_fulfilled_volume_counts_as_fulfilled() {
        let metrics = Arc::new(ConnectorMetrics::new().unwrap());
        let rule: Arc<dyn Rule> = Arc::new(ThroughputRule::new("bob", metrics.clone()));

        run(rule.clone(), Direction::Outgoing, prepare(40), &FixedEndpoint::fulfill())
            .await
            .unwrap();
        let rejecting = FixedEndpoint::with(Ok(Reply::Reject(Reject::new(
            ErrorCode::T04_INSUFFICIENT_LIQUIDITY,
            "no",
            None,
        ))));
        run(rule, Direction::Outgoing, prepare(60), &rejecting)
            .await
            .unwrap();

        let stats = metrics.direction_stats("bob", Direction::Outgoing);
        assert_eq!(stats.amount_prepared, 100);
        assert_eq!(stats.amount_fulfilled, 40);
    }
}
