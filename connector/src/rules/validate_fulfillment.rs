//! Fulfillment check on replies from the next hop

use crate::pipeline::{Next, Rule};
use crate::{Error, Result};
use async_trait::async_trait;
use packet_core::{Prepare, Reply};
use tracing::warn;

/// Refuses Fulfills whose preimage does not hash to the condition (`F05`)
#[derive(Debug)]
pub struct ValidateFulfillmentRule {
    peer_id: String,
}

impl ValidateFulfillmentRule {
    /// Create new rule
    pub fn new(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
        }
    }
}

#[async_trait]
impl Rule for ValidateFulfillmentRule {
    fn name(&self) -> &'static str {
        "validate-fulfillment"
    }

    async fn outgoing(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        let condition = request.execution_condition;
        let reply = next.run(request).await?;
        if let Reply::Fulfill(fulfill) = &reply {
            if !fulfill.matches(&condition) {
                warn!(
                    "Peer {} returned a fulfillment that does not match condition {}",
                    self.peer_id,
                    hex::encode(condition)
                );
                return Err(Error::WrongCondition(format!(
                    "fulfillment from {} does not hash to the condition",
                    self.peer_id
                )));
            }
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{prepare, run, FixedEndpoint};
    use crate::pipeline::Direction;
    use packet_core::Fulfill;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_zero_preimage_accepted() {
        let reply = run(
            Arc::new(ValidateFulfillmentRule::new("bob")),
            Direction::Outgoing,
            prepare(1),
            &FixedEndpoint::fulfill(),
        )
        .await
        .unwrap();
        assert!(reply.is_fulfill());
    }

    #[tokio::test]
    async fn test_other_preimage_rejected() {
        let endpoint = FixedEndpoint::with(Ok(Reply::Fulfill(Fulfill::new([7u8; 32]))));
        let result = run(
            Arc::new(ValidateFulfillmentRule::new("bob")),
            Direction::Outgoing,
            prepare(1),
            &endpoint,
        )
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.reject_code().as_str(), "F05");
    }
}
