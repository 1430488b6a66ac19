//! Token bucket admission

use crate::pipeline::{Next, Rule};
use crate::token_bucket::TokenBucket;
use crate::{Error, Result};
use async_trait::async_trait;
use packet_core::{Prepare, Reply};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Takes one token per incoming Prepare; `T05` when the bucket is empty
#[derive(Debug)]
pub struct RateLimitRule {
    peer_id: String,
    bucket: Arc<Mutex<TokenBucket>>,
}

impl RateLimitRule {
    /// Create new rule over the peer's bucket
    pub fn new(peer_id: impl Into<String>, bucket: Arc<Mutex<TokenBucket>>) -> Self {
        Self {
            peer_id: peer_id.into(),
            bucket,
        }
    }
}

#[async_trait]
impl Rule for RateLimitRule {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    async fn incoming(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        let admitted = self.bucket.lock().take(1);
        if !admitted {
            debug!("Rate limit exceeded for peer {}", self.peer_id);
            return Err(Error::RateLimited(self.peer_id.clone()));
        }
        next.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{prepare, run, FixedEndpoint};
    use crate::pipeline::Direction;
    use std::time::Duration;

    #[tokio::test]
    async fn test_bucket_exhaustion() {
        let bucket = Arc::new(Mutex::new(TokenBucket::new(
            Duration::from_secs(3600),
            2,
            None,
        )));
        let rule: Arc<dyn Rule> = Arc::new(RateLimitRule::new("alice", bucket));

        for _ in 0..2 {
            let endpoint = FixedEndpoint::fulfill();
            assert!(run(rule.clone(), Direction::Incoming, prepare(1), &endpoint)
                .await
                .is_ok());
        }
        let endpoint = FixedEndpoint::fulfill();
        let result = run(rule, Direction::Incoming, prepare(1), &endpoint).await;
        assert!(matches!(result, Err(Error::RateLimited(_))));
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_outgoing_not_limited() {
        let bucket = Arc::new(Mutex::new(TokenBucket::new(
            Duration::from_secs(3600),
            0,
            None,
        )));
        let rule: Arc<dyn Rule> = Arc::new(RateLimitRule::new("alice", bucket));
        let endpoint = FixedEndpoint::fulfill();
        assert!(run(rule, Direction::Outgoing, prepare(1), &endpoint)
            .await
            .is_ok());
    }
}
