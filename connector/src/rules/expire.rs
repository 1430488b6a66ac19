//! Local timeout for outgoing packets

use crate::pipeline::{Next, Rule};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use packet_core::{Prepare, Reply};
use tracing::debug;

/// Stops waiting for a reply once the Prepare expires
///
/// Only the waiting task is cancelled; other packets to the same peer are
/// unaffected.
#[derive(Debug, Default)]
pub struct ExpireRule;

impl ExpireRule {
    /// Create new rule
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Rule for ExpireRule {
    fn name(&self) -> &'static str {
        "expire"
    }

    async fn outgoing(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        let expires_at = request.expires_at;
        let remaining = match (expires_at - Utc::now()).to_std() {
            Ok(remaining) if !remaining.is_zero() => remaining,
            _ => {
                return Err(Error::Expired(format!(
                    "packet to {} expired before it was sent",
                    request.destination
                )))
            }
        };

        let destination = request.destination.clone();
        match tokio::time::timeout(remaining, next.run(request)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("Packet to {} expired at {}", destination, expires_at);
                Err(Error::Expired(format!(
                    "no reply from {} before {}",
                    destination, expires_at
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{prepare, run, FixedEndpoint};
    use crate::pipeline::{Direction, Endpoint};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug)]
    struct Silent;

    #[async_trait]
    impl Endpoint for Silent {
        async fn handle(&self, _request: Prepare) -> Result<Reply> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(Error::Other("unreachable".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_at_expiry() {
        let rules: [Arc<dyn Rule>; 1] = [Arc::new(ExpireRule::new())];
        let result = Next::new(Direction::Outgoing, &rules, &Silent)
            .run(prepare(1))
            .await;
        assert!(matches!(result, Err(Error::Expired(_))));
    }

    #[tokio::test]
    async fn test_already_expired() {
        let endpoint = FixedEndpoint::fulfill();
        let mut request = prepare(1);
        request.expires_at = Utc::now() - chrono::Duration::seconds(1);
        let result = run(Arc::new(ExpireRule::new()), Direction::Outgoing, request, &endpoint).await;
        assert!(matches!(result, Err(Error::Expired(_))));
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_reply_in_time() {
        let endpoint = FixedEndpoint::fulfill();
        let reply = run(Arc::new(ExpireRule::new()), Direction::Outgoing, prepare(1), &endpoint)
            .await
            .unwrap();
        assert!(reply.is_fulfill());
    }
}
