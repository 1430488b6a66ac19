//! ILDCP: address handout to children and address discovery from parents

use crate::peer::{NodeAddress, PeerInfo, Relation};
use crate::pipeline::{Endpoint, Next, Rule};
use crate::rules::chrono_duration;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use packet_core::ildcp::{self, IldcpResponse};
use packet_core::{Prepare, Reply};
use std::time::Duration;
use tracing::{debug, info};

/// Serves `peer.config` to a child; outgoing requests skip the other rules
#[derive(Debug)]
pub struct IldcpRule {
    peer: PeerInfo,
    node: NodeAddress,
}

impl IldcpRule {
    /// Create new rule
    pub fn new(peer: PeerInfo, node: NodeAddress) -> Self {
        Self { peer, node }
    }

    fn serve(&self) -> Result<Reply> {
        if self.peer.relation != Relation::Child {
            return Err(Error::Protocol(format!(
                "ILDCP is only served to children, {} is a {}",
                self.peer.id, self.peer.relation
            )));
        }
        let own = self.node.get();
        let client_address = self
            .peer
            .child_address(own.as_ref())
            .ok_or_else(|| Error::Other("node address is not known yet".into()))?;

        info!(
            "Assigning address {} to child {}",
            client_address, self.peer.id
        );
        let response = IldcpResponse {
            client_address,
            asset_scale: self.peer.asset_scale,
            asset_code: self.peer.asset_code.clone(),
        };
        Ok(Reply::Fulfill(response.to_fulfill()))
    }
}

#[async_trait]
impl Rule for IldcpRule {
    fn name(&self) -> &'static str {
        "ildcp"
    }

    async fn incoming(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        if ildcp::is_request(&request) {
            return self.serve();
        }
        next.run(request).await
    }

    async fn outgoing(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        if ildcp::is_request(&request) {
            return next.bypass(request).await;
        }
        next.run(request).await
    }
}

/// Ask a parent for our address through its outgoing pipeline
pub async fn request_config(parent: &dyn Endpoint, timeout: Duration) -> Result<IldcpResponse> {
    let request = ildcp::request(Utc::now() + chrono_duration(timeout))?;
    match parent.handle(request).await? {
        Reply::Fulfill(fulfill) => {
            let response = IldcpResponse::try_from(&fulfill)?;
            debug!(
                "ILDCP response: address {} asset {} scale {}",
                response.client_address, response.asset_code, response.asset_scale
            );
            Ok(response)
        }
        Reply::Reject(reject) => Err(Error::Protocol(format!(
            "ILDCP request rejected with {}: {}",
            reject.code, reject.message
        ))),
    }
}
