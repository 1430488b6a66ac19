//! Converts failures of later rules into Rejects
//!
//! Errors and panics below this rule become a well-formed Reject attributed
//! to this node. Internal errors are logged with their detail and reported
//! to the peer as `T00` without it.

use crate::peer::NodeAddress;
use crate::pipeline::{Next, Rule};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::FutureExt;
use packet_core::{ErrorCode, Prepare, Reply};
use std::panic::AssertUnwindSafe;
use tracing::{debug, error};

/// Error-to-Reject conversion
#[derive(Debug)]
pub struct ErrorHandlerRule {
    peer_id: String,
    node: NodeAddress,
}

impl ErrorHandlerRule {
    /// Create new rule
    pub fn new(peer_id: impl Into<String>, node: NodeAddress) -> Self {
        Self {
            peer_id: peer_id.into(),
            node,
        }
    }
}

#[async_trait]
impl Rule for ErrorHandlerRule {
    fn name(&self) -> &'static str {
        "error-handler"
    }

    async fn incoming(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        let destination = request.destination.clone();
        let err = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
            Ok(Ok(reply)) => return Ok(reply),
            Ok(Err(e)) => e,
            Err(_) => Error::Other("rule panicked".into()),
        };

        let code = err.reject_code();
        if code == ErrorCode::T00_INTERNAL_ERROR {
            error!(
                "Internal error on packet from {} to {}: {}",
                self.peer_id, destination, err
            );
        } else {
            debug!(
                "Rejecting packet from {} to {} with {}: {}",
                self.peer_id, destination, code, err
            );
        }
        Ok(Reply::Reject(err.to_reject(self.node.get())))
    }
}
