//! CCP endpoints: route control and route updates from a peer

use crate::peer::{NodeAddress, PeerInfo};
use crate::pipeline::{Next, Rule};
use crate::routing::ccp::{CcpSession, LocalNode, Neighbour};
use crate::routing::RoutingTable;
use crate::{Error, Result};
use async_trait::async_trait;
use packet_core::ccp::{
    RouteControlRequest, RouteUpdateRequest, CCP_CONTROL_DESTINATION, CCP_UPDATE_DESTINATION,
};
use packet_core::{Fulfill, Prepare, Reply, PEER_PROTOCOL_FULFILLMENT};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Terminates `peer.route.*` Prepares from one peer
#[derive(Debug)]
pub struct CcpRule {
    peer: PeerInfo,
    node: NodeAddress,
    global_prefix: String,
    routing: Arc<RwLock<RoutingTable>>,
    session: Arc<Mutex<CcpSession>>,
    removed: Arc<AtomicBool>,
}

fn is_ccp(request: &Prepare) -> bool {
    let destination = request.destination.as_str();
    destination == CCP_CONTROL_DESTINATION || destination == CCP_UPDATE_DESTINATION
}

fn ack() -> Reply {
    Reply::Fulfill(Fulfill::new(PEER_PROTOCOL_FULFILLMENT))
}

impl CcpRule {
    /// Create new rule
    pub fn new(
        peer: PeerInfo,
        node: NodeAddress,
        global_prefix: impl Into<String>,
        routing: Arc<RwLock<RoutingTable>>,
        session: Arc<Mutex<CcpSession>>,
        removed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            peer,
            node,
            global_prefix: global_prefix.into(),
            routing,
            session,
            removed,
        }
    }

    fn handle_control(&self, request: &Prepare) -> Result<Reply> {
        if !self.peer.send_routes {
            return Err(Error::Protocol(format!(
                "routes are not sent to {}",
                self.peer.id
            )));
        }
        let control = RouteControlRequest::decode(&request.data)?;
        let routing = self.routing.read();
        let mut session = self.session.lock();
        session.sender.handle_control(&control, &routing);
        debug!(
            "Peer {} requested {:?} from epoch {}",
            self.peer.id, control.mode, session.sender.last_known_epoch
        );
        Ok(ack())
    }

    fn handle_update(&self, request: &Prepare) -> Result<Reply> {
        if !self.peer.receive_routes {
            return Err(Error::Protocol(format!(
                "routes from {} are not accepted",
                self.peer.id
            )));
        }
        let update = RouteUpdateRequest::decode(&request.data)?;
        let own = self
            .node
            .get()
            .ok_or_else(|| Error::Protocol("node address is not known yet".into()))?;
        let child_address = self.peer.child_address(Some(&own));
        let from = Neighbour {
            id: &self.peer.id,
            relation: self.peer.relation,
            address: child_address.as_ref(),
        };
        let local = LocalNode {
            address: &own,
            global_prefix: &self.global_prefix,
        };

        let mut routing = self.routing.write();
        // Checked under the routing lock so a concurrent removal purges after us
        if self.removed.load(Ordering::SeqCst) {
            return Err(Error::PeerNotFound(self.peer.id.clone()));
        }
        let applied = self
            .session
            .lock()
            .receiver
            .handle_update(&update, &mut routing, from, local)?;
        drop(routing);

        if applied.stale {
            debug!(
                "Ignoring stale route update from {} (to epoch {})",
                self.peer.id, update.to_epoch_index
            );
        } else {
            info!(
                "Route update from {}: epochs {}..{}, {} added, {} withdrawn, {} refused",
                self.peer.id,
                update.from_epoch_index,
                update.to_epoch_index,
                applied.added,
                applied.withdrawn,
                applied.refused.len()
            );
        }
        Ok(ack())
    }
}

#[async_trait]
impl Rule for CcpRule {
    fn name(&self) -> &'static str {
        "ccp"
    }

    async fn incoming(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        match request.destination.as_str() {
            CCP_CONTROL_DESTINATION => self.handle_control(&request),
            CCP_UPDATE_DESTINATION => self.handle_update(&request),
            _ => next.run(request).await,
        }
    }

    async fn outgoing(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        if is_ccp(&request) {
            return next.bypass(request).await;
        }
        next.run(request).await
    }
}
