//! In-process network for wiring connectors together
//!
//! Every node is registered under a name. A peer's `EndpointInfo::url` is
//! the name of the node it lives on and `auth_token` is the peer id the
//! sending connector is known by at that node.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use connector::config::ConnectorConfig;
use connector::{
    Connector, EndpointInfo, PeerInfo, PeerTransport, Relation, TransportError, TransportFactory,
};
use packet_core::{hash_fulfillment, Address, Fulfill, Prepare, Reply};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Preimage fulfilled by [`Receiver`]s
pub const PREIMAGE: [u8; 32] = [7u8; 32];

/// Something reachable on the network
#[derive(Debug, Clone)]
enum Node {
    Connector(Weak<Connector>),
    Receiver(Arc<Receiver>),
}

/// End receiver fulfilling every Prepare with a fixed preimage
#[derive(Debug)]
pub struct Receiver {
    fulfillment: [u8; 32],
    delay: Option<Duration>,
    /// Only destinations under this prefix are delayed
    slow_prefix: Option<String>,
    received: Mutex<Vec<Prepare>>,
}

impl Receiver {
    /// Fulfills with [`PREIMAGE`]
    pub fn new() -> Arc<Self> {
        Self::with_fulfillment(PREIMAGE)
    }

    /// Fulfills with `fulfillment`
    pub fn with_fulfillment(fulfillment: [u8; 32]) -> Arc<Self> {
        Arc::new(Self {
            fulfillment,
            delay: None,
            slow_prefix: None,
            received: Mutex::new(Vec::new()),
        })
    }

    /// Waits `delay` before replying
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fulfillment: PREIMAGE,
            delay: Some(delay),
            slow_prefix: None,
            received: Mutex::new(Vec::new()),
        })
    }

    /// Waits `delay` before replying to destinations under `prefix` only
    pub fn slow_for(prefix: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fulfillment: PREIMAGE,
            delay: Some(delay),
            slow_prefix: Some(prefix.to_string()),
            received: Mutex::new(Vec::new()),
        })
    }

    /// Prepares received so far
    pub fn received(&self) -> Vec<Prepare> {
        self.received.lock().clone()
    }

    async fn handle(&self, request: Prepare) -> Reply {
        let delayed = self.slow_prefix.as_deref().map_or(true, |prefix| {
            request.destination.as_str().starts_with(prefix)
        });
        self.received.lock().push(request);
        if let Some(delay) = self.delay.filter(|_| delayed) {
            tokio::time::sleep(delay).await;
        }
        Reply::Fulfill(Fulfill::new(self.fulfillment))
    }
}

/// Registry of named nodes
#[derive(Debug, Default)]
pub struct Network {
    nodes: RwLock<HashMap<String, Node>>,
}

impl Network {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a connector with heartbeat and broadcast loops left to the test
    pub fn connector(self: &Arc<Self>, name: &str, address: Option<&str>) -> Arc<Connector> {
        let config = ConnectorConfig {
            ilp_address: address.map(|a| Address::new(a).unwrap()),
            ..ConnectorConfig::default()
        };
        self.connector_with(name, config)
    }

    pub fn connector_with(self: &Arc<Self>, name: &str, config: ConnectorConfig) -> Arc<Connector> {
        let factory = Arc::new(LoopbackFactory {
            network: self.clone(),
        });
        let connector = Arc::new(Connector::with_transport_factory(config, factory).unwrap());
        self.nodes.write().insert(
            name.to_string(),
            Node::Connector(Arc::downgrade(&connector)),
        );
        connector
    }

    pub fn receiver(&self, name: &str, receiver: Arc<Receiver>) {
        self.nodes
            .write()
            .insert(name.to_string(), Node::Receiver(receiver));
    }

    /// Take a node off the network
    pub fn disconnect(&self, name: &str) -> bool {
        self.nodes.write().remove(name).is_some()
    }

    pub fn reconnect(&self, name: &str, connector: &Arc<Connector>) {
        self.nodes.write().insert(
            name.to_string(),
            Node::Connector(Arc::downgrade(connector)),
        );
    }

    fn node(&self, name: &str) -> Option<Node> {
        self.nodes.read().get(name).cloned()
    }
}

#[derive(Debug)]
struct LoopbackFactory {
    network: Arc<Network>,
}

impl TransportFactory for LoopbackFactory {
    fn create(
        &self,
        _peer: &PeerInfo,
        endpoint: &EndpointInfo,
    ) -> connector::Result<Arc<dyn PeerTransport>> {
        Ok(Arc::new(LoopbackTransport {
            network: self.network.clone(),
            target: endpoint.url.clone(),
            as_peer: endpoint.auth_token.clone().unwrap_or_default(),
        }))
    }
}

#[derive(Debug)]
struct LoopbackTransport {
    network: Arc<Network>,
    target: String,
    as_peer: String,
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn send(&self, request: Prepare) -> Result<Reply, TransportError> {
        match self.network.node(&self.target) {
            Some(Node::Connector(weak)) => match weak.upgrade() {
                Some(connector) => Ok(connector.handle_incoming(&self.as_peer, request).await),
                None => Err(TransportError::Closed(self.target.clone())),
            },
            Some(Node::Receiver(receiver)) => Ok(receiver.handle(request).await),
            None => Err(TransportError::Connection(format!(
                "{} is not reachable",
                self.target
            ))),
        }
    }
}

/// Endpoint of peer `on_node`, sending as `as_peer`
pub fn endpoint(on_node: &str, as_peer: &str) -> EndpointInfo {
    EndpointInfo::new(on_node).with_auth_token(as_peer)
}

/// Peer that neither sends nor receives routes
pub fn quiet_peer(id: &str, relation: Relation) -> PeerInfo {
    let mut info = PeerInfo::new(id, relation);
    info.send_routes = false;
    info.receive_routes = false;
    info
}

/// Link two connectors as `Relation::Peer`s exchanging routes
///
/// `a` adds `b` first, so `b`'s initial route request reaches a node that
/// already knows it.
pub async fn link_peers(a: (&str, &Connector), b: (&str, &Connector)) {
    a.1.add_peer(PeerInfo::new(b.0, Relation::Peer), endpoint(b.0, a.0))
        .await
        .unwrap();
    b.1.add_peer(PeerInfo::new(a.0, Relation::Peer), endpoint(a.0, b.0))
        .await
        .unwrap();
}

/// Link a parent and a child connector; the child learns its address over ILDCP
pub async fn link_parent_child(parent: (&str, &Connector), child: (&str, &Connector)) {
    parent
        .1
        .add_peer(
            PeerInfo::new(child.0, Relation::Child),
            endpoint(child.0, parent.0),
        )
        .await
        .unwrap();
    child
        .1
        .add_peer(
            PeerInfo::new(parent.0, Relation::Parent),
            endpoint(parent.0, child.0),
        )
        .await
        .unwrap();
}

/// Prepare payable with [`PREIMAGE`]
pub fn payment(destination: &str, amount: u64) -> Prepare {
    Prepare {
        destination: Address::new(destination).unwrap(),
        amount,
        expires_at: Utc::now() + chrono::Duration::seconds(30),
        execution_condition: hash_fulfillment(&PREIMAGE),
        data: bytes::Bytes::new(),
    }
}

pub fn balance(connector: &Connector, peer_id: &str) -> i64 {
    connector.get_balance(peer_id).unwrap().balance
}
