//! Connector orchestration
//!
//! The connector owns the peer table, the routing table, the balance ledger
//! and the alert log. Each peer entry bundles everything that lives and dies
//! with the peer: its rule arrays, token bucket, heartbeat state, CCP
//! session and transport.
//!
//! # Packet path
//!
//! ```text
//! handle_incoming(peer, prepare)
//!   └─ incoming rules of `peer`
//!        └─ route step: echo if addressed to us, else longest-prefix lookup
//!             └─ outgoing rules of the next hop
//!                  └─ transport send
//! ```
//!
//! # Lock order
//!
//! `peers` before `routing` before any per-peer lock. No lock is held across
//! an `.await`.

use crate::alerts::{Alert, AlertLog};
use crate::config::ConnectorConfig;
use crate::heartbeat::{HeartbeatListener, HeartbeatMonitor, HeartbeatState, PeerStatus};
use crate::metrics::{ConnectorMetrics, DirectionStats};
use crate::peer::{EndpointInfo, NodeAddress, PeerInfo, Relation};
use crate::pipeline::{Direction, Endpoint, Next, Rule};
use crate::protocols::{request_config, CcpRule, EchoAction, EchoController, IldcpRule};
use crate::routing::ccp::{build_update, CcpSession, LocalNode, Neighbour};
use crate::routing::{Route, RouteOrigin, RoutingTable};
use crate::rules::{
    chrono_duration, AlertRule, BalanceRule, ErrorHandlerRule, ExpireRule, HeartbeatRule,
    MaxPacketAmountRule, RateLimitRule, ReduceExpiryRule, StatsRule, ThroughputRule,
    ValidateFulfillmentRule,
};
use crate::store::{PeerRecord, PeerStore, StaticRoute};
use crate::token_bucket::TokenBucket;
use crate::transport::{HttpTransportFactory, PeerTransport, TransportFactory};
use crate::{Error, Result, DEFAULT_PEER_PROTOCOL_EXPIRY_MS};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use ledger_core::{BalanceLedger, BalanceSnapshot};
use packet_core::{Address, Prepare, Reply};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Per-peer statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStats {
    /// Peer id
    pub peer_id: String,
    /// Relation
    pub relation: Relation,
    /// Heartbeat status
    pub status: PeerStatus,
    /// Current balance
    pub balance: Option<i64>,
    /// Packets received from the peer
    pub incoming: DirectionStats,
    /// Packets sent to the peer
    pub outgoing: DirectionStats,
}

/// Snapshot returned by [`Connector::get_stats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorStats {
    /// Own address, if known
    pub ilp_address: Option<String>,
    /// Per-peer figures, ordered by peer id
    pub peers: Vec<PeerStats>,
    /// Number of routed prefixes
    pub routes: usize,
    /// Open alerts
    pub alerts: usize,
}

/// Everything owned by one peer
#[derive(Debug)]
struct PeerEntry {
    info: PeerInfo,
    endpoint: EndpointInfo,
    transport: Arc<dyn PeerTransport>,
    incoming: Vec<Arc<dyn Rule>>,
    outgoing: Vec<Arc<dyn Rule>>,
    sender: TransportEndpoint,
    liveness: Arc<Mutex<HeartbeatState>>,
    session: Arc<Mutex<CcpSession>>,
    removed: Arc<AtomicBool>,
}

impl PeerEntry {
    fn id(&self) -> &str {
        &self.info.id
    }

    /// Run the outgoing rules and send
    async fn send(&self, request: Prepare) -> Result<Reply> {
        Next::new(Direction::Outgoing, &self.outgoing, &self.sender)
            .run(request)
            .await
    }

    fn is_usable(&self) -> bool {
        !self.removed.load(Ordering::SeqCst) && !self.liveness.lock().is_down()
    }
}

#[async_trait]
impl Endpoint for PeerEntry {
    async fn handle(&self, request: Prepare) -> Result<Reply> {
        self.send(request).await
    }
}

/// Expiry for route control and update requests
fn peer_protocol_expiry() -> chrono::DateTime<Utc> {
    Utc::now() + chrono_duration(Duration::from_millis(DEFAULT_PEER_PROTOCOL_EXPIRY_MS))
}

/// Terminal step of a peer's outgoing rules
#[derive(Debug)]
struct TransportEndpoint {
    peer_id: String,
    transport: Arc<dyn PeerTransport>,
    liveness: Arc<Mutex<HeartbeatState>>,
    monitor: HeartbeatMonitor,
}

#[async_trait]
impl Endpoint for TransportEndpoint {
    async fn handle(&self, request: Prepare) -> Result<Reply> {
        match self.transport.send(request).await {
            Ok(reply) => {
                self.monitor.success(&self.peer_id, &self.liveness);
                Ok(reply)
            }
            Err(e) => {
                warn!("Failed to send to peer {}: {}", self.peer_id, e);
                self.monitor
                    .failure(&self.peer_id, &self.liveness, &e.to_string());
                Err(e.into())
            }
        }
    }
}

/// Terminal step of a peer's incoming rules
struct RouteStep<'a> {
    connector: &'a Connector,
}

#[async_trait]
impl Endpoint for RouteStep<'_> {
    async fn handle(&self, request: Prepare) -> Result<Reply> {
        self.connector.route(request).await
    }
}

/// Records liveness transitions as alerts
#[derive(Debug)]
struct AlertingListener {
    alerts: Arc<AlertLog>,
    metrics: Arc<ConnectorMetrics>,
}

impl HeartbeatListener for AlertingListener {
    fn on_failed(&self, peer_id: &str) {
        self.alerts
            .record(peer_id, None, "Peer failed heartbeat checks");
        self.metrics.record_alert(peer_id);
        self.metrics.set_peer_up(peer_id, false);
    }

    fn on_recovered(&self, peer_id: &str) {
        info!("Peer {} is reachable again", peer_id);
        self.metrics.set_peer_up(peer_id, true);
    }
}

/// Interledger connector
#[derive(Debug)]
pub struct Connector {
    config: ConnectorConfig,
    node: NodeAddress,
    peers: RwLock<HashMap<String, Arc<PeerEntry>>>,
    routing: Arc<RwLock<RoutingTable>>,
    ledger: Arc<BalanceLedger>,
    alerts: Arc<AlertLog>,
    metrics: Arc<ConnectorMetrics>,
    heartbeat: HeartbeatMonitor,
    echo: EchoController,
    transports: Arc<dyn TransportFactory>,
    store: Option<Arc<dyn PeerStore>>,
}

impl Connector {
    /// Create a connector reaching peers over ILP-over-HTTP
    pub fn new(config: ConnectorConfig) -> Result<Self> {
        Self::with_transport_factory(config, Arc::new(HttpTransportFactory))
    }

    /// Create a connector with a custom transport factory
    pub fn with_transport_factory(
        config: ConnectorConfig,
        transports: Arc<dyn TransportFactory>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(ConnectorMetrics::new()?);
        let ledger = Arc::new(BalanceLedger::with_metrics(metrics.ledger.clone()));
        let alerts = Arc::new(AlertLog::new());
        let listener = Arc::new(AlertingListener {
            alerts: alerts.clone(),
            metrics: metrics.clone(),
        });
        let heartbeat = HeartbeatMonitor::new(
            config.heartbeat.failure_threshold,
            Duration::from_millis(config.heartbeat.probe_timeout_ms),
            listener,
        );
        let echo = EchoController::new(Duration::from_millis(config.echo.min_message_window_ms));

        Ok(Self {
            node: NodeAddress::new(config.ilp_address.clone()),
            config,
            peers: RwLock::new(HashMap::new()),
            routing: Arc::new(RwLock::new(RoutingTable::new())),
            ledger,
            alerts,
            metrics,
            heartbeat,
            echo,
            transports,
            store: None,
        })
    }

    /// Persist admin changes to `store`
    pub fn with_store(mut self, store: Arc<dyn PeerStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Own address, if known
    pub fn own_address(&self) -> Option<Address> {
        self.node.get()
    }

    /// Configuration
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Ids of every peer, sorted
    pub fn peer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.peers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    // ---- Packet path ----------------------------------------------------

    /// Handle a Prepare received from `peer_id`
    ///
    /// Never fails: every error becomes a Reject.
    pub async fn handle_incoming(&self, peer_id: &str, request: Prepare) -> Reply {
        let entry = self.peers.read().get(peer_id).cloned();
        let entry = match entry {
            Some(entry) if !entry.removed.load(Ordering::SeqCst) => entry,
            _ => {
                warn!("Packet from unknown peer {}", peer_id);
                let err = Error::PeerNotFound(peer_id.to_string());
                return Reply::Reject(err.to_reject(self.node.get()));
            }
        };

        let step = RouteStep { connector: self };
        match Next::new(Direction::Incoming, &entry.incoming, &step)
            .run(request)
            .await
        {
            Ok(reply) => reply,
            Err(e) => Reply::Reject(e.to_reject(self.node.get())),
        }
    }

    async fn route(&self, request: Prepare) -> Result<Reply> {
        if self.node.is_own(&request.destination) {
            return match self.echo.handle(&request)? {
                EchoAction::Reply(reply) => Ok(reply),
                EchoAction::Respond(response) => self.forward(response).await,
            };
        }
        self.forward(request).await
    }

    /// Send a Prepare to the next hop for its destination
    pub async fn forward(&self, request: Prepare) -> Result<Reply> {
        let entry = self.resolve(&request.destination)?;
        debug!(
            "Forwarding {} to {} via {}",
            request.amount,
            request.destination,
            entry.id()
        );
        entry.send(request).await
    }

    /// Next hop for `destination`; `NoRoute` if every candidate at its longest prefix is down
    pub fn resolve_peer(&self, destination: &Address) -> Result<String> {
        self.resolve(destination).map(|entry| entry.id().to_string())
    }

    fn resolve(&self, destination: &Address) -> Result<Arc<PeerEntry>> {
        let peers = self.peers.read();
        let routing = self.routing.read();
        let next_hop = routing
            .lookup_with(destination, |peer_id| {
                peers.get(peer_id).map_or(false, |entry| entry.is_usable())
            })
            .and_then(|route| peers.get(&route.next_hop).cloned());
        next_hop.ok_or_else(|| Error::NoRoute(destination.to_string()))
    }

    // ---- Peers ------------------------------------------------------------

    /// Add a peer and persist it
    pub async fn add_peer(&self, info: PeerInfo, endpoint: EndpointInfo) -> Result<()> {
        let record = PeerRecord {
            peer: info.clone(),
            endpoint: endpoint.clone(),
        };
        self.register(info, endpoint).await?;
        if let Some(store) = &self.store {
            store.save_peer(&record).await?;
        }
        Ok(())
    }

    /// Load peers and static routes from the store
    pub async fn load_from_store(&self) -> Result<()> {
        let Some(store) = self.store.clone() else {
            return Ok(());
        };
        let records = store.load().await?;
        let count = records.len();
        for record in records {
            self.register(record.peer, record.endpoint).await?;
        }
        let routes = store.list().await?;
        for route in &routes {
            self.install_static_route(route)?;
        }
        info!(
            "Loaded {} peers and {} static routes from store",
            count,
            routes.len()
        );
        Ok(())
    }

    async fn register(&self, info: PeerInfo, endpoint: EndpointInfo) -> Result<()> {
        info.validate()?;
        let transport = self.transports.create(&info, &endpoint)?;
        let entry = Arc::new(self.build_entry(info, endpoint, transport));
        let id = entry.id().to_string();

        {
            let mut peers = self.peers.write();
            if peers.contains_key(&id) {
                return Err(Error::PeerExists(id));
            }
            self.ledger.create(&id, entry.info.rules.balance)?;
            peers.insert(id.clone(), entry.clone());
        }
        self.add_implicit_routes(&entry.info);
        info!(
            "Added {} {} ({} scale {})",
            entry.info.relation, id, entry.info.asset_code, entry.info.asset_scale
        );

        if entry.info.relation == Relation::Parent && self.node.get().is_none() {
            self.inherit_address(&entry).await;
        }
        if entry.info.receive_routes {
            self.request_routes(&entry).await;
        }
        Ok(())
    }

    fn build_entry(
        &self,
        info: PeerInfo,
        endpoint: EndpointInfo,
        transport: Arc<dyn PeerTransport>,
    ) -> PeerEntry {
        let id = info.id.clone();
        let liveness = Arc::new(Mutex::new(HeartbeatState::new()));
        let session = Arc::new(Mutex::new(CcpSession::default()));
        let removed = Arc::new(AtomicBool::new(false));

        let ccp: Arc<dyn Rule> = Arc::new(CcpRule::new(
            info.clone(),
            self.node.clone(),
            self.config.global_prefix.clone(),
            self.routing.clone(),
            session.clone(),
            removed.clone(),
        ));
        let ildcp: Arc<dyn Rule> = Arc::new(IldcpRule::new(info.clone(), self.node.clone()));
        let stats: Arc<dyn Rule> = Arc::new(StatsRule::new(&id, self.metrics.clone()));
        let throughput: Arc<dyn Rule> = Arc::new(ThroughputRule::new(&id, self.metrics.clone()));
        let reduce_expiry: Arc<dyn Rule> = Arc::new(ReduceExpiryRule::new(&self.config.expiry));
        let balance: Arc<dyn Rule> = Arc::new(BalanceRule::new(
            &id,
            self.ledger.clone(),
            self.alerts.clone(),
            self.metrics.clone(),
        ));

        let mut incoming: Vec<Arc<dyn Rule>> = vec![
            stats.clone(),
            Arc::new(HeartbeatRule::new(&id)),
            Arc::new(ErrorHandlerRule::new(&id, self.node.clone())),
        ];
        if let Some(max) = info.rules.max_packet_amount {
            incoming.push(Arc::new(MaxPacketAmountRule::new(max)));
        }
        if let Some(rate_limit) = &info.rules.rate_limit {
            let bucket = Arc::new(Mutex::new(TokenBucket::from_config(rate_limit)));
            incoming.push(Arc::new(RateLimitRule::new(&id, bucket)));
        }
        incoming.extend([
            throughput.clone(),
            reduce_expiry.clone(),
            balance.clone(),
            ildcp.clone(),
            ccp.clone(),
        ]);

        let outgoing: Vec<Arc<dyn Rule>> = vec![
            ccp,
            ildcp,
            stats,
            balance,
            throughput,
            reduce_expiry,
            Arc::new(AlertRule::new(&id, self.alerts.clone(), self.metrics.clone())),
            Arc::new(ExpireRule::new()),
            Arc::new(ValidateFulfillmentRule::new(&id)),
        ];

        let sender = TransportEndpoint {
            peer_id: id,
            transport: transport.clone(),
            liveness: liveness.clone(),
            monitor: self.heartbeat.clone(),
        };

        PeerEntry {
            info,
            endpoint,
            transport,
            incoming,
            outgoing,
            sender,
            liveness,
            session,
            removed,
        }
    }

    fn implicit_route(&self, info: &PeerInfo) -> Option<Route> {
        let prefix = match info.relation {
            Relation::Child => info.child_address(self.node.get().as_ref())?.to_string(),
            Relation::Parent => self.config.global_prefix.clone(),
            Relation::Peer => info.ilp_address.as_ref()?.to_string(),
        };
        Some(Route::new(prefix, &info.id, info.relation, RouteOrigin::Implicit))
    }

    fn add_implicit_routes(&self, info: &PeerInfo) {
        if let Some(route) = self.implicit_route(info) {
            debug!("Implicit route {} -> {}", route.prefix, route.next_hop);
            self.routing.write().set_route(route);
        }
    }

    async fn inherit_address(&self, parent: &PeerEntry) {
        let timeout = Duration::from_millis(DEFAULT_PEER_PROTOCOL_EXPIRY_MS);
        match request_config(parent, timeout).await {
            Ok(response) => {
                if self.node.get().is_some() {
                    return;
                }
                info!(
                    "Using address {} assigned by parent {}",
                    response.client_address,
                    parent.id()
                );
                self.node.set(response.client_address);
                self.refresh_child_routes();
            }
            Err(e) => warn!(
                "Could not get an address from parent {}: {}",
                parent.id(),
                e
            ),
        }
    }

    /// Re-derive child routes after the own address changed
    fn refresh_child_routes(&self) {
        let peers = self.peers.read();
        let mut routing = self.routing.write();
        for entry in peers.values() {
            if entry.info.relation == Relation::Child {
                if let Some(route) = self.implicit_route(&entry.info) {
                    routing.set_route(route);
                }
            }
        }
        if let Some(own) = self.node.get() {
            routing.touch(own.as_str());
        }
    }

    async fn request_routes(&self, entry: &PeerEntry) {
        let control = entry.session.lock().receiver.control_request();
        let expires_at = peer_protocol_expiry();
        let prepare = match control.to_prepare(expires_at) {
            Ok(prepare) => prepare,
            Err(e) => {
                error!("Could not build route control request: {}", e);
                return;
            }
        };
        match entry.send(prepare).await {
            Ok(Reply::Fulfill(_)) => {
                debug!("Peer {} accepted route control request", entry.id());
                entry.session.lock().receiver.control_acked = true;
            }
            Ok(Reply::Reject(reject)) => warn!(
                "Peer {} rejected route control request: {} {}",
                entry.id(),
                reject.code,
                reject.message
            ),
            Err(e) => warn!(
                "Route control request to {} failed: {}",
                entry.id(),
                e
            ),
        }
    }

    /// Remove a peer with its routes, balance and rule state
    pub async fn remove_peer(&self, peer_id: &str) -> Result<()> {
        let purged = {
            let mut peers = self.peers.write();
            let entry = peers
                .remove(peer_id)
                .ok_or_else(|| Error::PeerNotFound(peer_id.to_string()))?;
            entry.removed.store(true, Ordering::SeqCst);
            let purged = self.routing.write().remove_peer(peer_id);
            self.ledger.delete(peer_id);
            purged
        };
        self.metrics.remove_peer(peer_id);
        info!("Removed peer {} and {} routes", peer_id, purged.len());

        if let Some(store) = &self.store {
            store.delete_peer(peer_id).await?;
        }
        Ok(())
    }

    /// Liveness of a peer
    pub fn peer_status(&self, peer_id: &str) -> Result<PeerStatus> {
        self.peers
            .read()
            .get(peer_id)
            .map(|entry| entry.liveness.lock().status())
            .ok_or_else(|| Error::PeerNotFound(peer_id.to_string()))
    }

    /// Stored record of a peer
    pub fn peer_record(&self, peer_id: &str) -> Result<PeerRecord> {
        self.peers
            .read()
            .get(peer_id)
            .map(|entry| PeerRecord {
                peer: entry.info.clone(),
                endpoint: entry.endpoint.clone(),
            })
            .ok_or_else(|| Error::PeerNotFound(peer_id.to_string()))
    }

    // ---- Balances ---------------------------------------------------------

    /// Balance of a peer
    pub fn get_balance(&self, peer_id: &str) -> Result<BalanceSnapshot> {
        Ok(self.ledger.snapshot(peer_id)?)
    }

    /// Administrative adjustment, bounds-checked like any other update
    pub fn update_balance(&self, peer_id: &str, delta: i64) -> Result<i64> {
        let balance = self.ledger.update(peer_id, delta)?;
        info!(
            "Balance of {} adjusted by {} to {}",
            peer_id, delta, balance
        );
        Ok(balance)
    }

    /// Every balance, ordered by peer id
    pub fn list_balances(&self) -> Vec<BalanceSnapshot> {
        self.ledger.list()
    }

    // ---- Stats and alerts -------------------------------------------------

    /// Per-peer statistics
    pub fn get_stats(&self) -> ConnectorStats {
        let mut peers: Vec<PeerStats> = self
            .peers
            .read()
            .values()
            .map(|entry| PeerStats {
                peer_id: entry.info.id.clone(),
                relation: entry.info.relation,
                status: entry.liveness.lock().status(),
                balance: self.ledger.get(&entry.info.id).ok(),
                incoming: self
                    .metrics
                    .direction_stats(&entry.info.id, Direction::Incoming),
                outgoing: self
                    .metrics
                    .direction_stats(&entry.info.id, Direction::Outgoing),
            })
            .collect();
        peers.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));

        ConnectorStats {
            ilp_address: self.node.get().map(String::from),
            peers,
            routes: self.routing.read().len(),
            alerts: self.alerts.list().len(),
        }
    }

    /// Open alerts
    pub fn get_alerts(&self) -> Vec<Alert> {
        self.alerts.list()
    }

    /// Dismiss an alert; false if unknown
    pub fn dismiss_alert(&self, id: u64) -> bool {
        self.alerts.dismiss(id)
    }

    /// Prometheus text exposition
    pub fn metrics_text(&self) -> Result<String> {
        Ok(self.metrics.render()?)
    }

    // ---- Routes -----------------------------------------------------------

    /// Add a static route and persist it
    pub async fn add_route(&self, prefix: &str, peer_id: &str) -> Result<()> {
        let route = StaticRoute {
            prefix: prefix.to_string(),
            peer_id: peer_id.to_string(),
        };
        self.install_static_route(&route)?;
        if let Some(store) = &self.store {
            store.save_route(&route).await?;
        }
        Ok(())
    }

    fn install_static_route(&self, route: &StaticRoute) -> Result<()> {
        if !Address::is_valid_prefix(&route.prefix) {
            return Err(Error::Config(format!(
                "invalid route prefix {:?}",
                route.prefix
            )));
        }
        let peers = self.peers.read();
        let entry = peers
            .get(&route.peer_id)
            .ok_or_else(|| Error::PeerNotFound(route.peer_id.clone()))?;
        self.routing.write().set_route(Route::new(
            &route.prefix,
            &route.peer_id,
            entry.info.relation,
            RouteOrigin::Static,
        ));
        info!("Static route {} -> {}", route.prefix, route.peer_id);
        Ok(())
    }

    /// Remove every route for a prefix; false if there was none
    pub async fn remove_route(&self, prefix: &str) -> Result<bool> {
        let removed = self.routing.write().remove_route(prefix, None);
        if removed {
            info!("Removed routes for {}", prefix);
        }
        if let Some(store) = &self.store {
            store.delete_route(prefix).await?;
        }
        Ok(removed)
    }

    /// Every route candidate
    pub fn list_routes(&self) -> Vec<Route> {
        self.routing.read().routes()
    }

    // ---- Background tasks -------------------------------------------------

    /// Probe every peer once
    pub async fn probe_peers(&self) {
        let entries: Vec<Arc<PeerEntry>> = self.peers.read().values().cloned().collect();
        let probes = entries.iter().map(|entry| async move {
            let up = self
                .heartbeat
                .probe(entry.id(), entry.transport.as_ref(), &entry.liveness)
                .await;
            self.metrics.set_peer_up(entry.id(), up);
        });
        join_all(probes).await;
    }

    /// Send due route updates, and retry unanswered control requests
    pub async fn broadcast_routes(&self) {
        let Some(own) = self.node.get() else {
            debug!("Skipping route broadcast, own address unknown");
            return;
        };
        let entries: Vec<Arc<PeerEntry>> = self.peers.read().values().cloned().collect();
        let rounds = entries.iter().map(|entry| {
            let own = own.clone();
            async move {
                let acked = entry.session.lock().receiver.control_acked;
                if entry.info.receive_routes && !acked {
                    self.request_routes(entry).await;
                }
                if entry.info.send_routes {
                    self.send_update(entry, &own).await;
                }
            }
        });
        join_all(rounds).await;
    }

    async fn send_update(&self, entry: &PeerEntry, own: &Address) {
        let update = {
            let routing = self.routing.read();
            let session = entry.session.lock();
            let child_address = entry.info.child_address(Some(own));
            let to = Neighbour {
                id: &entry.info.id,
                relation: entry.info.relation,
                address: child_address.as_ref(),
            };
            let local = LocalNode {
                address: own,
                global_prefix: &self.config.global_prefix,
            };
            build_update(
                &routing,
                &session.sender,
                to,
                local,
                self.config.routing.hold_down_ms,
            )
        };
        let Some(update) = update else {
            return;
        };

        let expires_at = peer_protocol_expiry();
        let prepare = match update.to_prepare(expires_at) {
            Ok(prepare) => prepare,
            Err(e) => {
                error!("Could not build route update: {}", e);
                return;
            }
        };
        debug!(
            "Sending routes to {}: epochs {}..{}, {} new, {} withdrawn",
            entry.id(),
            update.from_epoch_index,
            update.to_epoch_index,
            update.new_routes.len(),
            update.withdrawn_routes.len()
        );

        match entry.send(prepare).await {
            Ok(Reply::Fulfill(_)) => entry
                .session
                .lock()
                .sender
                .acknowledged(update.to_epoch_index),
            Ok(Reply::Reject(reject)) => {
                warn!(
                    "Peer {} rejected route update: {} {}",
                    entry.id(),
                    reject.code,
                    reject.message
                );
                entry.session.lock().sender.rejected();
            }
            Err(e) => {
                warn!("Route update to {} failed: {}", entry.id(), e);
                entry.session.lock().sender.rejected();
            }
        }
    }

    /// Start the heartbeat and route broadcast loops
    ///
    /// The loops stop when `shutdown` flips to true.
    pub fn spawn_background(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if self.config.heartbeat.enabled {
            let connector = self.clone();
            let mut shutdown = shutdown.clone();
            let period = Duration::from_millis(self.config.heartbeat.interval_ms);
            handles.push(tokio::spawn(async move {
                // Spread probes of nodes started together
                let jitter = rand::thread_rng().gen_range(0..=period.as_millis() as u64 / 10);
                let mut ticker = tokio::time::interval_at(
                    tokio::time::Instant::now() + Duration::from_millis(jitter),
                    period,
                );
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                info!("Heartbeat loop started, every {:?}", period);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => connector.probe_peers().await,
                        _ = shutdown.changed() => break,
                    }
                }
                info!("Heartbeat loop stopped");
            }));
        }

        if self.config.routing.broadcast_enabled {
            let connector = self.clone();
            let mut shutdown = shutdown;
            let period = Duration::from_millis(self.config.routing.broadcast_interval_ms);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                info!("Route broadcast loop started, every {:?}", period);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => connector.broadcast_routes().await,
                        _ = shutdown.changed() => break,
                    }
                }
                info!("Route broadcast loop stopped");
            }));
        }

        handles
    }
}
