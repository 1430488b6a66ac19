//! Route exchange state
//!
//! Each peer has a [`CcpSession`] with two halves:
//!
//! - the sender half tracks what the peer asked for (mode) and the last
//!   epoch of our table it acknowledged;
//! - the receiver half tracks the peer's table id and the epoch we applied.
//!
//! A sender with `last_known_epoch == 0` gets a full table; otherwise only
//! prefixes changed since that epoch are sent. A rejected update resets the
//! sender to a full sync.

use super::table::{Route, RouteOrigin, RoutingTable};
use crate::peer::Relation;
use crate::{Error, Result};
use packet_core::address::is_covered_by;
use packet_core::ccp::{CcpRoute, Mode, RouteControlRequest, RouteUpdateRequest};
use packet_core::Address;
use tracing::{debug, warn};
use uuid::Uuid;

/// Sender half of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderState {
    /// Mode requested by the peer
    pub mode: Mode,
    /// Last epoch of our table the peer acknowledged
    pub last_known_epoch: u32,
}

impl Default for SenderState {
    fn default() -> Self {
        Self {
            mode: Mode::Idle,
            last_known_epoch: 0,
        }
    }
}

/// Receiver half of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverState {
    /// Table id of the peer's last update
    pub routing_table_id: Option<Uuid>,
    /// Epoch of the peer's table we have applied
    pub epoch: u32,
    /// Whether the peer accepted our last control request
    pub control_acked: bool,
}

/// Per-peer CCP session
#[derive(Debug, Clone, Default)]
pub struct CcpSession {
    /// Our routes towards the peer
    pub sender: SenderState,
    /// The peer's routes towards us
    pub receiver: ReceiverState,
}

/// The node applying or building an update
#[derive(Debug, Clone, Copy)]
pub struct LocalNode<'a> {
    /// Own address
    pub address: &'a Address,
    /// Prefix every route must fall under
    pub global_prefix: &'a str,
}

/// The other end of a session
#[derive(Debug, Clone, Copy)]
pub struct Neighbour<'a> {
    /// Peer id
    pub id: &'a str,
    /// Relation
    pub relation: Relation,
    /// Address assigned to the peer, for children
    pub address: Option<&'a Address>,
}

/// Result of applying an update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedUpdate {
    /// Routes added or refreshed
    pub added: usize,
    /// Routes withdrawn
    pub withdrawn: usize,
    /// Prefixes refused with the reason
    pub refused: Vec<(String, &'static str)>,
    /// The update was older than what we already applied
    pub stale: bool,
}

impl SenderState {
    /// Apply a control request from the peer
    pub fn handle_control(&mut self, request: &RouteControlRequest, table: &RoutingTable) {
        self.mode = request.mode;
        self.last_known_epoch = if request.last_known_routing_table_id == table.id()
            && request.last_known_epoch <= table.epoch()
        {
            request.last_known_epoch
        } else {
            0
        };
    }

    /// The peer fulfilled an update up to `to_epoch`
    pub fn acknowledged(&mut self, to_epoch: u32) {
        self.last_known_epoch = to_epoch;
    }

    /// The peer rejected an update; start over with a full table
    pub fn rejected(&mut self) {
        self.last_known_epoch = 0;
    }
}

impl ReceiverState {
    /// Control request asking the peer for updates from where we left off
    pub fn control_request(&self) -> RouteControlRequest {
        RouteControlRequest {
            mode: Mode::Sync,
            last_known_routing_table_id: self.routing_table_id.unwrap_or_else(Uuid::nil),
            last_known_epoch: self.epoch,
            features: Vec::new(),
        }
    }

    /// Apply an update from `from` to the table
    ///
    /// A new table id or a full sync (starting at epoch 0) replaces the routes
    /// previously learned from the peer. A gap between our epoch and the
    /// update's start is an error so the peer resets to a full sync.
    pub fn handle_update(
        &mut self,
        update: &RouteUpdateRequest,
        table: &mut RoutingTable,
        from: Neighbour<'_>,
        local: LocalNode<'_>,
    ) -> Result<AppliedUpdate> {
        if self.routing_table_id != Some(update.routing_table_id) {
            let purged = table.remove_peer_routes(from.id, RouteOrigin::Ccp);
            if !purged.is_empty() {
                debug!(
                    "Peer {} switched routing table, purged {} routes",
                    from.id,
                    purged.len()
                );
            }
            self.routing_table_id = Some(update.routing_table_id);
            self.epoch = 0;
        }

        if update.from_epoch_index > self.epoch {
            return Err(Error::Protocol(format!(
                "gap in route updates from {}: have epoch {}, update starts at {}",
                from.id, self.epoch, update.from_epoch_index
            )));
        }
        if update.to_epoch_index <= self.epoch {
            return Ok(AppliedUpdate {
                stale: true,
                ..AppliedUpdate::default()
            });
        }

        if update.from_epoch_index == 0 {
            table.remove_peer_routes(from.id, RouteOrigin::Ccp);
        }
        let applied = table.apply_ccp_update(from, update, local);
        self.epoch = update.to_epoch_index;
        Ok(applied)
    }
}

impl RoutingTable {
    /// Merge routes advertised by `from`
    ///
    /// Refused: paths through this node, prefixes outside the global prefix,
    /// prefixes under our own address (unless a child advertises inside its
    /// own address) and child prefixes outside the child's address. Routes
    /// configured locally for the same peer are kept.
    pub fn apply_ccp_update(
        &mut self,
        from: Neighbour<'_>,
        update: &RouteUpdateRequest,
        local: LocalNode<'_>,
    ) -> AppliedUpdate {
        let mut applied = AppliedUpdate::default();

        for advertised in &update.new_routes {
            let prefix = advertised.prefix.as_str();
            if let Some(reason) = refuse_reason(advertised, from, local) {
                warn!(
                    "Refusing route {} from peer {}: {}",
                    prefix, from.id, reason
                );
                applied.refused.push((prefix.to_string(), reason));
                continue;
            }
            if self
                .candidate(prefix, from.id)
                .map_or(false, |existing| existing.origin != RouteOrigin::Ccp)
            {
                continue;
            }
            let mut route = Route::new(prefix, from.id, from.relation, RouteOrigin::Ccp)
                .with_path(advertised.path.clone());
            route.auth = advertised.auth;
            self.set_route(route);
            applied.added += 1;
        }

        for prefix in &update.withdrawn_routes {
            let learned = self
                .candidate(prefix, from.id)
                .map_or(false, |existing| existing.origin == RouteOrigin::Ccp);
            if learned && self.remove_route(prefix, Some(from.id)) {
                applied.withdrawn += 1;
            }
        }

        applied
    }
}

fn refuse_reason(
    route: &CcpRoute,
    from: Neighbour<'_>,
    local: LocalNode<'_>,
) -> Option<&'static str> {
    let prefix = route.prefix.as_str();
    if route.path.iter().any(|hop| hop == local.address.as_str()) {
        return Some("path contains this node");
    }
    if !is_covered_by(prefix, local.global_prefix) {
        return Some("outside the global prefix");
    }
    if from.relation == Relation::Child {
        return match from.address {
            Some(assigned) if is_covered_by(prefix, assigned.as_str()) => None,
            _ => Some("outside the child's address"),
        };
    }
    if is_covered_by(prefix, local.address.as_str()) {
        return Some("inside this node's address");
    }
    None
}

/// Whether `route` may be advertised to `to`
///
/// Routes through children go to everyone; routes through peers and
/// parents only go to children. A route is never sent back to its next
/// hop, and the global default route is never advertised.
pub fn is_advertisable(route: &Route, to: Neighbour<'_>, local: LocalNode<'_>) -> bool {
    if route.next_hop == to.id || route.prefix == local.global_prefix {
        return false;
    }
    match route.relation {
        Relation::Child => true,
        Relation::Peer | Relation::Parent => to.relation == Relation::Child,
    }
}

fn advertise(route: &Route, local: LocalNode<'_>) -> CcpRoute {
    let mut path = Vec::with_capacity(route.path.len() + 1);
    path.push(local.address.to_string());
    path.extend(route.path.iter().cloned());
    CcpRoute {
        prefix: route.prefix.clone(),
        path,
        auth: route.auth,
        props: Vec::new(),
    }
}

fn own_route(local: LocalNode<'_>) -> CcpRoute {
    CcpRoute {
        prefix: local.address.to_string(),
        path: vec![local.address.to_string()],
        auth: [0u8; 32],
        props: Vec::new(),
    }
}

/// Build the next update for a peer, if one is due
///
/// Nothing is sent to peers in idle mode, or when the peer is up to date.
pub fn build_update(
    table: &RoutingTable,
    sender: &SenderState,
    to: Neighbour<'_>,
    local: LocalNode<'_>,
    hold_down_time: u32,
) -> Option<RouteUpdateRequest> {
    if sender.mode != Mode::Sync {
        return None;
    }
    let from_epoch = sender.last_known_epoch;
    let to_epoch = table.epoch();
    if from_epoch != 0 && from_epoch >= to_epoch {
        return None;
    }

    let own = local.address.as_str();
    let mut new_routes = Vec::new();
    let mut withdrawn_routes = Vec::new();

    if from_epoch == 0 {
        new_routes.push(own_route(local));
        let mut prefixes: Vec<&str> = table.prefixes().filter(|p| *p != own).collect();
        prefixes.sort_unstable();
        for prefix in prefixes {
            if let Some(route) = table.best(prefix) {
                if is_advertisable(route, to, local) {
                    new_routes.push(advertise(route, local));
                }
            }
        }
    } else {
        for prefix in table.changes_since(from_epoch).unwrap_or_default() {
            if prefix == own {
                new_routes.push(own_route(local));
                continue;
            }
            match table.best(&prefix) {
                Some(route) if is_advertisable(route, to, local) => {
                    new_routes.push(advertise(route, local))
                }
                _ => withdrawn_routes.push(prefix),
            }
        }
    }

    Some(RouteUpdateRequest {
        routing_table_id: table.id(),
        current_epoch_index: to_epoch,
        from_epoch_index: from_epoch,
        to_epoch_index: to_epoch,
        hold_down_time,
        speaker: local.address.clone(),
        new_routes,
        withdrawn_routes,
    })
}
