//! Longest-prefix routing table
//!
//! Each prefix holds one candidate route per next hop. Lookups stop at the
//! longest prefix of the destination present in the table and pick the best
//! usable candidate there; shorter prefixes are never consulted.
//!
//! # Invariants
//!
//! - At most one candidate per (prefix, next hop)
//! - Every effective change bumps the epoch and records it as the prefix's
//!   last-changed epoch, which route updates are generated from

use crate::peer::Relation;
use packet_core::Address;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

/// Where a route came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteOrigin {
    /// Derived from a peer's relation when it was added
    Implicit,
    /// Configured by an operator
    Static,
    /// Learned over CCP
    Ccp,
}

/// Candidate route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Address prefix
    pub prefix: String,
    /// Peer the route resolves to
    pub next_hop: String,
    /// Relation of the next hop
    pub relation: Relation,
    /// Nodes the route has traversed
    pub path: Vec<String>,
    /// Route authentication from the advertisement
    #[serde(skip)]
    pub auth: [u8; 32],
    /// Origin
    pub origin: RouteOrigin,
    /// Table sequence number of the last update
    pub updated_seq: u64,
}

impl Route {
    /// Create a route with an empty path
    pub fn new(
        prefix: impl Into<String>,
        next_hop: impl Into<String>,
        relation: Relation,
        origin: RouteOrigin,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            next_hop: next_hop.into(),
            relation,
            path: Vec::new(),
            auth: [0u8; 32],
            origin,
            updated_seq: 0,
        }
    }

    /// Set path
    pub fn with_path(mut self, path: Vec<String>) -> Self {
        self.path = path;
        self
    }

    /// Tie-break: most recently updated, then relation priority
    fn preference(&self, other: &Route) -> Ordering {
        self.updated_seq
            .cmp(&other.updated_seq)
            .then_with(|| self.relation.priority().cmp(&other.relation.priority()))
    }
}

/// Routing table
#[derive(Debug)]
pub struct RoutingTable {
    id: Uuid,
    routes: HashMap<String, Vec<Route>>,
    seq: u64,
    epoch: u32,
    /// Epoch of the last change to each prefix, withdrawn ones included
    changed: HashMap<String, u32>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingTable {
    /// Create empty table with a fresh id
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            routes: HashMap::new(),
            seq: 0,
            epoch: 0,
            changed: HashMap::new(),
        }
    }

    /// Table id advertised over CCP
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current epoch
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Insert or replace the candidate for (prefix, next hop)
    ///
    /// Refreshing a candidate with identical content only bumps the epoch
    /// when it changes which candidate is best for the prefix.
    pub fn set_route(&mut self, mut route: Route) {
        self.seq += 1;
        route.updated_seq = self.seq;
        let prefix = route.prefix.clone();
        let best_before = self.best(&prefix).map(|r| r.next_hop.clone());
        let candidates = self.routes.entry(prefix.clone()).or_default();
        let content_changed = match candidates.iter_mut().find(|r| r.next_hop == route.next_hop) {
            Some(existing) => {
                let same = Route {
                    updated_seq: existing.updated_seq,
                    ..route.clone()
                } == *existing;
                *existing = route;
                !same
            }
            None => {
                candidates.push(route);
                true
            }
        };
        let best_after = self.best(&prefix).map(|r| r.next_hop.clone());
        if content_changed || best_before != best_after {
            self.log_change(prefix);
        }
    }

    /// Remove candidates for `prefix`; all of them when `next_hop` is `None`
    pub fn remove_route(&mut self, prefix: &str, next_hop: Option<&str>) -> bool {
        let Some(candidates) = self.routes.get_mut(prefix) else {
            return false;
        };
        let before = candidates.len();
        candidates.retain(|r| next_hop.map_or(false, |hop| r.next_hop != hop));
        let removed = candidates.len() != before;
        if candidates.is_empty() {
            self.routes.remove(prefix);
        }
        if removed {
            self.log_change(prefix.to_string());
        }
        removed
    }

    /// Remove every route through `peer_id`, returning the affected prefixes
    pub fn remove_peer(&mut self, peer_id: &str) -> Vec<String> {
        let prefixes: Vec<String> = self
            .routes
            .iter()
            .filter(|(_, candidates)| candidates.iter().any(|r| r.next_hop == peer_id))
            .map(|(prefix, _)| prefix.clone())
            .collect();
        for prefix in &prefixes {
            self.remove_route(prefix, Some(peer_id));
        }
        prefixes
    }

    /// Remove routes through `peer_id` with the given origin
    pub fn remove_peer_routes(&mut self, peer_id: &str, origin: RouteOrigin) -> Vec<String> {
        let prefixes: Vec<String> = self
            .routes
            .iter()
            .filter(|(_, candidates)| {
                candidates
                    .iter()
                    .any(|r| r.next_hop == peer_id && r.origin == origin)
            })
            .map(|(prefix, _)| prefix.clone())
            .collect();
        for prefix in &prefixes {
            self.remove_route(prefix, Some(peer_id));
        }
        prefixes
    }

    /// Mark a prefix as changed without touching any route
    pub fn touch(&mut self, prefix: &str) {
        self.log_change(prefix.to_string());
    }

    /// Best route for the longest matching prefix
    pub fn lookup(&self, destination: &Address) -> Option<&Route> {
        self.lookup_with(destination, |_| true)
    }

    /// Best route whose next hop passes `usable`, at the longest matching prefix
    ///
    /// `None` when no candidate of that prefix is usable.
    pub fn lookup_with<F>(&self, destination: &Address, usable: F) -> Option<&Route>
    where
        F: Fn(&str) -> bool,
    {
        let candidates = destination
            .prefixes()
            .find_map(|prefix| self.routes.get(prefix))?;
        candidates
            .iter()
            .filter(|r| usable(&r.next_hop))
            .max_by(|a, b| a.preference(b))
    }

    /// Best candidate for an exact prefix
    pub fn best(&self, prefix: &str) -> Option<&Route> {
        self.routes
            .get(prefix)
            .and_then(|candidates| candidates.iter().max_by(|a, b| a.preference(b)))
    }

    /// Candidate for an exact prefix through `next_hop`
    pub fn candidate(&self, prefix: &str, next_hop: &str) -> Option<&Route> {
        self.routes
            .get(prefix)
            .and_then(|candidates| candidates.iter().find(|r| r.next_hop == next_hop))
    }

    /// Every prefix in the table
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Every candidate, ordered by prefix then next hop
    pub fn routes(&self) -> Vec<Route> {
        let mut routes: Vec<Route> = self.routes.values().flatten().cloned().collect();
        routes.sort_by(|a, b| a.prefix.cmp(&b.prefix).then_with(|| a.next_hop.cmp(&b.next_hop)));
        routes
    }

    /// Prefixes changed after `epoch`, sorted; `None` if `epoch` is in the future
    pub fn changes_since(&self, epoch: u32) -> Option<Vec<String>> {
        if epoch > self.epoch {
            return None;
        }
        let mut prefixes: Vec<String> = self
            .changed
            .iter()
            .filter(|(_, changed)| **changed > epoch)
            .map(|(prefix, _)| prefix.clone())
            .collect();
        prefixes.sort_unstable();
        Some(prefixes)
    }

    /// Number of prefixes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn log_change(&mut self, prefix: String) {
        match self.epoch.checked_add(1) {
            Some(next) => self.epoch = next,
            None => {
                // Out of epochs: a new table id makes every peer resync in full
                self.id = Uuid::new_v4();
                self.epoch = 1;
                self.changed.clear();
            }
        }
        self.changed.insert(prefix, self.epoch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn route(prefix: &str, peer: &str, relation: Relation) -> Route {
        Route::new(prefix, peer, relation, RouteOrigin::Static)
    }

    #[test]
    fn test_longest_prefix_match() {
        let mut table = RoutingTable::new();
        table.set_route(route("g.a", "x", Relation::Peer));
        table.set_route(route("g.a.b", "y", Relation::Peer));

        assert_eq!(table.lookup(&address("g.a.b.c")).unwrap().next_hop, "y");
        assert_eq!(table.lookup(&address("g.a.c")).unwrap().next_hop, "x");
        assert!(table.lookup(&address("test.z")).is_none());
    }

    #[test]
    fn test_segment_boundaries() {
        let mut table = RoutingTable::new();
        table.set_route(route("g.a", "x", Relation::Peer));
        assert!(table.lookup(&address("g.ab")).is_none());
    }

    #[test]
    fn test_bare_scheme_default_route() {
        let mut table = RoutingTable::new();
        table.set_route(route("test", "parent", Relation::Parent));
        table.set_route(route("test.node.alice", "alice", Relation::Child));
        assert_eq!(table.lookup(&address("test.elsewhere")).unwrap().next_hop, "parent");
        assert_eq!(table.lookup(&address("test.node.alice.x")).unwrap().next_hop, "alice");
    }

    #[test]
    fn test_most_recent_wins() {
        let mut table = RoutingTable::new();
        table.set_route(route("g.a", "child", Relation::Child));
        table.set_route(route("g.a", "parent", Relation::Parent));
        assert_eq!(table.best("g.a").unwrap().next_hop, "parent");

        // Refreshing the older candidate makes it the newest
        table.set_route(route("g.a", "child", Relation::Child));
        assert_eq!(table.best("g.a").unwrap().next_hop, "child");
    }

    #[test]
    fn test_relation_breaks_ties() {
        let older = Route {
            updated_seq: 5,
            ..route("g.a", "parent", Relation::Parent)
        };
        let same_age = Route {
            updated_seq: 5,
            ..route("g.a", "child", Relation::Child)
        };
        assert_eq!(same_age.preference(&older), Ordering::Greater);
    }

    #[test]
    fn test_unusable_peer_is_not_routed_around() {
        let mut table = RoutingTable::new();
        table.set_route(route("g", "parent", Relation::Parent));
        table.set_route(route("g.a.b", "y", Relation::Peer));

        assert!(table
            .lookup_with(&address("g.a.b.c"), |peer| peer != "y")
            .is_none());
        assert_eq!(
            table
                .lookup_with(&address("g.a.c"), |peer| peer != "y")
                .unwrap()
                .next_hop,
            "parent"
        );
    }

    #[test]
    fn test_other_candidate_of_same_prefix_is_used() {
        let mut table = RoutingTable::new();
        table.set_route(route("g.a.b", "x", Relation::Peer));
        table.set_route(route("g.a.b", "y", Relation::Peer));

        let found = table.lookup_with(&address("g.a.b.c"), |peer| peer != "y");
        assert_eq!(found.unwrap().next_hop, "x");
    }

    #[test]
    fn test_remove_peer_purges_routes() {
        let mut table = RoutingTable::new();
        table.set_route(route("g.a", "x", Relation::Peer));
        table.set_route(route("g.b", "x", Relation::Peer));
        table.set_route(route("g.b", "y", Relation::Peer));

        let mut removed = table.remove_peer("x");
        removed.sort();
        assert_eq!(removed, vec!["g.a", "g.b"]);
        assert!(table.best("g.a").is_none());
        assert_eq!(table.best("g.b").unwrap().next_hop, "y");
    }

    #[test]
    fn test_remove_route_without_next_hop_removes_all() {
        let mut table = RoutingTable::new();
        table.set_route(route("g.a", "x", Relation::Peer));
        table.set_route(route("g.a", "y", Relation::Peer));
        assert!(table.remove_route("g.a", None));
        assert!(table.is_empty());
        assert!(!table.remove_route("g.a", None));
    }

    #[test]
    fn test_epoch_and_changes() {
        let mut table = RoutingTable::new();
        assert_eq!(table.epoch(), 0);
        table.set_route(route("g.a", "x", Relation::Peer));
        table.set_route(route("g.b", "x", Relation::Peer));
        table.set_route(route("g.a", "y", Relation::Peer));
        assert_eq!(table.epoch(), 3);

        assert_eq!(table.changes_since(0).unwrap(), vec!["g.a", "g.b"]);
        assert_eq!(table.changes_since(2).unwrap(), vec!["g.a"]);
        assert!(table.changes_since(3).unwrap().is_empty());
        assert!(table.changes_since(4).is_none());

        table.remove_route("g.b", None);
        assert_eq!(table.epoch(), 4);
        assert_eq!(table.changes_since(3).unwrap(), vec!["g.b"]);
    }

    #[test]
    fn test_identical_refresh_keeps_epoch() {
        let mut table = RoutingTable::new();
        for _ in 0..1_000 {
            table.set_route(route("g.a", "x", Relation::Peer));
        }
        assert_eq!(table.epoch(), 1);
        assert_eq!(table.changed.len(), 1);

        let moved = route("g.a", "x", Relation::Peer).with_path(vec!["g.z".to_string()]);
        table.set_route(moved);
        assert_eq!(table.epoch(), 2);
    }
}
