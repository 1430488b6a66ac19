//! Persisted peers and static routes
//!
//! The connector loads every peer and static route at start-up and writes
//! admin changes back. [`TomlPeerStore`] keeps them in a single TOML file:
//!
//! ```toml
//! [[peers]]
//! [peers.peer]
//! id = "alice"
//! relation = "child"
//! [peers.endpoint]
//! url = "http://alice:7768/ilp"
//!
//! [[routes]]
//! prefix = "g.partner"
//! peer_id = "bob"
//! ```

use crate::peer::{EndpointInfo, PeerInfo};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stored peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Peer settings
    pub peer: PeerInfo,
    /// How to reach it
    pub endpoint: EndpointInfo,
}

/// Operator-configured route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
    /// Address prefix
    pub prefix: String,
    /// Next hop
    pub peer_id: String,
}

/// Persistence contract used by the connector
#[async_trait]
pub trait PeerStore: Send + Sync + fmt::Debug {
    /// Every stored peer
    async fn load(&self) -> Result<Vec<PeerRecord>>;

    /// Every stored static route
    async fn list(&self) -> Result<Vec<StaticRoute>>;

    /// Insert or replace a peer
    async fn save_peer(&self, record: &PeerRecord) -> Result<()>;

    /// Remove a peer and the static routes through it
    async fn delete_peer(&self, peer_id: &str) -> Result<()>;

    /// Insert or replace the route for a prefix
    async fn save_route(&self, route: &StaticRoute) -> Result<()>;

    /// Remove the route for a prefix
    async fn delete_route(&self, prefix: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Contents {
    #[serde(default)]
    peers: Vec<PeerRecord>,
    #[serde(default)]
    routes: Vec<StaticRoute>,
}

impl Contents {
    fn save_peer(&mut self, record: &PeerRecord) {
        match self.peers.iter_mut().find(|p| p.peer.id == record.peer.id) {
            Some(existing) => *existing = record.clone(),
            None => self.peers.push(record.clone()),
        }
    }

    fn delete_peer(&mut self, peer_id: &str) {
        self.peers.retain(|p| p.peer.id != peer_id);
        self.routes.retain(|r| r.peer_id != peer_id);
    }

    fn save_route(&mut self, route: &StaticRoute) {
        match self.routes.iter_mut().find(|r| r.prefix == route.prefix) {
            Some(existing) => *existing = route.clone(),
            None => self.routes.push(route.clone()),
        }
    }

    fn delete_route(&mut self, prefix: &str) {
        self.routes.retain(|r| r.prefix != prefix);
    }
}

/// Store kept in memory; contents are lost on exit
#[derive(Debug, Default)]
pub struct InMemoryPeerStore {
    contents: parking_lot::Mutex<Contents>,
}

impl InMemoryPeerStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PeerStore for InMemoryPeerStore {
    async fn load(&self) -> Result<Vec<PeerRecord>> {
        Ok(self.contents.lock().peers.clone())
    }

    async fn list(&self) -> Result<Vec<StaticRoute>> {
        Ok(self.contents.lock().routes.clone())
    }

    async fn save_peer(&self, record: &PeerRecord) -> Result<()> {
        self.contents.lock().save_peer(record);
        Ok(())
    }

    async fn delete_peer(&self, peer_id: &str) -> Result<()> {
        self.contents.lock().delete_peer(peer_id);
        Ok(())
    }

    async fn save_route(&self, route: &StaticRoute) -> Result<()> {
        self.contents.lock().save_route(route);
        Ok(())
    }

    async fn delete_route(&self, prefix: &str) -> Result<()> {
        self.contents.lock().delete_route(prefix);
        Ok(())
    }
}

/// Store backed by a TOML file
///
/// Every write rewrites the whole file through a temporary file and a rename.
#[derive(Debug)]
pub struct TomlPeerStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl TomlPeerStore {
    /// Open a store at `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// File path
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Contents> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => toml::from_str(&text).map_err(|e| {
                Error::Store(format!("Failed to parse {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Contents::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, contents: &Contents) -> Result<()> {
        let text = toml::to_string(contents)
            .map_err(|e| Error::Store(format!("Failed to serialize store: {}", e)))?;
        let tmp = self.path.with_extension("toml.tmp");
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Wrote peer store {}", self.path.display());
        Ok(())
    }

    async fn modify<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Contents) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut contents = self.read().await?;
        change(&mut contents);
        self.write(&contents).await
    }
}

#[async_trait]
impl PeerStore for TomlPeerStore {
    async fn load(&self) -> Result<Vec<PeerRecord>> {
        Ok(self.read().await?.peers)
    }

    async fn list(&self) -> Result<Vec<StaticRoute>> {
        Ok(self.read().await?.routes)
    }

    async fn save_peer(&self, record: &PeerRecord) -> Result<()> {
        self.modify(|c| c.save_peer(record)).await
    }

    async fn delete_peer(&self, peer_id: &str) -> Result<()> {
        self.modify(|c| c.delete_peer(peer_id)).await
    }

    async fn save_route(&self, route: &StaticRoute) -> Result<()> {
        self.modify(|c| c.save_route(route)).await
    }

    async fn delete_route(&self, prefix: &str) -> Result<()> {
        self.modify(|c| c.delete_route(prefix)).await
    }
}
