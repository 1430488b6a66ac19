//! Peer liveness tracking
//!
//! # State machine
//!
//! ```text
//!  Unknown ──success──► Up ◄──────success────── Down
//!     │                  │                       ▲
//!     └──── N consecutive failures ──────────────┘
//! ```
//!
//! `on_failed` fires once per transition into `Down`; `on_recovered` fires
//! once per transition out of it.

use crate::{transport::PeerTransport, HEARTBEAT_DESTINATION};
use chrono::{DateTime, Utc};
use packet_core::{Address, Prepare, PEER_PROTOCOL_CONDITION};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Peer liveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    /// Not probed yet
    Unknown,
    /// Last probe succeeded
    Up,
    /// Failure threshold reached
    Down,
}

/// Result of recording a probe outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No status change worth reporting
    None,
    /// Peer just went down
    Failed,
    /// Peer just came back up
    Recovered,
}

/// Per-peer heartbeat state
#[derive(Debug, Clone)]
pub struct HeartbeatState {
    status: PeerStatus,
    consecutive_failures: u32,
    last_seen: Option<DateTime<Utc>>,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self {
            status: PeerStatus::Unknown,
            consecutive_failures: 0,
            last_seen: None,
        }
    }
}

impl HeartbeatState {
    /// Create new state
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status
    pub fn status(&self) -> PeerStatus {
        self.status
    }

    /// Failures since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Time of the last success
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    /// Whether lookups should skip this peer
    pub fn is_down(&self) -> bool {
        self.status == PeerStatus::Down
    }

    /// Record a successful probe or send
    pub fn record_success(&mut self, now: DateTime<Utc>) -> Transition {
        let previous = self.status;
        self.status = PeerStatus::Up;
        self.consecutive_failures = 0;
        self.last_seen = Some(now);
        if previous == PeerStatus::Down {
            Transition::Recovered
        } else {
            Transition::None
        }
    }

    /// Record a failed probe or send
    pub fn record_failure(&mut self, threshold: u32) -> Transition {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.status != PeerStatus::Down && self.consecutive_failures >= threshold.max(1) {
            self.status = PeerStatus::Down;
            Transition::Failed
        } else {
            Transition::None
        }
    }
}

/// Notified on liveness transitions
pub trait HeartbeatListener: Send + Sync + fmt::Debug {
    /// Peer went down
    fn on_failed(&self, peer_id: &str);
    /// Peer came back up
    fn on_recovered(&self, peer_id: &str);
}

/// Applies probe outcomes and dispatches notifications
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    failure_threshold: u32,
    probe_timeout: Duration,
    listener: Arc<dyn HeartbeatListener>,
}

impl HeartbeatMonitor {
    /// Create new monitor
    pub fn new(
        failure_threshold: u32,
        probe_timeout: Duration,
        listener: Arc<dyn HeartbeatListener>,
    ) -> Self {
        Self {
            failure_threshold,
            probe_timeout,
            listener,
        }
    }

    /// Record a success for `peer_id`
    pub fn success(&self, peer_id: &str, state: &Mutex<HeartbeatState>) {
        let transition = state.lock().record_success(Utc::now());
        if transition == Transition::Recovered {
            info!("Peer {} recovered", peer_id);
            self.listener.on_recovered(peer_id);
        }
    }

    /// Record a failure for `peer_id`
    pub fn failure(&self, peer_id: &str, state: &Mutex<HeartbeatState>, reason: &str) {
        let transition = state.lock().record_failure(self.failure_threshold);
        match transition {
            Transition::Failed => {
                warn!(
                    "Peer {} marked down after {} consecutive failures: {}",
                    peer_id, self.failure_threshold, reason
                );
                self.listener.on_failed(peer_id);
            }
            _ => debug!("Heartbeat failure for peer {}: {}", peer_id, reason),
        }
    }

    /// Send one probe and record the outcome
    ///
    /// Any reply, Fulfill or Reject, proves the peer is reachable.
    pub async fn probe(
        &self,
        peer_id: &str,
        transport: &dyn PeerTransport,
        state: &Mutex<HeartbeatState>,
    ) -> bool {
        let prepare = match probe_prepare(self.probe_timeout) {
            Ok(prepare) => prepare,
            Err(e) => {
                warn!("Could not build heartbeat probe: {}", e);
                return false;
            }
        };

        match tokio::time::timeout(self.probe_timeout, transport.send(prepare)).await {
            Ok(Ok(_reply)) => {
                self.success(peer_id, state);
                true
            }
            Ok(Err(e)) => {
                self.failure(peer_id, state, &e.to_string());
                false
            }
            Err(_) => {
                self.failure(peer_id, state, "probe timed out");
                false
            }
        }
    }
}

/// Zero-amount Prepare to `peer.heartbeat`
pub fn probe_prepare(timeout: Duration) -> packet_core::Result<Prepare> {
    let expiry = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::seconds(2));
    Ok(Prepare {
        destination: Address::new(HEARTBEAT_DESTINATION)?,
        amount: 0,
        expires_at: Utc::now() + expiry,
        execution_condition: PEER_PROTOCOL_CONDITION,
        data: bytes::Bytes::new(),
    })
}
