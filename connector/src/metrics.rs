//! Metrics collection for observability
//!
//! All series live in a registry owned by the connector, so several
//! connectors can run in one process.
//!
//! # Metrics
//!
//! - `connector_packets_total{peer,direction,result}` - Packets by outcome
//! - `connector_amount_prepared_total{peer,direction}` - Prepared volume
//! - `connector_amount_fulfilled_total{peer,direction}` - Fulfilled volume
//! - `connector_peer_up{peer}` - 1 when the last heartbeat succeeded
//! - `connector_alerts_total{peer}` - Alerts recorded
//! - `ledger_*` - Balance metrics from the ledger

use crate::pipeline::Direction;
use ledger_core::LedgerMetrics;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};

/// Packet outcome label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketResult {
    /// Prepare entered the rule
    Prepared,
    /// Fulfilled
    Fulfilled,
    /// Rejected
    Rejected,
    /// Failed with an error
    Failed,
}

impl PacketResult {
    fn as_str(&self) -> &'static str {
        match self {
            PacketResult::Prepared => "prepared",
            PacketResult::Fulfilled => "fulfilled",
            PacketResult::Rejected => "rejected",
            PacketResult::Failed => "failed",
        }
    }
}

const RESULTS: [PacketResult; 4] = [
    PacketResult::Prepared,
    PacketResult::Fulfilled,
    PacketResult::Rejected,
    PacketResult::Failed,
];

const DIRECTIONS: [Direction; 2] = [Direction::Incoming, Direction::Outgoing];

/// Connector metrics
#[derive(Clone, Debug)]
pub struct ConnectorMetrics {
    registry: Registry,

    /// Packets by peer, direction and outcome
    pub packets_total: IntCounterVec,

    /// Prepared amount by peer and direction
    pub amount_prepared_total: IntCounterVec,

    /// Fulfilled amount by peer and direction
    pub amount_fulfilled_total: IntCounterVec,

    /// Heartbeat liveness by peer
    pub peer_up: IntGaugeVec,

    /// Alerts by peer
    pub alerts_total: IntCounterVec,

    /// Ledger metrics, registered in the same registry
    pub ledger: LedgerMetrics,
}

/// Counters for one direction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionStats {
    /// Prepares seen
    pub prepared: u64,
    /// Fulfilled
    pub fulfilled: u64,
    /// Rejected
    pub rejected: u64,
    /// Failed
    pub failed: u64,
    /// Prepared volume
    pub amount_prepared: u64,
    /// Fulfilled volume
    pub amount_fulfilled: u64,
}

impl ConnectorMetrics {
    /// Create metrics in a fresh registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let packets_total = IntCounterVec::new(
            Opts::new("connector_packets_total", "Packets by peer, direction and result"),
            &["peer", "direction", "result"],
        )?;
        registry.register(Box::new(packets_total.clone()))?;

        let amount_prepared_total = IntCounterVec::new(
            Opts::new(
                "connector_amount_prepared_total",
                "Prepared amount by peer and direction",
            ),
            &["peer", "direction"],
        )?;
        registry.register(Box::new(amount_prepared_total.clone()))?;

        let amount_fulfilled_total = IntCounterVec::new(
            Opts::new(
                "connector_amount_fulfilled_total",
                "Fulfilled amount by peer and direction",
            ),
            &["peer", "direction"],
        )?;
        registry.register(Box::new(amount_fulfilled_total.clone()))?;

        let peer_up = IntGaugeVec::new(
            Opts::new("connector_peer_up", "1 when the peer answered its last heartbeat"),
            &["peer"],
        )?;
        registry.register(Box::new(peer_up.clone()))?;

        let alerts_total = IntCounterVec::new(
            Opts::new("connector_alerts_total", "Alerts recorded per peer"),
            &["peer"],
        )?;
        registry.register(Box::new(alerts_total.clone()))?;

        let ledger = LedgerMetrics::new(&registry)?;

        Ok(Self {
            registry,
            packets_total,
            amount_prepared_total,
            amount_fulfilled_total,
            peer_up,
            alerts_total,
            ledger,
        })
    }

    /// Count a packet outcome
    pub fn record_packet(&self, peer_id: &str, direction: Direction, result: PacketResult) {
        self.packets_total
            .with_label_values(&[peer_id, direction.as_str(), result.as_str()])
            .inc();
    }

    /// Add prepared volume
    pub fn record_prepared_amount(&self, peer_id: &str, direction: Direction, amount: u64) {
        self.amount_prepared_total
            .with_label_values(&[peer_id, direction.as_str()])
            .inc_by(amount);
    }

    /// Add fulfilled volume
    pub fn record_fulfilled_amount(&self, peer_id: &str, direction: Direction, amount: u64) {
        self.amount_fulfilled_total
            .with_label_values(&[peer_id, direction.as_str()])
            .inc_by(amount);
    }

    /// Set liveness gauge
    pub fn set_peer_up(&self, peer_id: &str, up: bool) {
        self.peer_up.with_label_values(&[peer_id]).set(up as i64);
    }

    /// Count an alert
    pub fn record_alert(&self, peer_id: &str) {
        self.alerts_total.with_label_values(&[peer_id]).inc();
    }

    /// Read back the counters for one peer and direction
    pub fn direction_stats(&self, peer_id: &str, direction: Direction) -> DirectionStats {
        let count = |result: PacketResult| {
            self.packets_total
                .with_label_values(&[peer_id, direction.as_str(), result.as_str()])
                .get()
        };
        DirectionStats {
            prepared: count(PacketResult::Prepared),
            fulfilled: count(PacketResult::Fulfilled),
            rejected: count(PacketResult::Rejected),
            failed: count(PacketResult::Failed),
            amount_prepared: self
                .amount_prepared_total
                .with_label_values(&[peer_id, direction.as_str()])
                .get(),
            amount_fulfilled: self
                .amount_fulfilled_total
                .with_label_values(&[peer_id, direction.as_str()])
                .get(),
        }
    }

    /// Drop every series labelled with `peer_id`
    pub fn remove_peer(&self, peer_id: &str) {
        for direction in DIRECTIONS {
            for result in RESULTS {
                let _ = self.packets_total.remove_label_values(&[
                    peer_id,
                    direction.as_str(),
                    result.as_str(),
                ]);
            }
            let _ = self
                .amount_prepared_total
                .remove_label_values(&[peer_id, direction.as_str()]);
            let _ = self
                .amount_fulfilled_total
                .remove_label_values(&[peer_id, direction.as_str()]);
        }
        let _ = self.peer_up.remove_label_values(&[peer_id]);
        let _ = self.alerts_total.remove_label_values(&[peer_id]);
        self.ledger.remove_peer(peer_id);
    }

    /// Render the Prometheus text exposition format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Registry holding every series
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
