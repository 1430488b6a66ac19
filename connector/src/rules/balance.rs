//! Balance accounting
//!
//! Balances only move on Fulfill. A forwarded packet credits the peer it
//! came from (incoming) and debits the peer it went to (outgoing). A bound
//! violation turns the Fulfill into a `T04` failure and raises an alert;
//! updates already committed for the other peer stay committed.

use crate::alerts::AlertLog;
use crate::metrics::ConnectorMetrics;
use crate::pipeline::{Direction, Next, Rule};
use crate::{Error, Result};
use async_trait::async_trait;
use ledger_core::BalanceLedger;
use packet_core::{Prepare, Reply};
use std::sync::Arc;
use tracing::{debug, error};

/// Applies fulfilled amounts to the peer's balance
#[derive(Debug)]
pub struct BalanceRule {
    peer_id: String,
    ledger: Arc<BalanceLedger>,
    alerts: Arc<AlertLog>,
    metrics: Arc<ConnectorMetrics>,
}

impl BalanceRule {
    /// Create new rule
    pub fn new(
        peer_id: impl Into<String>,
        ledger: Arc<BalanceLedger>,
        alerts: Arc<AlertLog>,
        metrics: Arc<ConnectorMetrics>,
    ) -> Self {
        Self {
            peer_id: peer_id.into(),
            ledger,
            alerts,
            metrics,
        }
    }

    async fn settle(&self, direction: Direction, request: Prepare, next: Next<'_>) -> Result<Reply> {
        let amount = request.amount;
        let reply = next.run(request).await?;
        if amount == 0 || !reply.is_fulfill() {
            return Ok(reply);
        }

        let update = match direction {
            Direction::Incoming => self.ledger.credit(&self.peer_id, amount),
            Direction::Outgoing => self.ledger.debit(&self.peer_id, amount),
        };
        match update {
            Ok(balance) => {
                debug!(
                    "Balance of peer {} is now {} after {} {}",
                    self.peer_id,
                    balance,
                    direction.as_str(),
                    amount
                );
                Ok(reply)
            }
            Err(e) => {
                error!(
                    "Fulfilled {} packet of {} not accounted for peer {}: {}",
                    direction.as_str(),
                    amount,
                    self.peer_id,
                    e
                );
                self.alerts.record(
                    &self.peer_id,
                    None,
                    &format!("Balance update failed: {}", e),
                );
                self.metrics.record_alert(&self.peer_id);
                Err(Error::Ledger(e))
            }
        }
    }
}

#[async_trait]
impl Rule for BalanceRule {
    fn name(&self) -> &'static str {
        "balance"
    }

    async fn incoming(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        self.settle(Direction::Incoming, request, next).await
    }

    async fn outgoing(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        self.settle(Direction::Outgoing, request, next).await
    }
}
