//! Records integrity and accounting failures as alerts

use crate::alerts::AlertLog;
use crate::metrics::ConnectorMetrics;
use crate::pipeline::{Next, Rule};
use crate::Result;
use async_trait::async_trait;
use packet_core::{ErrorCode, Prepare, Reply};
use std::sync::Arc;
use tracing::warn;

/// Watches outgoing replies for `F05` and `T04`
#[derive(Debug)]
pub struct AlertRule {
    peer_id: String,
    alerts: Arc<AlertLog>,
    metrics: Arc<ConnectorMetrics>,
}

fn is_alerting(code: ErrorCode) -> bool {
    code == ErrorCode::F05_WRONG_CONDITION || code == ErrorCode::T04_INSUFFICIENT_LIQUIDITY
}

impl AlertRule {
    /// Create new rule
    pub fn new(
        peer_id: impl Into<String>,
        alerts: Arc<AlertLog>,
        metrics: Arc<ConnectorMetrics>,
    ) -> Self {
        Self {
            peer_id: peer_id.into(),
            alerts,
            metrics,
        }
    }

    fn raise(&self, triggered_by: Option<&str>, message: &str) {
        warn!("Alert for peer {}: {}", self.peer_id, message);
        self.alerts.record(&self.peer_id, triggered_by, message);
        self.metrics.record_alert(&self.peer_id);
    }
}

#[async_trait]
impl Rule for AlertRule {
    fn name(&self) -> &'static str {
        "alert"
    }

    async fn outgoing(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        let result = next.run(request).await;
        match &result {
            Ok(Reply::Reject(reject)) if is_alerting(reject.code) => {
                let message = format!("{}: {}", reject.code, reject.message);
                self.raise(
                    reject.triggered_by.as_ref().map(|a| a.as_str()),
                    &message,
                );
            }
            Err(e) if is_alerting(e.reject_code()) => {
                let message = format!("{}: {}", e.reject_code(), e);
                self.raise(None, &message);
            }
            _ => {}
        }
        result
    }
}
