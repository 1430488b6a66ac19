//! Per-peer packet amount ceiling

use crate::pipeline::{Next, Rule};
use crate::{Error, Result};
use async_trait::async_trait;
use packet_core::{Prepare, Reply};

/// Rejects incoming Prepares above `max` with `F08`
#[derive(Debug)]
pub struct MaxPacketAmountRule {
    max: u64,
}

impl MaxPacketAmountRule {
    /// Create new rule
    pub fn new(max: u64) -> Self {
        Self { max }
    }
}

#[async_trait]
impl Rule for MaxPacketAmountRule {
    fn name(&self) -> &'static str {
        "max-packet-amount"
    }

    async fn incoming(&self, request: Prepare, next: Next<'_>) -> Result<Reply> {
        if request.amount > self.max {
            return Err(Error::AmountTooLarge {
                amount: request.amount,
                max: self.max,
            });
        }
        next.run(request).await
    }
}
