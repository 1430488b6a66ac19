//! Echo protocol for round-trip diagnostics
//!
//! A request addressed to this node is turned into a response Prepare sent
//! back to the request's source. The reply to that response becomes the
//! reply to the request.

use crate::rules::chrono_duration;
use crate::{Error, Result};
use chrono::Utc;
use packet_core::echo::EchoMessage;
use packet_core::{Fulfill, Prepare, Reply, PEER_PROTOCOL_CONDITION, PEER_PROTOCOL_FULFILLMENT};
use std::time::Duration;
use tracing::debug;

/// What to do with an echo packet addressed to this node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoAction {
    /// Forward this response Prepare and return its reply
    Respond(Prepare),
    /// Reply directly
    Reply(Reply),
}

/// Handles echo packets addressed to this node
#[derive(Debug, Clone)]
pub struct EchoController {
    min_message_window: chrono::Duration,
}

impl EchoController {
    /// Create new controller
    pub fn new(min_message_window: Duration) -> Self {
        Self {
            min_message_window: chrono_duration(min_message_window),
        }
    }

    /// Decide how to answer `request`
    ///
    /// Data without the echo prefix is an invalid packet (`F01`).
    pub fn handle(&self, request: &Prepare) -> Result<EchoAction> {
        match EchoMessage::decode(&request.data)? {
            EchoMessage::Request { source } => {
                let expires_at = request.expires_at - self.min_message_window;
                if expires_at <= Utc::now() {
                    return Err(Error::InsufficientTimeout(
                        "not enough time left to send the echo response".into(),
                    ));
                }
                debug!("Echo request, responding to {}", source);
                Ok(EchoAction::Respond(Prepare {
                    destination: source,
                    amount: request.amount,
                    expires_at,
                    execution_condition: request.execution_condition,
                    data: EchoMessage::Response.encode(),
                }))
            }
            EchoMessage::Response => {
                if request.execution_condition != PEER_PROTOCOL_CONDITION {
                    return Err(Error::WrongCondition(
                        "echo responses must use the peer protocol condition".into(),
                    ));
                }
                Ok(EchoAction::Reply(Reply::Fulfill(Fulfill::new(
                    PEER_PROTOCOL_FULFILLMENT,
                ))))
            }
        }
    }
}
