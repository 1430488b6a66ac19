//! Outbound peer transport
//!
//! The core only needs `send(Prepare) -> Fulfill | Reject`. A transport
//! failure is not a Reject: the caller maps it to `T01` and reports it to
//! the heartbeat monitor.

use crate::{
    peer::{EndpointInfo, PeerInfo},
    Error, Result,
};
use async_trait::async_trait;
use packet_core::{Prepare, Reply};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Request could not be delivered
    #[error("Connection error: {0}")]
    Connection(String),

    /// Peer answered with a non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// No response within the timeout
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Response was not a valid Fulfill or Reject
    #[error("Invalid response: {0}")]
    Decode(#[from] packet_core::Error),

    /// Transport shut down
    #[error("Transport closed: {0}")]
    Closed(String),
}

/// Sends Prepares to one peer
#[async_trait]
pub trait PeerTransport: Send + Sync + fmt::Debug {
    /// Send a Prepare and wait for the reply
    async fn send(&self, request: Prepare) -> std::result::Result<Reply, TransportError>;
}

/// Builds a transport for a newly added peer
pub trait TransportFactory: Send + Sync + fmt::Debug {
    /// Create transport
    fn create(&self, peer: &PeerInfo, endpoint: &EndpointInfo) -> Result<Arc<dyn PeerTransport>>;
}

/// ILP-over-HTTP client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    /// Create new transport
    pub fn new(endpoint: &EndpointInfo) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(endpoint.timeout())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: endpoint.url.clone(),
            auth_token: endpoint.auth_token.clone(),
            timeout: endpoint.timeout(),
        })
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn send(&self, request: Prepare) -> std::result::Result<Reply, TransportError> {
        let mut builder = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(request.to_bytes());
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(self.timeout.as_millis() as u64)
            } else {
                TransportError::Connection(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text.chars().take(256).collect(),
            });
        }

        Ok(Reply::from_bytes(&body)?)
    }
}

/// Creates [`HttpTransport`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpTransportFactory;

impl TransportFactory for HttpTransportFactory {
    fn create(&self, _peer: &PeerInfo, endpoint: &EndpointInfo) -> Result<Arc<dyn PeerTransport>> {
        Ok(Arc::new(HttpTransport::new(endpoint)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use packet_core::{
        Address, ErrorCode, Fulfill, Reject, PEER_PROTOCOL_CONDITION, PEER_PROTOCOL_FULFILLMENT,
    };
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prepare() -> Prepare {
        Prepare {
            destination: Address::new("test.bob").unwrap(),
            amount: 10,
            expires_at: Utc::now() + chrono::Duration::seconds(30),
            execution_condition: PEER_PROTOCOL_CONDITION,
            data: bytes::Bytes::new(),
        }
    }

    fn endpoint(server: &MockServer) -> EndpointInfo {
        EndpointInfo::new(format!("{}/ilp", server.uri())).with_auth_token("secret")
    }

    #[tokio::test]
    async fn test_posts_oer_and_decodes_fulfill() {
        let server = MockServer::start().await;
        let request = prepare();
        let fulfill = Fulfill::new(PEER_PROTOCOL_FULFILLMENT);

        Mock::given(method("POST"))
            .and(path("/ilp"))
            .and(header("authorization", "Bearer secret"))
            .and(header("content-type", "application/octet-stream"))
            .and(body_bytes(request.to_bytes().to_vec()))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(fulfill.to_bytes().to_vec()))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&endpoint(&server)).unwrap();
        let reply = transport.send(request).await.unwrap();
        assert_eq!(reply, Reply::Fulfill(fulfill));
    }

    #[tokio::test]
    async fn test_reject_is_a_reply() {
        let server = MockServer::start().await;
        let reject = Reject::new(ErrorCode::F02_UNREACHABLE, "no route", None);
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(reject.to_bytes().to_vec()))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&endpoint(&server)).unwrap();
        let reply = transport.send(prepare()).await.unwrap();
        assert_eq!(reply.reject_code(), Some(ErrorCode::F02_UNREACHABLE));
    }

    #[tokio::test]
    async fn test_http_error_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&endpoint(&server)).unwrap();
        let err = transport.send(prepare()).await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_garbage_body_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&endpoint(&server)).unwrap();
        let err = transport.send(prepare()).await.unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }

    #[tokio::test]
    async fn test_unreachable_peer() {
        let transport = HttpTransport::new(&EndpointInfo::new("http://127.0.0.1:9/ilp")).unwrap();
        let err = transport.send(prepare()).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Connection(_) | TransportError::Timeout(_)
        ));
    }
}
