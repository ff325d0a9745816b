//! Transport abstraction.
//!
//! The executor hands a signed request to a [`Transport`] and gets raw
//! bytes back. Deadlines and cancellation are enforced by the executor
//! around the send; they are passed along so a transport holding real
//! sockets can release them early.

use crate::cancel::CancellationToken;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use strata_protocol::{ServiceHandler, StorageRequest, StorageResponse};
use thiserror::Error;
use tokio::time::Instant;

/// Failures below the HTTP layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established or was lost.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The transport gave up waiting.
    #[error("request timed out")]
    Timeout,

    /// The transport observed the cancellation signal.
    #[error("request cancelled")]
    Cancelled,
}

/// Limits that apply to one send.
#[derive(Debug, Clone)]
pub struct SendContext {
    /// Point after which the attempt is abandoned.
    pub deadline: Option<Instant>,
    /// The call's cancellation signal.
    pub cancel: CancellationToken,
}

/// Sends one request and returns the raw response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Dispatches `request`.
    async fn send(
        &self,
        request: StorageRequest,
        ctx: &SendContext,
    ) -> Result<StorageResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(
        &self,
        request: StorageRequest,
        ctx: &SendContext,
    ) -> Result<StorageResponse, TransportError> {
        (**self).send(request, ctx).await
    }
}

/// Routes requests straight into an in-process service.
///
/// Useful for testing without sockets.
#[derive(Debug, Clone)]
pub struct LoopbackTransport<H> {
    handler: H,
    latency: Duration,
}

impl<H: ServiceHandler> LoopbackTransport<H> {
    /// Creates a loopback transport for `handler`.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            latency: Duration::ZERO,
        }
    }

    /// Delays every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The wrapped service.
    pub fn handler(&self) -> &H {
        &self.handler
    }
}

#[async_trait]
impl<H: ServiceHandler> Transport for LoopbackTransport<H> {
    async fn send(
        &self,
        request: StorageRequest,
        _ctx: &SendContext,
    ) -> Result<StorageResponse, TransportError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.handler.handle(&request))
    }
}

/// A transport that replays scripted outcomes and records what it was sent.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<StorageResponse, TransportError>>>,
    requests: Mutex<Vec<StorageRequest>>,
}

impl MockTransport {
    /// Creates a mock with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push_response(&self, response: StorageResponse) {
        self.script.lock().push_back(Ok(response));
    }

    /// Queues a bare status response.
    pub fn push_status(&self, status: u16) {
        self.push_response(StorageResponse::new(status));
    }

    /// Queues a transport failure.
    pub fn push_error(&self, error: TransportError) {
        self.script.lock().push_back(Err(error));
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<StorageRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests received.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        request: StorageRequest,
        _ctx: &SendContext,
    ) -> Result<StorageResponse, TransportError> {
        self.requests.lock().push(request);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connection("no scripted response".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_protocol::HttpMethod;
    use url::Url;

    fn request() -> StorageRequest {
        StorageRequest::new(
            HttpMethod::Get,
            Url::parse("https://acct.table.example.net/t()").unwrap(),
        )
    }

    fn send_ctx() -> SendContext {
        SendContext {
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    struct Echo;

    impl ServiceHandler for Echo {
        fn handle(&self, request: &StorageRequest) -> StorageResponse {
            StorageResponse::new(200).with_body(request.url.path().to_string())
        }
    }

    #[tokio::test]
    async fn mock_replays_script_in_order() {
        let transport = MockTransport::new();
        transport.push_status(503);
        transport.push_error(TransportError::Timeout);

        assert_eq!(
            transport.send(request(), &send_ctx()).await.unwrap().status,
            503
        );
        assert_eq!(
            transport.send(request(), &send_ctx()).await,
            Err(TransportError::Timeout)
        );
        assert!(matches!(
            transport.send(request(), &send_ctx()).await,
            Err(TransportError::Connection(_))
        ));
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn loopback_calls_handler() {
        let transport = LoopbackTransport::new(Echo);
        let response = transport.send(request(), &send_ctx()).await.unwrap();
        assert_eq!(response.body_text(), "/t()");
    }

    #[tokio::test(start_paused = true)]
    async fn loopback_latency() {
        let transport = LoopbackTransport::new(Echo).with_latency(Duration::from_secs(2));
        let started = Instant::now();
        transport.send(request(), &send_ctx()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}
