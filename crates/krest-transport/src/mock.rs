//! Scripted transport for tests.
//!
//! [`MockTransport`] replays queued replies in order and records every
//! request it sees, with the body fully drained. Once the script runs out
//! it answers `200` with an empty body.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use krest_core::RequestContext;

use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportRequest, TransportResponse};

/// A request as observed by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request method
    pub method: Method,
    /// Request URL
    pub url: String,
    /// Request headers
    pub headers: HeaderMap,
    /// Drained body bytes
    pub body: Bytes,
    /// Whether redirects were requested
    pub follow_redirects: bool,
    /// Whether a dedicated TLS configuration was attached
    pub has_tls: bool,
}

enum Reply {
    Response {
        status: u16,
        headers: HeaderMap,
        body: Bytes,
    },
    Error(TransportError),
}

#[derive(Default)]
struct MockState {
    replies: VecDeque<Reply>,
    requests: Vec<RecordedRequest>,
    latency: Option<Duration>,
}

/// In-memory [`Transport`] with scripted replies.
///
/// Clones share the same script and request log.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Delay every reply by `latency`. The delay honours the request context.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state().latency = Some(latency);
        self
    }

    /// Queue a response with no headers.
    pub fn push_response(&self, status: u16, body: impl Into<Bytes>) -> &Self {
        self.push_response_with_headers(status, HeaderMap::new(), body)
    }

    /// Queue a response with headers.
    pub fn push_response_with_headers(&self, status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> &Self {
        self.state().replies.push_back(Reply::Response {
            status,
            headers,
            body: body.into(),
        });
        self
    }

    /// Queue a transport failure.
    pub fn push_error(&self, error: TransportError) -> &Self {
        self.state().replies.push_back(Reply::Error(error));
        self
    }

    /// Every request seen so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    /// Number of requests seen so far.
    pub fn calls(&self) -> usize {
        self.state().requests.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, ctx: &RequestContext, request: TransportRequest) -> Result<TransportResponse> {
        let TransportRequest {
            method,
            url,
            headers,
            body,
            tls,
            follow_redirects,
        } = request;

        let drained = ctx.run(body.into_bytes()).await?;

        let latency = {
            let mut state = self.state();
            state.requests.push(RecordedRequest {
                method,
                url,
                headers,
                body: drained.as_ref().cloned().unwrap_or_default(),
                follow_redirects,
                has_tls: tls.is_some(),
            });
            state.latency
        };

        if let Err(e) = drained {
            return Err(TransportError::Body(e.to_string()));
        }

        if let Some(latency) = latency {
            ctx.run(tokio::time::sleep(latency)).await?;
        }

        match self.state().replies.pop_front() {
            Some(Reply::Response { status, headers, body }) => Ok(TransportResponse::from_bytes(status, headers, body)),
            Some(Reply::Error(error)) => Err(error),
            None => Ok(TransportResponse::from_bytes(200, HeaderMap::new(), Bytes::new())),
        }
    }
}
