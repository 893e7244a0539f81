//! Transport trait and the request/response types it exchanges.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use krest_core::RequestContext;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Result, TransportError};
use crate::tls::TlsConfig;

/// Reader feeding a request body to the transport.
pub type RequestReader = Pin<Box<dyn AsyncRead + Send + Sync>>;

/// Reader over a response body as it arrives from the network.
pub type ResponseReader = Pin<Box<dyn AsyncRead + Send>>;

/// Body handed to a transport.
pub enum TransportBody {
    /// No body.
    Empty,

    /// Fully materialised bytes.
    Bytes(Bytes),

    /// Pull-based reader, consumed exactly once.
    Reader(RequestReader),
}

impl TransportBody {
    /// Wrap any reader as a body.
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        Self::Reader(Box::pin(reader))
    }

    /// Drain the body into memory.
    pub async fn into_bytes(self) -> std::io::Result<Bytes> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Bytes(bytes) => Ok(bytes),
            Self::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

impl fmt::Debug for TransportBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// HTTP request specification
///
/// Everything the transport needs to perform one exchange.
#[derive(Debug)]
pub struct TransportRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: Method,

    /// Absolute request URL
    pub url: String,

    /// Request headers, multi-valued headers kept in order
    pub headers: HeaderMap,

    /// Request body
    pub body: TransportBody,

    /// TLS settings for this request, if they differ from the defaults
    pub tls: Option<Arc<TlsConfig>>,

    /// Whether 3xx responses should be followed
    pub follow_redirects: bool,
}

impl TransportRequest {
    /// Create a new request without body or headers.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: TransportBody::Empty,
            tls: None,
            follow_redirects: false,
        }
    }

    /// Append a header to the request.
    pub fn with_header(mut self, key: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(key, value);
        self
    }

    /// Set the request body
    pub fn with_body(mut self, body: TransportBody) -> Self {
        self.body = body;
        self
    }

    /// Use a dedicated TLS configuration.
    pub fn with_tls(mut self, tls: Arc<TlsConfig>) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Follow redirects for this request.
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }
}

/// HTTP response
///
/// Status and headers are available as soon as the transport returns; the
/// body is still attached to the connection until `body` is drained or
/// dropped.
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,

    /// Response headers
    pub headers: HeaderMap,

    /// Response body
    pub body: ResponseReader,
}

impl TransportResponse {
    /// Create a new response
    pub fn new(status: u16, headers: HeaderMap, body: ResponseReader) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Create a response whose body is already in memory.
    pub fn from_bytes(status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self::new(status, headers, Box::pin(std::io::Cursor::new(body.into())))
    }

    /// Check if response is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Read the whole body, releasing the connection.
    pub async fn into_bytes(mut self) -> Result<Bytes> {
        let mut buf = Vec::new();
        self.body
            .read_to_end(&mut buf)
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;
        Ok(Bytes::from(buf))
    }

    /// Read the whole body unless `ctx` finishes first.
    pub async fn read_to_end(self, ctx: &RequestContext) -> Result<Bytes> {
        ctx.run(self.into_bytes()).await?
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Generic transport trait
///
/// Implementations perform a single HTTP exchange. They must stop waiting
/// and drop any in-flight connection as soon as `ctx` is done, reporting
/// [`TransportError::Cancelled`] or [`TransportError::Timeout`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return once the response head has arrived.
    async fn send(&self, ctx: &RequestContext, request: TransportRequest) -> Result<TransportResponse>;
}
