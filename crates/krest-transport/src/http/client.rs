//! HTTP transport client implementation
//!
//! Implements the Transport trait on top of reqwest with connection pooling,
//! HTTP/2 and streamed request and response bodies.

use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportBody, TransportRequest, TransportResponse};
use async_trait::async_trait;
use futures::TryStreamExt;
use krest_core::RequestContext;
use reqwest::Client as ReqwestClient;
use reqwest::redirect::Policy;
use crate::tls::TlsConfig;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::io::{ReaderStream, StreamReader};

/// Redirect hops followed when a request opts into redirects.
pub const MAX_REDIRECTS: usize = 10;

/// Clients kept for requests carrying their own TLS settings.
const TLS_CLIENT_CACHE: usize = 8;

struct TlsClient {
    tls: Arc<TlsConfig>,
    follow_redirects: bool,
    client: ReqwestClient,
}

/// HTTP transport implementation
///
/// Handles HTTP requests with:
/// - Connection pooling shared across clones
/// - HTTP/2 support
/// - Redirects only when the request asks for them
/// - A dedicated pool per `Arc<TlsConfig>`, reused by every request that
///   carries the same `Arc`; the most recently built pools are kept
#[derive(Clone)]
pub struct HttpTransport {
    direct: ReqwestClient,
    redirecting: ReqwestClient,
    tls_clients: Arc<Mutex<VecDeque<TlsClient>>>,
    config: Arc<HttpTransportConfig>,
}

impl HttpTransport {
    /// Create a new HTTP transport with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(Default::default())
    }

    /// Create a new HTTP transport with custom configuration
    pub fn with_config(config: HttpTransportConfig) -> Result<Self> {
        let direct = build_client(client_builder(&config, false))?;
        let redirecting = build_client(client_builder(&config, true))?;

        Ok(Self {
            direct,
            redirecting,
            tls_clients: Arc::new(Mutex::new(VecDeque::with_capacity(TLS_CLIENT_CACHE))),
            config: Arc::new(config),
        })
    }

    /// The configuration this transport was built with.
    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    fn client_for(&self, request: &TransportRequest) -> Result<ReqwestClient> {
        match &request.tls {
            Some(tls) => self.tls_client(tls, request.follow_redirects),
            None if request.follow_redirects => Ok(self.redirecting.clone()),
            None => Ok(self.direct.clone()),
        }
    }

    fn tls_client(&self, tls: &Arc<TlsConfig>, follow_redirects: bool) -> Result<ReqwestClient> {
        let mut cache = self.tls_clients.lock().unwrap_or_else(PoisonError::into_inner);

        let cached = cache
            .iter()
            .find(|entry| Arc::ptr_eq(&entry.tls, tls) && entry.follow_redirects == follow_redirects);
        if let Some(entry) = cached {
            return Ok(entry.client.clone());
        }

        let client = tls
            .apply(client_builder(&self.config, follow_redirects))?
            .build()
            .map_err(|e| TransportError::Tls(e.to_string()))?;

        if cache.len() == TLS_CLIENT_CACHE {
            cache.pop_front();
        }
        cache.push_back(TlsClient {
            tls: Arc::clone(tls),
            follow_redirects,
            client: client.clone(),
        });
        tracing::debug!(cached = cache.len(), "built client for custom TLS settings");

        Ok(client)
    }
}

fn client_builder(config: &HttpTransportConfig, follow_redirects: bool) -> reqwest::ClientBuilder {
    let policy = if follow_redirects {
        Policy::limited(MAX_REDIRECTS)
    } else {
        Policy::none()
    };

    let mut builder = ReqwestClient::builder()
        .connect_timeout(config.connect_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(config.pool_idle_timeout)
        .tcp_keepalive(config.tcp_keepalive)
        .redirect(policy);

    if let Some(user_agent) = &config.user_agent {
        builder = builder.user_agent(user_agent.clone());
    }

    builder
}

fn build_client(builder: reqwest::ClientBuilder) -> Result<ReqwestClient> {
    builder.build().map_err(|e| TransportError::Http(e.to_string()))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, ctx: &RequestContext, request: TransportRequest) -> Result<TransportResponse> {
        let client = self.client_for(&request)?;

        let mut req = client.request(request.method, &request.url).headers(request.headers);

        req = match request.body {
            TransportBody::Empty => req,
            TransportBody::Bytes(bytes) => req.body(bytes),
            TransportBody::Reader(reader) => req.body(reqwest::Body::wrap_stream(ReaderStream::new(reader))),
        };

        let response = ctx.run(req.send()).await??;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        tracing::trace!(status, url = %response.url(), "response head received");

        let body = StreamReader::new(response.bytes_stream().map_err(io::Error::other));

        Ok(TransportResponse::new(status, headers, Box::pin(body)))
    }
}

/// HTTP transport configuration
#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    /// Connection timeout
    pub connect_timeout: Duration,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,

    /// How long an idle pooled connection is kept
    pub pool_idle_timeout: Duration,

    /// TCP keepalive interval
    pub tcp_keepalive: Duration,

    /// User-Agent sent with every request, unless the request sets one
    pub user_agent: Option<String>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 100,
            pool_idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_transport_creation() {
        let transport = HttpTransport::new().expect("Failed to create transport");
        assert_eq!(transport.config().pool_max_idle_per_host, 100);
    }

    #[test]
    fn test_http_transport_with_config() {
        let config = HttpTransportConfig {
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 5,
            user_agent: Some("krest-test/1.0".to_string()),
            ..Default::default()
        };

        let transport = HttpTransport::with_config(config).expect("Failed to create transport");
        assert_eq!(transport.config().connect_timeout, Duration::from_secs(10));
        assert_eq!(transport.config().user_agent.as_deref(), Some("krest-test/1.0"));
    }

    #[test]
    fn test_client_for_tls_request_builds_dedicated_client() {
        let transport = HttpTransport::new().unwrap();
        let request = TransportRequest::new(http::Method::GET, "https://localhost")
            .with_tls(Arc::new(TlsConfig::default().danger_accept_invalid_certs(true)));

        assert!(transport.client_for(&request).is_ok());
    }

    fn cached_tls_clients(transport: &HttpTransport) -> usize {
        transport.tls_clients.lock().unwrap().len()
    }

    #[test]
    fn test_tls_client_reused_for_same_config() {
        let transport = HttpTransport::new().unwrap();
        let tls = Arc::new(TlsConfig::default().danger_accept_invalid_certs(true));
        let request = || TransportRequest::new(http::Method::GET, "https://localhost").with_tls(Arc::clone(&tls));

        transport.client_for(&request()).unwrap();
        transport.client_for(&request()).unwrap();
        assert_eq!(cached_tls_clients(&transport), 1);

        let other = TransportRequest::new(http::Method::GET, "https://localhost")
            .with_tls(Arc::new(TlsConfig::default()));
        transport.client_for(&other).unwrap();
        assert_eq!(cached_tls_clients(&transport), 2);

        let redirecting = request().with_follow_redirects(true);
        transport.client_for(&redirecting).unwrap();
        assert_eq!(cached_tls_clients(&transport), 3);
    }

    #[test]
    fn test_tls_client_cache_is_bounded() {
        let transport = HttpTransport::new().unwrap();
        let first = Arc::new(TlsConfig::default());
        transport
            .client_for(&TransportRequest::new(http::Method::GET, "https://localhost").with_tls(Arc::clone(&first)))
            .unwrap();

        for _ in 0..TLS_CLIENT_CACHE {
            let request = TransportRequest::new(http::Method::GET, "https://localhost")
                .with_tls(Arc::new(TlsConfig::default()));
            transport.client_for(&request).unwrap();
        }

        assert_eq!(cached_tls_clients(&transport), TLS_CLIENT_CACHE);
        let cache = transport.tls_clients.lock().unwrap();
        assert!(!cache.iter().any(|entry| Arc::ptr_eq(&entry.tls, &first)));
    }

    #[test]
    fn test_invalid_user_agent_is_http_error() {
        let config = HttpTransportConfig {
            user_agent: Some("bad\nagent".to_string()),
            ..Default::default()
        };

        let err = HttpTransport::with_config(config).err().expect("invalid user agent accepted");
        assert!(matches!(err, TransportError::Http(_)), "got {err:?}");
    }
}
