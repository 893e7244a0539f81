//! The public client.

use std::sync::Arc;
use std::time::Duration;

use http::Method;
use krest_core::RequestContext;
use krest_transport::{HttpTransport, Transport};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::middleware::{Interceptor, Next, Outcome};
use crate::request::RequestData;

/// HTTP client with an interceptor chain around every call.
///
/// Cloning is cheap; clones share the transport, connection pool and
/// interceptors. Configure interceptors before the first call:
/// [`Client::add_middleware`] on a clone that is in use elsewhere copies the
/// chain instead of changing it for everyone.
///
/// # Example
///
/// ```rust,no_run
/// use krest::{Client, RequestContext, RequestData, TracingInterceptor};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), krest::Error> {
/// let client = Client::new(Duration::from_secs(10), vec![Arc::new(TracingInterceptor)])?;
///
/// let response = client
///     .get(&RequestContext::new(), "https://example.com/items", RequestData::new())
///     .await
///     .into_result()?;
/// println!("{}", response.text());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Clone)]
struct ClientInner {
    executor: Executor,
    interceptors: Vec<Arc<dyn Interceptor>>,
    timeout: Duration,
}

impl Client {
    /// Create a client over the default HTTP transport.
    ///
    /// `timeout` bounds each call as a whole, retries included. Zero
    /// disables it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Build`] if the HTTP transport cannot be created.
    pub fn new(timeout: Duration, interceptors: Vec<Arc<dyn Interceptor>>) -> Result<Self> {
        Self::from_config(ClientConfig::builder().timeout(timeout).build(), interceptors)
    }

    /// Create a client from a configuration object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Build`] if the HTTP transport cannot be created.
    pub fn from_config(config: ClientConfig, interceptors: Vec<Arc<dyn Interceptor>>) -> Result<Self> {
        let transport = HttpTransport::with_config(config.to_transport_config()).map_err(Error::Build)?;
        Ok(Self::with_transport(Arc::new(transport), config.timeout, interceptors))
    }

    /// Create a client over a custom transport.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        timeout: Duration,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                executor: Executor::new(transport),
                interceptors,
                timeout,
            }),
        }
    }

    /// Append interceptors to the end of the chain.
    pub fn add_middleware(&mut self, interceptors: impl IntoIterator<Item = Arc<dyn Interceptor>>) {
        Arc::make_mut(&mut self.inner).interceptors.extend(interceptors);
    }

    /// Number of registered interceptors.
    pub fn middleware_count(&self) -> usize {
        self.inner.interceptors.len()
    }

    /// Per-call deadline.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Send a request with an arbitrary method.
    pub async fn request(
        &self,
        ctx: &RequestContext,
        method: Method,
        url: impl Into<String>,
        data: RequestData,
    ) -> Outcome {
        let ctx = if self.inner.timeout.is_zero() {
            ctx.clone()
        } else {
            ctx.clone().with_timeout(self.inner.timeout)
        };
        Next::new(&self.inner.interceptors, &self.inner.executor)
            .run(&ctx, method, url.into(), data)
            .await
    }

    /// Send a `GET` request.
    pub async fn get(&self, ctx: &RequestContext, url: impl Into<String>, data: RequestData) -> Outcome {
        self.request(ctx, Method::GET, url, data).await
    }

    /// Send a `POST` request.
    pub async fn post(&self, ctx: &RequestContext, url: impl Into<String>, data: RequestData) -> Outcome {
        self.request(ctx, Method::POST, url, data).await
    }

    /// Send a `PUT` request.
    pub async fn put(&self, ctx: &RequestContext, url: impl Into<String>, data: RequestData) -> Outcome {
        self.request(ctx, Method::PUT, url, data).await
    }

    /// Send a `PATCH` request.
    pub async fn patch(&self, ctx: &RequestContext, url: impl Into<String>, data: RequestData) -> Outcome {
        self.request(ctx, Method::PATCH, url, data).await
    }

    /// Send a `DELETE` request.
    pub async fn delete(&self, ctx: &RequestContext, url: impl Into<String>, data: RequestData) -> Outcome {
        self.request(ctx, Method::DELETE, url, data).await
    }

    /// Send an `OPTIONS` request.
    pub async fn options(&self, ctx: &RequestContext, url: impl Into<String>, data: RequestData) -> Outcome {
        self.request(ctx, Method::OPTIONS, url, data).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("interceptors", &self.inner.interceptors.len())
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::DefaultHeadersInterceptor;
    use krest_transport::MockTransport;

    fn client(mock: &MockTransport, timeout: Duration) -> Client {
        Client::with_transport(Arc::new(mock.clone()), timeout, Vec::new())
    }

    #[tokio::test]
    async fn test_verbs_use_their_method() {
        let mock = MockTransport::new();
        let client = client(&mock, Duration::ZERO);
        let ctx = RequestContext::new();
        let url = "http://mock/items";

        client.get(&ctx, url, RequestData::new()).await;
        client.post(&ctx, url, RequestData::new()).await;
        client.put(&ctx, url, RequestData::new()).await;
        client.patch(&ctx, url, RequestData::new()).await;
        client.delete(&ctx, url, RequestData::new()).await;
        client.options(&ctx, url, RequestData::new()).await;

        let methods: Vec<_> = mock.requests().into_iter().map(|r| r.method).collect();
        assert_eq!(
            methods,
            vec![Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS]
        );
    }

    #[tokio::test]
    async fn test_add_middleware_is_copy_on_write() {
        let mock = MockTransport::new();
        let shared = client(&mock, Duration::ZERO);
        let mut extended = shared.clone();

        extended.add_middleware([Arc::new(DefaultHeadersInterceptor::new().header("X-Extra", "1")) as Arc<dyn Interceptor>]);

        assert_eq!(shared.middleware_count(), 0);
        assert_eq!(extended.middleware_count(), 1);

        let ctx = RequestContext::new();
        extended.get(&ctx, "http://mock/", RequestData::new()).await;
        shared.get(&ctx, "http://mock/", RequestData::new()).await;

        let sent = mock.requests();
        assert!(sent[0].headers.contains_key("x-extra"));
        assert!(!sent[1].headers.contains_key("x-extra"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds_the_whole_call() {
        let mock = MockTransport::new().with_latency(Duration::from_secs(5));
        let client = client(&mock, Duration::from_secs(1));

        let outcome = client.get(&RequestContext::new(), "http://mock/", RequestData::new()).await;

        let err = outcome.error.unwrap();
        assert!(err.is_cancelled(), "got {err}");
        assert_eq!(outcome.response.status, 0);
    }

    #[test]
    fn test_new_builds_http_transport() {
        let client = Client::new(Duration::from_secs(3), Vec::new()).unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(3));
        assert_eq!(client.middleware_count(), 0);
    }
}
