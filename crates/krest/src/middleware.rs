//! Interceptor chain wrapped around request execution.
//!
//! Interceptors run in registration order on the way in and in reverse
//! order on the way out. Each one receives the request by value together
//! with a [`Next`] handle; calling [`Next::run`] hands the (possibly
//! modified) request to the rest of the chain, and not calling it
//! short-circuits everything downstream, the network call included.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use http::Method;
use krest_core::RequestContext;

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::request::{HeaderValues, RequestData};
use crate::response::Response;

/// The (response, error) pair produced by every call.
///
/// The response is populated whenever one was received, including alongside
/// an [`Error::UnexpectedStatus`].
#[derive(Debug, Default)]
pub struct Outcome {
    /// Response, zero-valued if none was received.
    pub response: Response,

    /// Error, if the call failed.
    pub error: Option<Error>,
}

impl Outcome {
    /// Pair a response with an optional error.
    pub fn new(response: Response, error: Option<Error>) -> Self {
        Self { response, error }
    }

    /// Successful outcome.
    pub fn ok(response: Response) -> Self {
        Self::new(response, None)
    }

    /// Failed outcome with an empty response.
    pub fn err(error: Error) -> Self {
        Self::new(Response::default(), Some(error))
    }

    /// Whether no error was recorded.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Record another error, flattening into an aggregate if one is
    /// already present.
    pub fn append_error(&mut self, error: Error) {
        self.error = Some(match self.error.take() {
            Some(existing) => existing.append(error),
            None => error,
        });
    }

    /// Discard the response on error.
    pub fn into_result(self) -> Result<Response> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.response),
        }
    }

    /// Split into response and error.
    pub fn into_parts(self) -> (Response, Option<Error>) {
        (self.response, self.error)
    }
}

/// Observes or rewrites a request and its outcome.
///
/// # Example
///
/// ```rust
/// use krest::{Interceptor, Method, Next, Outcome, RequestContext, RequestData};
///
/// struct Auth(String);
///
/// #[krest::async_trait]
/// impl Interceptor for Auth {
///     async fn intercept(
///         &self,
///         ctx: &RequestContext,
///         method: Method,
///         url: String,
///         data: RequestData,
///         next: Next<'_>,
///     ) -> Outcome {
///         let data = data.with_header("Authorization", format!("Bearer {}", self.0));
///         next.run(ctx, method, url, data).await
///     }
/// }
/// ```
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Handle one call. Call `next.run(..)` at most once to continue.
    async fn intercept(
        &self,
        ctx: &RequestContext,
        method: Method,
        url: String,
        data: RequestData,
        next: Next<'_>,
    ) -> Outcome;
}

/// Continuation handed to an [`Interceptor`].
///
/// A cursor over the interceptors that have not run yet, ending at the
/// request executor. Running it consumes it.
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Interceptor>],
    executor: &'a Executor,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Interceptor>], executor: &'a Executor) -> Self {
        Self {
            remaining: chain,
            executor,
        }
    }

    /// Number of interceptors still ahead of the executor.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Continue down the chain.
    pub async fn run(self, ctx: &RequestContext, method: Method, url: String, data: RequestData) -> Outcome {
        match self.remaining.split_first() {
            Some((interceptor, rest)) => {
                let next = Next {
                    remaining: rest,
                    executor: self.executor,
                };
                interceptor.intercept(ctx, method, url, data, next).await
            }
            None => self.executor.execute(ctx, method, url, data).await,
        }
    }
}

/// Interceptor that logs every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInterceptor;

#[async_trait]
impl Interceptor for TracingInterceptor {
    async fn intercept(
        &self,
        ctx: &RequestContext,
        method: Method,
        url: String,
        data: RequestData,
        next: Next<'_>,
    ) -> Outcome {
        tracing::debug!(%method, %url, "sending request");
        let started = Instant::now();

        let outcome = next.run(ctx, method.clone(), url.clone(), data).await;

        let elapsed = started.elapsed();
        match &outcome.error {
            None => tracing::debug!(%method, %url, status = outcome.response.status, ?elapsed, "request succeeded"),
            Some(err) => tracing::warn!(%method, %url, status = outcome.response.status, ?elapsed, error = %err, "request failed"),
        }
        outcome
    }
}

/// Interceptor that throttles calls with a token bucket.
pub struct RateLimitInterceptor {
    limiter: DefaultDirectRateLimiter,
}

impl RateLimitInterceptor {
    /// Allow `requests_per_second` calls per second.
    ///
    /// If `requests_per_second` is 0, defaults to 1 request per second.
    pub fn new(requests_per_second: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        }
    }
}

#[async_trait]
impl Interceptor for RateLimitInterceptor {
    async fn intercept(
        &self,
        ctx: &RequestContext,
        method: Method,
        url: String,
        data: RequestData,
        next: Next<'_>,
    ) -> Outcome {
        if let Err(reason) = ctx.run(self.limiter.until_ready()).await {
            return Outcome::err(Error::Transport {
                method,
                url,
                source: reason.into(),
            });
        }
        next.run(ctx, method, url, data).await
    }
}

/// Interceptor adding headers the caller did not set.
#[derive(Debug, Default, Clone)]
pub struct DefaultHeadersInterceptor {
    headers: Vec<(String, HeaderValues)>,
}

impl DefaultHeadersInterceptor {
    /// No default headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a default header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<HeaderValues>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

#[async_trait]
impl Interceptor for DefaultHeadersInterceptor {
    async fn intercept(
        &self,
        ctx: &RequestContext,
        method: Method,
        url: String,
        mut data: RequestData,
        next: Next<'_>,
    ) -> Outcome {
        for (key, value) in &self.headers {
            if !data.has_header(key) {
                data.headers.insert(key.clone(), value.clone());
            }
        }
        next.run(ctx, method, url, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krest_transport::MockTransport;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        call_next: bool,
    }

    #[async_trait]
    impl Interceptor for Recorder {
        async fn intercept(
            &self,
            ctx: &RequestContext,
            method: Method,
            url: String,
            data: RequestData,
            next: Next<'_>,
        ) -> Outcome {
            self.log.lock().unwrap().push(format!("{}:before", self.name));
            let outcome = if self.call_next {
                next.run(ctx, method, url, data).await
            } else {
                Outcome::ok(Response::new(418))
            };
            self.log.lock().unwrap().push(format!("{}:after", self.name));
            outcome
        }
    }

    fn executor(mock: &MockTransport) -> Executor {
        Executor::new(Arc::new(mock.clone()))
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let mock = MockTransport::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Recorder { name: "a", log: log.clone(), call_next: true }),
            Arc::new(Recorder { name: "b", log: log.clone(), call_next: true }),
        ];
        let executor = executor(&mock);

        let outcome = Next::new(&chain, &executor)
            .run(&RequestContext::new(), Method::GET, "http://mock/".to_string(), RequestData::new())
            .await;

        assert!(outcome.is_ok());
        assert_eq!(mock.calls(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["a:before", "b:before", "b:after", "a:after"]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_downstream() {
        let mock = MockTransport::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Recorder { name: "a", log: log.clone(), call_next: false }),
            Arc::new(Recorder { name: "b", log: log.clone(), call_next: true }),
        ];
        let executor = executor(&mock);

        let outcome = Next::new(&chain, &executor)
            .run(&RequestContext::new(), Method::GET, "http://mock/".to_string(), RequestData::new())
            .await;

        assert_eq!(outcome.response.status, 418);
        assert_eq!(mock.calls(), 0);
        assert_eq!(*log.lock().unwrap(), vec!["a:before", "a:after"]);
    }

    #[tokio::test]
    async fn test_default_headers_do_not_override() {
        let mock = MockTransport::new();
        let chain: Vec<Arc<dyn Interceptor>> = vec![Arc::new(
            DefaultHeadersInterceptor::new()
                .header("User-Agent", "krest-test")
                .header("Accept", "application/json"),
        )];
        let executor = executor(&mock);
        let data = RequestData::new().with_header("accept", "text/plain");

        Next::new(&chain, &executor)
            .run(&RequestContext::new(), Method::GET, "http://mock/".to_string(), data)
            .await;

        let sent = &mock.requests()[0];
        assert_eq!(sent.headers["user-agent"], "krest-test");
        assert_eq!(sent.headers["accept"], "text/plain");
        assert_eq!(sent.headers.get_all("accept").iter().count(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_passes_through() {
        let mock = MockTransport::new();
        let chain: Vec<Arc<dyn Interceptor>> = vec![Arc::new(RateLimitInterceptor::new(0))];
        let executor = executor(&mock);

        let outcome = Next::new(&chain, &executor)
            .run(&RequestContext::new(), Method::GET, "http://mock/".to_string(), RequestData::new())
            .await;

        assert!(outcome.is_ok());
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_tracing_interceptor_preserves_outcome() {
        let mock = MockTransport::new();
        mock.push_response(503, "down");
        let chain: Vec<Arc<dyn Interceptor>> = vec![Arc::new(TracingInterceptor)];
        let executor = executor(&mock);

        let outcome = Next::new(&chain, &executor)
            .run(&RequestContext::new(), Method::GET, "http://mock/".to_string(), RequestData::new())
            .await;

        assert_eq!(outcome.response.status, 503);
        assert_eq!(outcome.error.and_then(|e| e.status()), Some(503));
    }

    #[test]
    fn test_outcome_append_error_flattens() {
        let mut outcome = Outcome::ok(Response::new(200));
        outcome.append_error(Error::interceptor("one"));
        outcome.append_error(Error::interceptor("two"));
        outcome.append_error(Error::interceptor("three"));

        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.errors().len(), 3);
        assert_eq!(err.to_string(), "one; two; three");
    }

    #[test]
    fn test_interceptors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TracingInterceptor>();
        assert_send_sync::<RateLimitInterceptor>();
        assert_send_sync::<DefaultHeadersInterceptor>();
    }
}
