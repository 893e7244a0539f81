//! Per-call request options.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use krest_core::ExponentialBackoff;
use krest_transport::{TlsConfig, TransportError, TransportResponse};
use serde::Serialize;

use crate::body::Body;

/// Decides whether an attempt should be retried.
///
/// Exactly one of the arguments is `Some`: the response when the transport
/// produced one, the error otherwise.
pub type RetryRule =
    Arc<dyn Fn(Option<&TransportResponse>, Option<&TransportError>) -> bool + Send + Sync>;

/// Retry on any transport error, on `423 Locked`, `425 Too Early`,
/// `429 Too Many Requests`, and on every `5xx`.
pub fn default_retry_rule(response: Option<&TransportResponse>, error: Option<&TransportError>) -> bool {
    if error.is_some() {
        return true;
    }
    match response {
        Some(response) => matches!(response.status, 423 | 425 | 429) || response.status >= 500,
        None => true,
    }
}

/// Retry settings for one call.
///
/// Zero values mean "use the default": one attempt, 300ms base delay and
/// 32s maximum delay, with [`default_retry_rule`].
#[derive(Clone, Default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles on every retry.
    pub base_delay: Duration,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Custom continuation rule.
    pub rule: Option<RetryRule>,
}

impl RetryPolicy {
    /// Default delay before the first retry.
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(300);

    /// Default cap for any single delay.
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

    /// Policy allowing `max_attempts` attempts with default delays.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Replace the continuation rule.
    pub fn with_rule<F>(mut self, rule: F) -> Self
    where
        F: Fn(Option<&TransportResponse>, Option<&TransportError>) -> bool + Send + Sync + 'static,
    {
        self.rule = Some(Arc::new(rule));
        self
    }

    /// Attempt limit after defaults are applied.
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Backoff schedule and continuation rule with every default applied.
    pub fn resolved(&self) -> (ExponentialBackoff, RetryRule) {
        let base_delay = if self.base_delay.is_zero() {
            Self::DEFAULT_BASE_DELAY
        } else {
            self.base_delay
        };
        let max_delay = if self.max_delay.is_zero() {
            Self::DEFAULT_MAX_DELAY
        } else {
            self.max_delay
        };
        let rule = self
            .rule
            .clone()
            .unwrap_or_else(|| Arc::new(default_retry_rule) as RetryRule);

        (
            ExponentialBackoff::new(base_delay, max_delay, self.effective_attempts()),
            rule,
        )
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("custom_rule", &self.rule.is_some())
            .finish()
    }
}

/// Value of a request header: one string or an ordered list of strings.
///
/// A list is sent as repeated headers, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValues {
    /// A single value.
    One(String),
    /// Several values for the same key.
    Many(Vec<String>),
}

impl HeaderValues {
    /// Iterate over the values in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            HeaderValues::One(value) => std::slice::from_ref(value),
            HeaderValues::Many(values) => values,
        };
        values.iter().map(String::as_str)
    }
}

impl From<&str> for HeaderValues {
    fn from(value: &str) -> Self {
        HeaderValues::One(value.to_string())
    }
}

impl From<String> for HeaderValues {
    fn from(value: String) -> Self {
        HeaderValues::One(value)
    }
}

impl From<Vec<String>> for HeaderValues {
    fn from(values: Vec<String>) -> Self {
        HeaderValues::Many(values)
    }
}

impl From<Vec<&str>> for HeaderValues {
    fn from(values: Vec<&str>) -> Self {
        HeaderValues::Many(values.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for HeaderValues {
    fn from(values: [&str; N]) -> Self {
        HeaderValues::Many(values.iter().map(|v| v.to_string()).collect())
    }
}

/// Request headers keyed by name.
pub type Headers = HashMap<String, HeaderValues>;

/// Optional arguments accepted by every verb.
///
/// ```rust
/// use krest::{Body, RequestData, RetryPolicy};
/// use std::time::Duration;
///
/// let data = RequestData::new()
///     .with_body("hello")
///     .with_header("Accept", ["text/plain", "application/json"])
///     .with_retry(RetryPolicy::new(3).with_base_delay(Duration::from_millis(50)));
/// assert!(matches!(data.body, Body::Text(_)));
/// ```
#[derive(Debug, Default)]
pub struct RequestData {
    /// Request body.
    pub body: Body,

    /// Request headers.
    pub headers: Headers,

    /// Retry settings.
    pub retry: RetryPolicy,

    /// TLS settings, e.g. for mutual TLS.
    pub tls: Option<Arc<TlsConfig>>,

    /// Follow up to 10 redirects. Off unless requested.
    pub follow_redirects: bool,

    /// Leave a successful response body unread and expose it as a reader.
    ///
    /// The caller must drain or drop the reader to release the connection.
    /// Reads stay bound to the call's context, so they fail once it is
    /// cancelled or the client timeout passes. Non-2xx responses are always
    /// buffered.
    pub stream: bool,
}

impl RequestData {
    /// Empty request options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body.
    pub fn with_json<T>(mut self, value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.body = Body::json(value);
        self
    }

    /// Set a header, replacing any previous value for `key`.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<HeaderValues>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set only the attempt limit.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    /// Use dedicated TLS settings.
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(Arc::new(tls));
        self
    }

    /// Use TLS settings shared across calls.
    ///
    /// Calls holding the same `Arc` reuse one connection pool.
    pub fn with_shared_tls(mut self, tls: Arc<TlsConfig>) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Follow redirects.
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Stream successful response bodies.
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Whether a header was set, ignoring ASCII case.
    pub fn has_header(&self, key: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(key))
    }
}
