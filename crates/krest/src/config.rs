//! Configuration for the krest client

use std::time::Duration;

use krest_transport::HttpTransportConfig;

/// Default overall deadline for a single call, retries included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for creating a [`Client`](crate::Client).
///
/// Interceptors are not part of the configuration; they are passed to the
/// constructor alongside it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline shared by every attempt, backoff sleep and body read of one
    /// call. Zero disables it.
    pub timeout: Duration,

    /// Maximum time to establish a connection
    pub connect_timeout: Duration,

    /// Maximum number of idle connections kept per host
    pub pool_max_idle_per_host: usize,

    /// How long an idle connection stays in the pool
    pub pool_idle_timeout: Duration,

    /// TCP keep-alive interval
    pub tcp_keepalive: Duration,

    /// `User-Agent` sent when the request does not set one
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let transport = HttpTransportConfig::default();
        Self {
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: transport.connect_timeout,
            pool_max_idle_per_host: transport.pool_max_idle_per_host,
            pool_idle_timeout: transport.pool_idle_timeout,
            tcp_keepalive: transport.tcp_keepalive,
            user_agent: transport.user_agent,
        }
    }
}

impl ClientConfig {
    /// Create a new builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// This will look for:
    /// - `KREST_TIMEOUT` for the per-call deadline (in seconds)
    /// - `KREST_CONNECT_TIMEOUT` for the connect timeout (in seconds)
    /// - `KREST_POOL_MAX_IDLE_PER_HOST` for the idle pool size
    /// - `KREST_USER_AGENT` for the default user agent
    ///
    /// Unset or unparsable variables keep their defaults.
    #[cfg(feature = "env")]
    pub fn from_env() -> Self {
        use std::env;

        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u64>("KREST_TIMEOUT") {
            config.timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_var::<u64>("KREST_CONNECT_TIMEOUT") {
            config.connect_timeout = Duration::from_secs(secs);
        }

        if let Some(size) = parse_var::<usize>("KREST_POOL_MAX_IDLE_PER_HOST") {
            config.pool_max_idle_per_host = size;
        }

        if let Ok(user_agent) = env::var("KREST_USER_AGENT")
            && !user_agent.is_empty()
        {
            config.user_agent = Some(user_agent);
        }

        config
    }

    /// Transport settings derived from this configuration.
    pub fn to_transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            connect_timeout: self.connect_timeout,
            pool_max_idle_per_host: self.pool_max_idle_per_host,
            pool_idle_timeout: self.pool_idle_timeout,
            tcp_keepalive: self.tcp_keepalive,
            user_agent: self.user_agent.clone(),
        }
    }
}

#[cfg(feature = "env")]
fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment variable");
            None
        }
    }
}

/// Builder for creating ClientConfig with a fluent API.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-call deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the idle pool size per host.
    pub fn pool_max_idle_per_host(mut self, size: usize) -> Self {
        self.config.pool_max_idle_per_host = size;
        self
    }

    /// Set the idle connection timeout.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the TCP keep-alive interval.
    pub fn tcp_keepalive(mut self, interval: Duration) -> Self {
        self.config.tcp_keepalive = interval;
        self
    }

    /// Set the default user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
