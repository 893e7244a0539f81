//! Transport error types

use krest_core::Done;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while sending a request or reading its response.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// The request deadline passed before the exchange completed.
    #[error("request deadline exceeded")]
    Timeout,

    /// Connection could not be established.
    #[error("connection error: {0}")]
    Connect(String),

    /// TLS configuration was rejected.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Request or protocol level failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Request or response body could not be streamed.
    #[error("body error: {0}")]
    Body(String),
}

impl TransportError {
    /// Whether the error comes from the caller's context rather than the
    /// network.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the error is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<Done> for TransportError {
    fn from(done: Done) -> Self {
        match done {
            Done::Cancelled => Self::Cancelled,
            Done::DeadlineExceeded => Self::Timeout,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Body(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}
