//! Error types for the krest client
//!
//! Every request-scoped variant carries the method and URL of the call that
//! produced it, so an error message alone is enough to tell which request
//! failed and why.

use http::Method;
use krest_transport::TransportError;
use thiserror::Error;

/// Result type alias for operations that can fail with a krest error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the krest client.
#[derive(Debug, Error)]
pub enum Error {
    /// The URL could not be parsed.
    #[error("{method} {url}: invalid url: {source}")]
    InvalidUrl {
        /// Request method
        method: Method,
        /// Request URL as given by the caller
        url: String,
        /// Parse failure
        #[source]
        source: url::ParseError,
    },

    /// A header name or one of its values is not valid HTTP.
    #[error("{method} {url}: invalid header '{key}': {reason}")]
    InvalidHeader {
        /// Request method
        method: Method,
        /// Request URL
        url: String,
        /// Offending header key
        key: String,
        /// What was wrong with it
        reason: String,
    },

    /// A body that can only be read once was combined with retries.
    #[error("{method} {url}: can't retry a request whose body can only be read once (max_attempts = {max_attempts})")]
    SingleUseBody {
        /// Request method
        method: Method,
        /// Request URL
        url: String,
        /// Configured attempt limit
        max_attempts: u32,
    },

    /// The request body could not be produced.
    #[error("{method} {url}: error encoding request body: {message}")]
    Encoding {
        /// Request method
        method: Method,
        /// Request URL
        url: String,
        /// Description of the failure
        message: String,
    },

    /// The transport failed to complete the exchange.
    #[error("{method} {url}: {source}")]
    Transport {
        /// Request method
        method: Method,
        /// Request URL
        url: String,
        /// Underlying transport error
        #[source]
        source: TransportError,
    },

    /// The server answered with a status outside 200-299.
    #[error("{method} {url}: unexpected status code: {status}, payload: {payload}")]
    UnexpectedStatus {
        /// Request method
        method: Method,
        /// Request URL
        url: String,
        /// HTTP status code
        status: u16,
        /// Response body, lossily decoded as UTF-8
        payload: String,
    },

    /// The client itself could not be constructed.
    #[error("failed to build client: {0}")]
    Build(#[source] TransportError),

    /// Error raised by an interceptor.
    #[error("{0}")]
    Interceptor(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Several errors collected along the interceptor chain, oldest first.
    #[error("{}", join_messages(.0))]
    Aggregate(Vec<Error>),
}

fn join_messages(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Wrap an arbitrary error raised by an interceptor.
    pub fn interceptor<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Interceptor(err.into())
    }

    /// Combine two errors into one flat aggregate.
    ///
    /// Aggregates on either side are spliced in rather than nested, so the
    /// result is always a single level deep and keeps insertion order.
    pub fn append(self, other: Error) -> Error {
        let mut errors = match self {
            Error::Aggregate(errors) => errors,
            err => vec![err],
        };
        match other {
            Error::Aggregate(more) => errors.extend(more),
            err => errors.push(err),
        }
        Error::Aggregate(errors)
    }

    /// Whether the request was rejected before any I/O happened.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidUrl { .. } | Error::InvalidHeader { .. } | Error::SingleUseBody { .. }
        )
    }

    /// Whether the error is a transport failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    /// Whether the call was cut short by cancellation or its deadline.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Error::Transport {
                source: TransportError::Cancelled | TransportError::Timeout,
                ..
            }
        )
    }

    /// HTTP status carried by an [`Error::UnexpectedStatus`].
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The individual errors, in order. A non-aggregate error yields itself.
    pub fn errors(&self) -> &[Error] {
        match self {
            Error::Aggregate(errors) => errors,
            err => std::slice::from_ref(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(status: u16) -> Error {
        Error::UnexpectedStatus {
            method: Method::GET,
            url: "http://example.com/items".to_string(),
            status,
            payload: "nope".to_string(),
        }
    }

    #[test]
    fn test_unexpected_status_message() {
        let err = status_error(400);
        assert_eq!(
            err.to_string(),
            "GET http://example.com/items: unexpected status code: 400, payload: nope"
        );
        assert_eq!(err.status(), Some(400));
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_append_flattens_aggregates() {
        let first = Error::interceptor("first");
        let second = Error::interceptor("second");
        let third = Error::interceptor("third");

        let combined = first.append(second).append(third);
        let messages: Vec<_> = combined.errors().iter().map(ToString::to_string).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);

        let left = Error::interceptor("a").append(Error::interceptor("b"));
        let right = Error::interceptor("c").append(Error::interceptor("d"));
        let merged = left.append(right);
        assert_eq!(merged.errors().len(), 4);
        assert!(merged.errors().iter().all(|e| !matches!(e, Error::Aggregate(_))));
        assert_eq!(merged.to_string(), "a; b; c; d");
    }

    #[test]
    fn test_configuration_errors() {
        let err = Error::InvalidHeader {
            method: Method::POST,
            url: "http://example.com".to_string(),
            key: "X-Bad".to_string(),
            reason: "invalid value".to_string(),
        };
        assert!(err.is_configuration());
        assert!(err.to_string().contains("X-Bad"));

        let err = Error::SingleUseBody {
            method: Method::PUT,
            url: "http://example.com".to_string(),
            max_attempts: 3,
        };
        assert!(err.is_configuration());
        assert!(err.to_string().starts_with("PUT http://example.com"));
    }

    #[test]
    fn test_cancelled_transport_error() {
        let err = Error::Transport {
            method: Method::GET,
            url: "http://example.com".to_string(),
            source: TransportError::Timeout,
        };
        assert!(err.is_transport());
        assert!(err.is_cancelled());
        assert_eq!(err.errors().len(), 1);
    }
}
