//! # krest
//!
//! HTTP client for REST APIs supporting:
//! - Interceptor chains that can rewrite requests, inspect outcomes and
//!   short-circuit calls
//! - Retries with exponential backoff and a pluggable retry rule
//! - Streaming `multipart/form-data` bodies that are never fully buffered
//! - Streaming response bodies for large downloads
//! - A single per-call deadline plus caller-driven cancellation
//!
//! Every call returns an [`Outcome`]: the response, if one was received,
//! together with an optional error. A non-2xx status yields both, so the
//! status and payload stay inspectable.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use krest::{Client, RequestContext, RequestData, RetryPolicy};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(Duration::from_secs(30), Vec::new())?;
//!
//!     let data = RequestData::new()
//!         .with_json(serde_json::json!({"name": "widget"}))
//!         .with_retry(RetryPolicy::new(3));
//!
//!     let response = client
//!         .post(&RequestContext::new(), "https://api.example.com/items", data)
//!         .await
//!         .into_result()?;
//!
//!     println!("{}: {}", response.status, response.text());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Re-export commonly used types
pub use body::Body;
pub use client::Client;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Error, Result};
pub use middleware::{
    DefaultHeadersInterceptor, Interceptor, Next, Outcome, RateLimitInterceptor, TracingInterceptor,
};
pub use multipart::{MultipartForm, MultipartStream, Part};
pub use provider::{MockHandler, MockProvider, Provider};
pub use request::{HeaderValues, Headers, RequestData, RetryPolicy, RetryRule, default_retry_rule};
pub use response::Response;

pub use krest_core::{Done, RequestContext};
pub use krest_transport::{TlsConfig, Transport, TransportError, TransportRequest, TransportResponse};

// Module declarations
pub mod body;
pub mod client;
pub mod config;
pub mod error;
mod executor;
pub mod middleware;
pub mod multipart;
pub mod provider;
pub mod request;
pub mod response;

pub use async_trait::async_trait;
pub use http::Method;

/// Prelude module for convenient imports.
///
/// ```rust
/// use krest::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Body, Client, ClientConfig, Error, Interceptor, Method, MultipartForm, Next, Outcome, Part, Provider,
        RequestContext, RequestData, Response, Result, RetryPolicy, async_trait,
    };
}
