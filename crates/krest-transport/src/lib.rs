#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Transport layer for krest
//!
//! The client core never touches sockets directly. Everything below the
//! request executor goes through the [`Transport`] trait defined here,
//! which sends one request and hands back a status, headers and a body
//! reader.
//!
//! # Architecture
//!
//! - **Transport trait**: one blocking-until-headers call, abortable through
//!   a [`RequestContext`](krest_core::RequestContext)
//! - **HTTP transport**: reqwest with rustls, connection pooling and
//!   opt-in redirects
//! - **Mock transport**: scripted replies and request capture for tests
//!
//! # Usage
//!
//! ```ignore
//! use krest_core::RequestContext;
//! use krest_transport::{HttpTransport, Transport, TransportRequest};
//!
//! let transport = HttpTransport::new()?;
//! let request = TransportRequest::new(http::Method::GET, "https://example.com/health");
//! let response = transport.send(&RequestContext::new(), request).await?;
//! let body = response.into_bytes().await?;
//! ```

pub mod error;
pub mod http;
pub mod mock;
pub mod tls;
pub mod traits;

// Re-export commonly used types
pub use error::{Result, TransportError};
pub use http::{HttpTransport, HttpTransportConfig};
pub use mock::{MockTransport, RecordedRequest};
pub use tls::TlsConfig;
pub use traits::{
    RequestReader, ResponseReader, Transport, TransportBody, TransportRequest, TransportResponse,
};
