//! HTTP transport implementation
//!
//! Provides a reqwest-backed client that implements the Transport trait.
//! Retries, middleware and body encoding live above this layer; the
//! transport only moves bytes.

pub mod client;

pub use client::{HttpTransport, HttpTransportConfig, MAX_REDIRECTS};
