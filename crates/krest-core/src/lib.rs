#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Core primitives for the krest HTTP client.
//!
//! This crate holds the pieces of request execution that do not depend on
//! any particular transport:
//!
//! - **Cancellation** via [`RequestContext`], a cancellation token paired
//!   with an optional deadline that every suspension point races against
//! - **Retry with exponential backoff** via [`retry::retry`] and the
//!   [`BackoffStrategy`] trait
//! - **A bounded byte relay** via [`relay::channel`], used to decouple a
//!   producer task from a pull-based reader
//!
//! # Examples
//!
//! ```rust
//! use krest_core::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let ctx = RequestContext::new().with_timeout(Duration::from_secs(5));
//! let backoff = ExponentialBackoff::builder()
//!     .max_attempts(3)
//!     .base_delay(Duration::from_millis(10))
//!     .build();
//!
//! // Retries while the closure asks for it, at most 3 attempts in total.
//! let attempts = backoff.run(&ctx, || async { false }).await;
//! assert_eq!(attempts, 1);
//! # }
//! ```

pub mod context;
pub mod relay;
pub mod retry;

pub use context::{ContextReader, Done, RequestContext};
pub use retry::{BackoffStrategy, ExponentialBackoff, ExponentialBackoffBuilder, Retried};

/// Convenient re-exports of commonly used items.
///
/// ```rust
/// use krest_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::context::{ContextReader, Done, RequestContext};
    pub use crate::relay::{RelayReader, RelaySender};
    pub use crate::retry::{BackoffStrategy, ExponentialBackoff, ExponentialBackoffBuilder, retry};
}
