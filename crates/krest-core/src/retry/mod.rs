//! Retry with exponential backoff.
//!
//! This module provides the retry loop used around every transport call,
//! parameterised by a [`BackoffStrategy`] and driven by a continuation
//! decision returned from each attempt.
//!
//! # Key Types
//!
//! - [`retry()`] - The retry loop itself
//! - [`BackoffStrategy`] - How long to wait and how many attempts to make
//! - [`ExponentialBackoff`] - Doubling delays capped at a maximum
//!
//! # Examples
//!
//! ```rust
//! use krest_core::RequestContext;
//! use krest_core::retry::{retry, ExponentialBackoff};
//! use std::ops::ControlFlow;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let backoff = ExponentialBackoff::builder()
//!     .max_attempts(4)
//!     .base_delay(Duration::from_millis(1))
//!     .build();
//!
//! let outcome = retry(&RequestContext::new(), &backoff, |attempt| async move {
//!     if attempt < 3 {
//!         ControlFlow::Continue(attempt)
//!     } else {
//!         ControlFlow::Break(attempt)
//!     }
//! })
//! .await;
//!
//! assert_eq!(outcome.value, 3);
//! assert_eq!(outcome.attempts, 3);
//! # }
//! ```

mod exponential;
mod strategy;

pub use exponential::{ExponentialBackoff, ExponentialBackoffBuilder};
pub use strategy::{BackoffStrategy, Retried, retry};
