//! The retry loop and the strategy trait it is parameterised by.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use crate::context::{Done, RequestContext};

/// A strategy deciding how many attempts to make and how long to wait
/// between them.
///
/// # Examples
///
/// ```rust
/// use krest_core::retry::BackoffStrategy;
/// use std::time::Duration;
///
/// struct Fixed;
///
/// impl BackoffStrategy for Fixed {
///     fn next_delay(&self, _retry: u32) -> Duration {
///         Duration::from_millis(50)
///     }
///
///     fn max_attempts(&self) -> u32 {
///         5
///     }
/// }
/// ```
pub trait BackoffStrategy: Send + Sync {
    /// Delay to wait before retry number `retry` (0-indexed).
    ///
    /// `next_delay(0)` is slept after the first attempt and before the
    /// second one.
    fn next_delay(&self, retry: u32) -> Duration;

    /// Total number of attempts, including the first one.
    ///
    /// Values below 1 are treated as 1 by [`retry()`].
    fn max_attempts(&self) -> u32;
}

/// Result of a [`retry()`] loop.
#[derive(Debug)]
pub struct Retried<T> {
    /// Value produced by the last attempt that ran.
    pub value: T,

    /// Number of attempts that ran (always at least 1).
    pub attempts: u32,

    /// Set when the context finished during a backoff sleep.
    pub interrupted: Option<Done>,
}

/// Run `attempt` until it breaks, the attempt budget runs out, or `ctx`
/// finishes.
///
/// `attempt` receives the 1-based attempt number and returns
/// [`ControlFlow::Continue`] to ask for another attempt or
/// [`ControlFlow::Break`] to stop. Either way the carried value becomes the
/// result if no further attempt runs. `attempt` always runs at least once;
/// the context is only consulted between attempts.
pub async fn retry<S, F, Fut, T>(ctx: &RequestContext, strategy: &S, mut attempt: F) -> Retried<T>
where
    S: BackoffStrategy + ?Sized,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ControlFlow<T, T>>,
{
    let max_attempts = strategy.max_attempts().max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let value = match attempt(attempts).await {
            ControlFlow::Break(value) => {
                return Retried {
                    value,
                    attempts,
                    interrupted: None,
                };
            }
            ControlFlow::Continue(value) => value,
        };

        if attempts >= max_attempts {
            return Retried {
                value,
                attempts,
                interrupted: None,
            };
        }

        let delay = strategy.next_delay(attempts - 1);
        #[cfg(feature = "tracing")]
        tracing::debug!(attempt = attempts, ?delay, "retrying after backoff");

        if let Err(reason) = ctx.run(tokio::time::sleep(delay)).await {
            #[cfg(feature = "tracing")]
            tracing::debug!(attempt = attempts, %reason, "backoff interrupted");
            return Retried {
                value,
                attempts,
                interrupted: Some(reason),
            };
        }
    }
}
