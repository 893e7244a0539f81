//! Exponential backoff with optional jitter.

use super::strategy::{BackoffStrategy, retry};
use crate::context::RequestContext;
use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(300);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Exponential backoff strategy.
///
/// The delay before attempt `k` (for `k > 1`) is
/// `min(base_delay * multiplier^(k-2), max_delay)`.
///
/// # Mathematical Formula
///
/// For retry `n` (0-indexed, slept after attempt `n + 1`):
/// ```text
/// raw_delay    = base_delay * (multiplier ^ n)
/// jittered     = raw_delay + raw_delay * jitter * random(-0.5, +0.5)
/// final_delay  = min(jittered, max_delay)
/// ```
///
/// Jitter defaults to zero, which makes the schedule exact.
///
/// # Examples
///
/// ```rust
/// use krest_core::retry::{BackoffStrategy, ExponentialBackoff};
/// use std::time::Duration;
///
/// let backoff = ExponentialBackoff::builder()
///     .max_attempts(5)
///     .base_delay(Duration::from_millis(100))
///     .max_delay(Duration::from_millis(250))
///     .build();
///
/// assert_eq!(backoff.next_delay(0), Duration::from_millis(100));
/// assert_eq!(backoff.next_delay(1), Duration::from_millis(200));
/// assert_eq!(backoff.next_delay(2), Duration::from_millis(250));
/// ```
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: f64,
}

impl ExponentialBackoff {
    /// Doubling backoff from `base_delay` up to `max_delay`, for at most
    /// `max_attempts` attempts in total.
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            ..Self::default()
        }
    }

    /// Create a new builder for configuring exponential backoff.
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    /// Initial delay.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Upper bound for any single delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Repeat `attempt` while it returns `true`, returning how many attempts
    /// ran.
    ///
    /// This is the boolean form of [`retry()`](super::retry): `attempt`
    /// answers "should this be retried?".
    ///
    /// # Examples
    ///
    /// ```rust
    /// use krest_core::{ExponentialBackoff, RequestContext};
    /// use std::time::Duration;
    ///
    /// # async fn example() {
    /// let backoff = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(4), 3);
    /// let attempts = backoff.run(&RequestContext::new(), || async { true }).await;
    /// assert_eq!(attempts, 3);
    /// # }
    /// ```
    pub async fn run<F, Fut>(&self, ctx: &RequestContext, mut attempt: F) -> u32
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        retry(ctx, self, |_| {
            let should_retry = attempt();
            async move {
                if should_retry.await {
                    ControlFlow::Continue(())
                } else {
                    ControlFlow::Break(())
                }
            }
        })
        .await
        .attempts
    }
}

impl Default for ExponentialBackoff {
    /// Defaults:
    /// - `max_attempts`: 1 (no retries)
    /// - `base_delay`: 300ms
    /// - `max_delay`: 32s
    /// - `multiplier`: 2.0
    /// - `jitter`: 0.0
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: 2.0,
            jitter: 0.0,
        }
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn next_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let raw = self.base_delay.as_nanos() as f64 * self.multiplier.powi(exponent);

        let jittered = if self.jitter > 0.0 {
            raw + raw * self.jitter * (rand::random::<f64>() - 0.5)
        } else {
            raw
        };

        let max = self.max_delay.as_nanos() as f64;
        if !jittered.is_finite() || jittered >= max {
            return self.max_delay;
        }
        Duration::from_nanos(jittered.max(0.0).round() as u64)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Builder for configuring [`ExponentialBackoff`].
///
/// Unset values fall back to the [`Default`] configuration, and zero delays
/// are treated as unset.
#[derive(Debug, Default)]
pub struct ExponentialBackoffBuilder {
    max_attempts: Option<u32>,
    base_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
}

impl ExponentialBackoffBuilder {
    /// Total attempts including the first one. Default: 1
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay before the second attempt. Default: 300ms
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    /// Cap for any single delay. Default: 32s
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Growth factor between consecutive delays. Default: 2.0
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier.max(1.0));
        self
    }

    /// Jitter factor in `0.0..=1.0`. Default: 0.0
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter.clamp(0.0, 1.0));
        self
    }

    /// Build the `ExponentialBackoff` instance.
    pub fn build(self) -> ExponentialBackoff {
        let defaults = ExponentialBackoff::default();
        ExponentialBackoff {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            base_delay: self
                .base_delay
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.base_delay),
            max_delay: self
                .max_delay
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.max_delay),
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
            jitter: self.jitter.unwrap_or(defaults.jitter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_exponential_delay_calculation() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(300), Duration::from_secs(32), 10);

        assert_eq!(backoff.next_delay(0), Duration::from_millis(300));
        assert_eq!(backoff.next_delay(1), Duration::from_millis(600));
        assert_eq!(backoff.next_delay(2), Duration::from_millis(1200));
        assert_eq!(backoff.next_delay(3), Duration::from_millis(2400));
    }

    #[test]
    fn test_max_delay_cap() {
        let backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(5), 100);

        for retry in 3..80 {
            assert_eq!(
                backoff.next_delay(retry),
                Duration::from_secs(5),
                "retry {retry} should be capped"
            );
        }
        assert_eq!(backoff.next_delay(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_builder_defaults() {
        let backoff = ExponentialBackoff::builder().build();

        assert_eq!(backoff.max_attempts, 1);
        assert_eq!(backoff.base_delay, Duration::from_millis(300));
        assert_eq!(backoff.max_delay, Duration::from_secs(32));
        assert_eq!(backoff.multiplier, 2.0);
        assert_eq!(backoff.jitter, 0.0);
    }

    #[test]
    fn test_builder_treats_zero_as_unset() {
        let backoff = ExponentialBackoff::builder()
            .max_attempts(0)
            .base_delay(Duration::ZERO)
            .max_delay(Duration::ZERO)
            .build();

        assert_eq!(backoff.max_attempts, 1);
        assert_eq!(backoff.base_delay, Duration::from_millis(300));
        assert_eq!(backoff.max_delay, Duration::from_secs(32));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let backoff = ExponentialBackoff::builder()
            .base_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(60))
            .jitter(0.5)
            .build();

        for _ in 0..50 {
            let millis = backoff.next_delay(0).as_millis();
            assert!(
                (750..=1250).contains(&millis),
                "delay with 50% jitter should be within [750ms, 1250ms], got {millis}ms"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_retry_runs_exactly_max_attempts() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(40), 4);
        let calls = Arc::new(AtomicU32::new(0));

        let attempts = backoff
            .run(&RequestContext::new(), || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    true
                }
            })
            .await;

        assert_eq!(attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_ignores_predicate() {
        for max_attempts in [0, 1] {
            let backoff = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_secs(1), max_attempts);
            let attempts = backoff.run(&RequestContext::new(), || async { true }).await;
            assert_eq!(attempts, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_follow_schedule() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_millis(300), 5);
        let mut started = Vec::new();

        backoff
            .run(&RequestContext::new(), || {
                started.push(Instant::now());
                async { true }
            })
            .await;

        let gaps: Vec<Duration> = started.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
                Duration::from_millis(300),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_sleep_stops_retrying() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10), 10);
        let ctx = RequestContext::new();

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            canceller.cancel();
        });

        let outcome = retry(&ctx, &backoff, |n| async move { ControlFlow::<u32, u32>::Continue(n) }).await;

        // Attempts at t=0 and t=100ms, then the 200ms sleep is cut short.
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.value, 2);
        assert_eq!(outcome.interrupted, Some(crate::Done::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_attempt_declines_retry() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(10), 10);
        let calls = Arc::new(AtomicU32::new(0));

        let attempts = backoff
            .run(&RequestContext::new(), || {
                let calls = Arc::clone(&calls);
                async move { calls.fetch_add(1, Ordering::SeqCst) < 2 }
            })
            .await;

        assert_eq!(attempts, 3);
    }
}
