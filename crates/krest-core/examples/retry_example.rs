//! Example: Retrying with exponential backoff and cancellation
//!
//! This example demonstrates:
//! 1. Retrying an unreliable operation until it succeeds
//! 2. Stopping a retry sequence by cancelling its context
//!
//! Run with:
//! ```bash
//! cargo run -p krest-core --example retry_example
//! ```

use krest_core::prelude::*;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// A simulated dependency that fails the first few times
struct UnreliableApi {
    attempts: AtomicU32,
    fail_count: u32,
}

impl UnreliableApi {
    fn new(fail_count: u32) -> Self {
        Self {
            attempts: AtomicU32::new(0),
            fail_count,
        }
    }

    async fn call(&self) -> Result<&'static str, String> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_count {
            println!("  Attempt {attempt}: FAILED");
            Err(format!("transient error on attempt {attempt}"))
        } else {
            println!("  Attempt {attempt}: SUCCESS");
            Ok("payload")
        }
    }
}

async fn example_simple_retry() {
    println!("\n=== Example 1: Retry until success ===\n");

    let backoff = ExponentialBackoff::builder()
        .max_attempts(5)
        .base_delay(Duration::from_millis(100))
        .max_delay(Duration::from_millis(400))
        .build();
    let api = UnreliableApi::new(2);
    let start = Instant::now();

    let outcome = retry(&RequestContext::new(), &backoff, |_| {
        let api = &api;
        async move {
            match api.call().await {
                Ok(body) => ControlFlow::Break(Ok(body)),
                Err(err) => ControlFlow::Continue(Err(err)),
            }
        }
    })
    .await;

    println!(
        "\nResult: {:?} after {} attempts in {:?}",
        outcome.value,
        outcome.attempts,
        start.elapsed()
    );
}

async fn example_cancellation() {
    println!("\n=== Example 2: Cancelling a retry sequence ===\n");

    let backoff = ExponentialBackoff::builder()
        .max_attempts(10)
        .base_delay(Duration::from_millis(200))
        .build();
    let api = UnreliableApi::new(u32::MAX);
    let ctx = RequestContext::new().with_timeout(Duration::from_millis(500));

    let outcome = retry(&ctx, &backoff, |_| {
        let api = &api;
        async move { ControlFlow::Continue(api.call().await) }
    })
    .await;

    println!(
        "\nStopped after {} attempts ({:?}), last result: {:?}",
        outcome.attempts, outcome.interrupted, outcome.value
    );
}

#[tokio::main]
async fn main() {
    example_simple_retry().await;
    example_cancellation().await;
}
