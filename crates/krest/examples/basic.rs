//! Basic krest example
//!
//! Fetches a JSON document with retries, then uploads a small multipart
//! form, logging every call through the tracing interceptor.
//!
//! ## Usage
//!
//! ```bash
//! # Against the default echo service
//! RUST_LOG=krest=debug cargo run --example basic --features trace
//!
//! # Against another host, with a shorter per-call deadline
//! KREST_TIMEOUT=5 cargo run --example basic --features trace -- https://httpbin.org
//! ```

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use krest::{
    Client, ClientConfig, DefaultHeadersInterceptor, Interceptor, MultipartForm, RequestContext, RequestData,
    RetryPolicy, TracingInterceptor,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let base = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org".to_string());

    let interceptors: Vec<Arc<dyn Interceptor>> = vec![
        Arc::new(TracingInterceptor),
        Arc::new(DefaultHeadersInterceptor::new().header("Accept", "application/json")),
    ];
    let client = Client::from_config(ClientConfig::from_env(), interceptors)?;
    let ctx = RequestContext::new();

    let retry = RetryPolicy::new(3).with_base_delay(Duration::from_millis(200));
    let outcome = client
        .get(&ctx, format!("{base}/json"), RequestData::new().with_retry(retry))
        .await;
    match outcome.into_result() {
        Ok(response) => println!("GET /json -> {} ({} bytes)", response.status, response.body.len()),
        Err(err) => println!("GET /json failed: {err}"),
    }

    let form = MultipartForm::new()
        .text("greeting", "hello")
        .file("notes", Cursor::new(b"line one\nline two\n".to_vec()), "notes.txt");
    let outcome = client
        .post(&ctx, format!("{base}/post"), RequestData::new().with_body(form))
        .await;
    println!("POST /post -> {}", outcome.response.status);
    if let Some(err) = outcome.error {
        println!("upload failed: {err}");
    }

    Ok(())
}
