//! End-to-end tests for the client against a local HTTP server

use std::sync::{Arc, Mutex};
use std::time::Duration;

use krest::{
    Client, Error, Interceptor, Method, Next, Outcome, RequestContext, RequestData, Response, RetryPolicy,
    TracingInterceptor, async_trait,
};
use rstest::rstest;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use wiremock::matchers::{body_json, body_string, header, headers, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> Client {
    Client::new(Duration::from_secs(10), Vec::new()).unwrap()
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts)
        .with_base_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(20))
}

#[rstest]
#[case::get_ok(Method::GET, 200)]
#[case::get_bad_request(Method::GET, 400)]
#[case::post_ok(Method::POST, 200)]
#[case::post_bad_request(Method::POST, 400)]
#[case::put_ok(Method::PUT, 200)]
#[case::put_bad_request(Method::PUT, 400)]
#[case::patch_ok(Method::PATCH, 200)]
#[case::patch_bad_request(Method::PATCH, 400)]
#[case::delete_ok(Method::DELETE, 200)]
#[case::delete_bad_request(Method::DELETE, 400)]
#[case::options_ok(Method::OPTIONS, 200)]
#[case::options_bad_request(Method::OPTIONS, 400)]
#[tokio::test]
async fn test_verbs_report_status(#[case] verb: Method, #[case] status: u16) {
    let server = MockServer::start().await;
    Mock::given(method(verb.as_str()))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(status).set_body_string("payload"))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client()
        .request(&RequestContext::new(), verb, format!("{}/items", server.uri()), RequestData::new())
        .await;

    assert_eq!(outcome.response.status, status);
    assert_eq!(outcome.response.text(), "payload");
    if status == 200 {
        assert!(outcome.is_ok());
    } else {
        let err = outcome.error.unwrap();
        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("unexpected status code: 400, payload: payload"));
    }
}

#[tokio::test]
async fn test_body_is_sent_as_given() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string("raw body"))
        .and(header("content-type", "text/plain"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let data = RequestData::new()
        .with_body("raw body")
        .with_header("Content-Type", "text/plain");
    let outcome = client().post(&RequestContext::new(), server.uri(), data).await;

    assert!(outcome.is_ok(), "{:?}", outcome.error);
    assert_eq!(outcome.response.status, 201);
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Item {
    id: u32,
    name: String,
}

#[tokio::test]
async fn test_json_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({"id": 1, "name": "widget"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1, "name": "widget"})))
        .mount(&server)
        .await;

    let item = Item {
        id: 1,
        name: "widget".to_string(),
    };
    let response = client()
        .put(&RequestContext::new(), server.uri(), RequestData::new().with_json(item))
        .await
        .into_result()
        .unwrap();

    let decoded: Item = response.json().unwrap();
    assert_eq!(decoded.name, "widget");
}

#[tokio::test]
async fn test_multi_valued_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(headers("x-tag", vec!["alpha", "beta"]))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let data = RequestData::new().with_header("X-Tag", ["alpha", "beta"]);
    let outcome = client().get(&RequestContext::new(), server.uri(), data).await;

    assert!(outcome.is_ok(), "{:?}", outcome.error);
}

#[tokio::test]
async fn test_invalid_header_never_reaches_the_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let data = RequestData::new().with_header("X-Broken", "a\r\nb");
    let outcome = client().get(&RequestContext::new(), server.uri(), data).await;

    let err = outcome.error.unwrap();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("X-Broken"));
}

#[tokio::test]
async fn test_retries_bad_gateway_with_identical_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("done"))
        .mount(&server)
        .await;

    let data = RequestData::new()
        .with_body("retry me")
        .with_retry(fast_retry(3));
    let outcome = client().post(&RequestContext::new(), server.uri(), data).await;

    assert!(outcome.is_ok(), "{:?}", outcome.error);
    assert_eq!(outcome.response.text(), "done");

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].body, b"retry me");
    assert_eq!(received[0].body, received[1].body);
}

#[tokio::test]
async fn test_retries_stop_at_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(3)
        .mount(&server)
        .await;

    let outcome = client()
        .get(&RequestContext::new(), server.uri(), RequestData::new().with_retry(fast_retry(3)))
        .await;

    assert_eq!(outcome.response.status, 503);
    assert_eq!(outcome.error.unwrap().status(), Some(503));
}

struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Interceptor for Recorder {
    async fn intercept(
        &self,
        ctx: &RequestContext,
        method: Method,
        url: String,
        data: RequestData,
        next: Next<'_>,
    ) -> Outcome {
        self.log.lock().unwrap().push(format!("{} in", self.name));
        let data = data.with_header(format!("X-Seen-{}", self.name), "1");
        let outcome = next.run(ctx, method, url, data).await;
        self.log.lock().unwrap().push(format!("{} out", self.name));
        outcome
    }
}

#[tokio::test]
async fn test_interceptors_wrap_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("x-seen-outer", "1"))
        .and(header("x-seen-inner", "1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut client = Client::new(
        Duration::from_secs(10),
        vec![Arc::new(Recorder {
            name: "outer",
            log: log.clone(),
        })],
    )
    .unwrap();
    client.add_middleware([
        Arc::new(Recorder {
            name: "inner",
            log: log.clone(),
        }) as Arc<dyn Interceptor>,
        Arc::new(TracingInterceptor),
    ]);

    let outcome = client.get(&RequestContext::new(), server.uri(), RequestData::new()).await;

    assert!(outcome.is_ok(), "{:?}", outcome.error);
    assert_eq!(*log.lock().unwrap(), vec!["outer in", "inner in", "inner out", "outer out"]);
}

struct Cached;

#[async_trait]
impl Interceptor for Cached {
    async fn intercept(
        &self,
        _ctx: &RequestContext,
        _method: Method,
        _url: String,
        _data: RequestData,
        _next: Next<'_>,
    ) -> Outcome {
        Outcome::ok(Response::new(200).with_body("from cache"))
    }
}

#[tokio::test]
async fn test_short_circuit_skips_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let client = Client::new(Duration::from_secs(10), vec![Arc::new(Cached)]).unwrap();
    let outcome = client.get(&RequestContext::new(), server.uri(), RequestData::new()).await;

    assert!(outcome.is_ok());
    assert_eq!(outcome.response.text(), "from cache");
}

struct Complains(&'static str);

#[async_trait]
impl Interceptor for Complains {
    async fn intercept(
        &self,
        ctx: &RequestContext,
        method: Method,
        url: String,
        data: RequestData,
        next: Next<'_>,
    ) -> Outcome {
        let mut outcome = next.run(ctx, method, url, data).await;
        outcome.append_error(Error::interceptor(self.0));
        outcome
    }
}

#[tokio::test]
async fn test_interceptor_errors_are_aggregated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
        .mount(&server)
        .await;

    let client = Client::new(
        Duration::from_secs(10),
        vec![Arc::new(Complains("outer failed")), Arc::new(Complains("inner failed"))],
    )
    .unwrap();
    let outcome = client.get(&RequestContext::new(), server.uri(), RequestData::new()).await;

    assert_eq!(outcome.response.status, 404);
    let err = outcome.error.unwrap();
    let errors = err.errors();
    assert_eq!(errors.len(), 3);
    assert_eq!(errors[0].status(), Some(404));
    assert_eq!(errors[1].to_string(), "inner failed");
    assert_eq!(errors[2].to_string(), "outer failed");
}

#[tokio::test]
async fn test_streaming_response() {
    let payload: String = "0123456789".repeat(20_000);
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download"))
        .respond_with(ResponseTemplate::new(200).set_body_string(payload.clone()))
        .mount(&server)
        .await;

    let data = RequestData::new().with_stream(true);
    let response = client()
        .get(&RequestContext::new(), format!("{}/download", server.uri()), data)
        .await
        .into_result()
        .unwrap();

    assert!(response.is_streaming());
    assert!(response.body.is_empty());

    let mut reader = response.into_reader();
    let mut received = String::new();
    reader.read_to_string(&mut received).await.unwrap();
    assert_eq!(received.len(), payload.len());
    assert_eq!(received, payload);
}

#[tokio::test]
async fn test_streaming_request_buffers_error_responses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let data = RequestData::new().with_stream(true);
    let outcome = client().get(&RequestContext::new(), server.uri(), data).await;

    assert!(!outcome.response.is_streaming());
    assert_eq!(outcome.response.text(), "boom");
    assert_eq!(outcome.error.unwrap().status(), Some(500));
}

#[tokio::test]
async fn test_cancellation_aborts_the_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let ctx = RequestContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let started = std::time::Instant::now();
    let outcome = client().get(&ctx, server.uri(), RequestData::new()).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(outcome.error.unwrap().is_cancelled());
    assert_eq!(outcome.response.status, 0);
}

#[tokio::test]
async fn test_client_timeout_applies_to_every_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let client = Client::new(Duration::from_millis(200), Vec::new()).unwrap();
    let outcome = client.get(&RequestContext::new(), server.uri(), RequestData::new()).await;

    assert!(outcome.error.unwrap().is_cancelled());
}
