use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::any,
    Router,
};
use retry_header_delay::{ClientOptions, RetryClient, RetryConfig, TransportErrorKind};
use serde_json::{json, Value as JsonValue};
use tokio::io::AsyncReadExt;

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    headers: Vec<(&'static str, String)>,
    body: String,
    delay: Duration,
}

impl MockResponse {
    fn status(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: status.canonical_reason().unwrap_or_default().to_owned(),
            delay: Duration::ZERO,
        }
    }

    fn text(status: StatusCode, body: &str) -> Self {
        Self {
            body: body.to_owned(),
            ..Self::status(status)
        }
    }

    fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone)]
struct MockState {
    script: Arc<Mutex<VecDeque<MockResponse>>>,
    fallback: MockResponse,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<String>>>,
}

async fn handler(State(state): State<MockState>, body: String) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state
        .bodies
        .lock()
        .expect("body log mutex must not be poisoned")
        .push(body);

    let response = {
        let mut script = state
            .script
            .lock()
            .expect("response script mutex must not be poisoned");
        script.pop_front().unwrap_or_else(|| state.fallback.clone())
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        headers.insert(
            HeaderName::from_static(*name),
            HeaderValue::from_str(value).expect("mock header value must be valid"),
        );
    }

    (response.status, headers, response.body)
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<String>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn url(&self) -> String {
        format!("{}/", self.base_url)
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn spawn_server(script: Vec<MockResponse>, fallback: MockResponse) -> TestServer {
    let state = MockState {
        script: Arc::new(Mutex::new(script.into())),
        fallback,
        hits: Arc::new(AtomicUsize::new(0)),
        bodies: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .route("/", any(handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        bodies: state.bodies,
        task,
    }
}

fn always(response: MockResponse) -> (Vec<MockResponse>, MockResponse) {
    (Vec::new(), response)
}

fn times_then(times: usize, first: MockResponse, then: MockResponse) -> (Vec<MockResponse>, MockResponse) {
    (vec![first; times], then)
}

fn fast_client() -> RetryClient {
    RetryClient::new().with_options(ClientOptions {
        timeout_ms: 2_000,
        default_retry_delay_ms: 5,
    })
}

#[tokio::test]
async fn success_is_not_retried() {
    let (script, fallback) = always(MockResponse::text(StatusCode::OK, "hello!"));
    let server = spawn_server(script, fallback).await;

    let delivery = fast_client().get(server.url()).retry(5).send().await;

    assert_eq!(delivery.retries(), 0);
    let response = delivery.into_result().expect("request must succeed");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text(), "hello!");
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn listed_429_is_retried_until_budget_is_spent() {
    let (script, fallback) = always(MockResponse::status(StatusCode::TOO_MANY_REQUESTS));
    let server = spawn_server(script, fallback).await;

    let delivery = fast_client()
        .get(server.url())
        .retry_with(5, [429], None)
        .send()
        .await;

    assert!(delivery.is_success());
    assert_eq!(delivery.retries(), 5);
    let response = delivery.response().expect("final response must be delivered");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(server.hits(), 6);
}

#[tokio::test]
async fn retry_after_header_sets_wait_time() {
    let (script, fallback) = always(
        MockResponse::status(StatusCode::TOO_MANY_REQUESTS).with_header("retry-after", "0.05"),
    );
    let server = spawn_server(script, fallback).await;
    let started = Instant::now();

    let delivery = fast_client()
        .get(server.url())
        .retry_with(2, [429], Some("Retry-After"))
        .send()
        .await;

    assert_eq!(delivery.retries(), 2);
    assert_eq!(server.hits(), 3);
    assert!(
        started.elapsed() >= Duration::from_millis(100),
        "two retries must wait 50 ms each, took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn custom_wait_header_is_read_case_insensitively() {
    let (script, fallback) = times_then(
        1,
        MockResponse::status(StatusCode::TOO_MANY_REQUESTS)
            .with_header("x-rate-limit-retry-after-seconds", "0.08"),
        MockResponse::text(StatusCode::OK, "hello!"),
    );
    let server = spawn_server(script, fallback).await;
    let started = Instant::now();

    let delivery = fast_client()
        .get(server.url())
        .retry(
            RetryConfig::new(5)
                .retry_on([429])
                .wait_header("X-Rate-Limit-Retry-After-Seconds"),
        )
        .send()
        .await;

    assert_eq!(delivery.retries(), 1);
    assert!(started.elapsed() >= Duration::from_millis(80));
    assert_eq!(
        delivery.into_result().expect("request must succeed").text(),
        "hello!"
    );
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let (script, fallback) = times_then(
        4,
        MockResponse::status(StatusCode::INTERNAL_SERVER_ERROR),
        MockResponse::text(StatusCode::OK, "hello!"),
    );
    let server = spawn_server(script, fallback).await;

    let delivery = fast_client().get(server.url()).retry(5).send().await;

    assert_eq!(delivery.retries(), 4);
    let response = delivery.into_result().expect("request must succeed");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text(), "hello!");
    assert_eq!(server.hits(), 5);
}

#[tokio::test]
async fn listed_404_is_retried_until_success() {
    let (script, fallback) = times_then(
        4,
        MockResponse::status(StatusCode::NOT_FOUND),
        MockResponse::text(StatusCode::OK, "hello!"),
    );
    let server = spawn_server(script, fallback).await;

    let delivery = fast_client()
        .get(server.url())
        .retry_with(5, [404], None)
        .send()
        .await;

    let response = delivery.into_result().expect("request must succeed");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.hits(), 5);
}

#[tokio::test]
async fn unlisted_client_error_is_delivered_at_once() {
    let (script, fallback) = always(MockResponse::status(StatusCode::NOT_FOUND));
    let server = spawn_server(script, fallback).await;

    let delivery = fast_client().get(server.url()).retry(5).send().await;

    assert_eq!(delivery.retries(), 0);
    assert_eq!(
        delivery.response().map(|response| response.status()),
        Some(StatusCode::NOT_FOUND)
    );
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn without_retry_server_error_is_delivered_after_one_attempt() {
    let (script, fallback) = times_then(
        4,
        MockResponse::status(StatusCode::SERVICE_UNAVAILABLE),
        MockResponse::text(StatusCode::OK, "hello!"),
    );
    let server = spawn_server(script, fallback).await;

    let delivery = fast_client().get(server.url()).send().await;

    assert!(!delivery.retry_enabled());
    assert_eq!(
        delivery.response().map(|response| response.status()),
        Some(StatusCode::SERVICE_UNAVAILABLE)
    );
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn json_body_is_resent_on_retry() {
    let (script, fallback) = times_then(
        1,
        MockResponse::status(StatusCode::BAD_GATEWAY),
        MockResponse::text(StatusCode::OK, r#"{"id":7}"#),
    );
    let server = spawn_server(script, fallback).await;
    let payload = json!({ "name": "Kit" });

    let delivery = fast_client()
        .post(server.url())
        .json(&payload)
        .retry_once()
        .send()
        .await;

    let response = delivery.into_result().expect("request must succeed");
    let body: JsonValue = response.json().expect("response must be JSON");
    assert_eq!(body["id"], 7);

    let bodies = server.bodies.lock().expect("body log mutex must not be poisoned");
    assert_eq!(bodies.len(), 2);
    assert!(bodies.iter().all(|body| body == r#"{"name":"Kit"}"#));
}

#[tokio::test]
async fn client_timeout_is_retried_and_annotated() {
    let (script, fallback) = always(
        MockResponse::text(StatusCode::OK, "late").with_delay(Duration::from_millis(300)),
    );
    let server = spawn_server(script, fallback).await;

    let delivery = fast_client()
        .get(server.url())
        .timeout(Duration::from_millis(30))
        .retry(2)
        .send()
        .await;

    let failure = delivery.into_result().expect_err("request must time out");
    assert!(failure.error.is_timeout(), "unexpected error: {}", failure.error);
    assert_eq!(failure.retries, Some(2));
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn refused_connection_is_not_retried() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind throwaway listener");
    let address = listener.local_addr().expect("must have local addr");
    drop(listener);

    let delivery = fast_client()
        .get(format!("http://{address}/"))
        .retry(3)
        .send()
        .await;

    let failure = delivery.into_result().expect_err("connection must be refused");
    assert_eq!(failure.error.kind(), TransportErrorKind::Other);
    assert!(failure.response.is_none());
    assert_eq!(failure.retries, Some(0));
}

#[tokio::test]
async fn dropping_send_cancels_scheduled_retry() {
    let (script, fallback) = always(MockResponse::status(StatusCode::SERVICE_UNAVAILABLE));
    let server = spawn_server(script, fallback).await;
    let client = RetryClient::new().with_options(ClientOptions {
        timeout_ms: 2_000,
        default_retry_delay_ms: 300,
    });

    let send = client.get(server.url()).retry(5).send();
    let result = tokio::time::timeout(Duration::from_millis(100), send).await;
    assert!(result.is_err(), "send must still be waiting to retry");

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(server.hits(), 1);
}

/// Accepts connections, reads the request head, then closes without answering.
async fn spawn_hang_up_server() -> (String, Arc<AtomicUsize>, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind hang-up listener");
    let address = listener.local_addr().expect("must have local addr");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let task = tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            drop(socket);
        }
    });
    (format!("http://{address}/"), hits, task)
}

#[tokio::test]
async fn server_hang_up_is_retried_as_connection_reset() {
    let (url, hits, task) = spawn_hang_up_server().await;

    let delivery = fast_client().get(url).retry(2).send().await;
    task.abort();

    let failure = delivery.into_result().expect_err("server never answers");
    assert_eq!(
        failure.error.kind(),
        TransportErrorKind::ConnectionReset,
        "unexpected error: {}",
        failure.error
    );
    assert_eq!(failure.retries, Some(2));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unknown_host_is_classified_as_lookup_failure_and_retried() {
    let delivery = fast_client()
        .get("http://retry-header-delay.invalid/")
        .retry(1)
        .send()
        .await;

    let failure = delivery.into_result().expect_err("lookup must fail");
    assert!(
        matches!(
            failure.error.kind(),
            TransportErrorKind::HostNotFound | TransportErrorKind::AddressInfo
        ),
        "unexpected error: {}",
        failure.error
    );
    assert!(failure.error.reqwest().is_some_and(|err| err.is_connect()));
    assert_eq!(failure.retries, Some(1));
}
