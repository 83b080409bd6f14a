use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use certdash_http::{
    ApiClient, ApiError, CancellationToken, ClientOptions, ErrorKind, Method, Notifier, Payload,
    RequestOptions, REQUEST_ID_HEADER,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

#[derive(Clone)]
enum MockBody {
    Json(JsonValue),
    Raw(&'static [u8]),
}

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    body: MockBody,
    delay: Duration,
}

impl MockResponse {
    fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            body: MockBody::Json(body),
            delay: Duration::from_millis(0),
        }
    }

    fn raw(status: StatusCode, body: &'static [u8]) -> Self {
        Self {
            status,
            body: MockBody::Raw(body),
            delay: Duration::from_millis(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug)]
struct SeenRequest {
    uri: String,
    request_id: Option<String>,
    authorization: Option<String>,
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    hits: Arc<AtomicUsize>,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

async fn api_handler(State(state): State<MockState>, uri: Uri, headers: HeaderMap) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state
        .seen
        .lock()
        .expect("seen mutex must not be poisoned")
        .push(SeenRequest {
            uri: uri.to_string(),
            request_id: header_value(&headers, REQUEST_ID_HEADER),
            authorization: header_value(&headers, "authorization"),
        });

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "no mock response available"}),
            )
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    match response.body {
        MockBody::Json(body) => (response.status, Json(body)).into_response(),
        MockBody::Raw(body) => (response.status, body).into_response(),
    }
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn client(&self) -> ApiClient {
        let options = ClientOptions::new(format!("{}/api", self.base_url))
            .with_timeout_ms(2_000)
            .with_retry_delay_ms(1);
        ApiClient::new(options).expect("client must build")
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().expect("seen mutex").clone()
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        seen: Arc::new(Mutex::new(Vec::new())),
        hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .fallback(api_handler)
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
        seen: state.seen,
        task,
    }
}

#[derive(Debug, Deserialize, PartialEq)]
struct Certificate {
    id: String,
}

#[derive(Default)]
struct RecordingNotifier {
    errors: Mutex<Vec<ApiError>>,
    successes: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn error(&self, error: &ApiError) {
        self.errors.lock().expect("errors").push(error.clone());
    }

    fn success(&self, message: &str) {
        self.successes
            .lock()
            .expect("successes")
            .push(message.to_owned());
    }
}

#[tokio::test]
async fn unwraps_resource_specific_collection() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!({"success": true, "data": {"certificates": [{"id": "c1"}]}}),
    )])
    .await;

    let response = server
        .client()
        .get::<Vec<Certificate>>("/certificates?organizationId=org-1", RequestOptions::new())
        .await
        .expect("request must succeed");

    assert_eq!(response.data, vec![Certificate { id: "c1".to_owned() }]);
    assert_eq!(response.meta, None);
    assert_eq!(server.hits(), 1);
    assert_eq!(
        server.seen()[0].uri,
        "/api/certificates?organizationId=org-1"
    );
}

#[tokio::test]
async fn recovers_after_server_errors_within_budget() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "boom"})),
        MockResponse::json(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "boom"})),
        MockResponse::json(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "boom"})),
        MockResponse::json(StatusCode::OK, json!([{"id": "c1"}, {"id": "c2"}])),
    ])
    .await;

    let response = server
        .client()
        .get::<Vec<Certificate>>("/certificates", RequestOptions::new())
        .await
        .expect("request must succeed after retries");

    assert_eq!(response.data.len(), 2);
    assert_eq!(server.hits(), 4);
}

#[tokio::test]
async fn retries_reuse_one_request_id_and_token() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::SERVICE_UNAVAILABLE, json!({})),
        MockResponse::json(StatusCode::OK, json!({"success": true, "data": []})),
    ])
    .await;

    server
        .client()
        .with_bearer_token("t0k")
        .get::<Vec<Certificate>>("/certificates", RequestOptions::new())
        .await
        .expect("request must succeed");

    let seen = server.seen();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].request_id.is_some());
    assert_eq!(seen[0].request_id, seen[1].request_id);
    assert_eq!(seen[0].authorization.as_deref(), Some("Bearer t0k"));
    assert_eq!(seen[1].authorization.as_deref(), Some("Bearer t0k"));
}

#[tokio::test]
async fn absolute_url_on_another_origin_never_sees_credentials() {
    let backend = spawn_server(vec![MockResponse::raw(StatusCode::OK, b"id\nc1\n")]).await;
    let foreign = spawn_server(vec![MockResponse::raw(StatusCode::OK, b"leaked")]).await;
    let client = backend.client().with_bearer_token("secret");

    let err = client
        .download(
            &format!("{}/export.csv", foreign.base_url),
            RequestOptions::new(),
        )
        .await
        .expect_err("foreign origin must be refused");
    assert_eq!(err.kind, ErrorKind::Unknown);
    assert_eq!(foreign.hits(), 0);

    let bytes = client
        .download(
            &format!("{}/api/reports/export.csv", backend.base_url),
            RequestOptions::new(),
        )
        .await
        .expect("same origin must be allowed");
    assert_eq!(&bytes[..], b"id\nc1\n");
    assert_eq!(backend.seen()[0].uri, "/api/reports/export.csv");
    assert_eq!(
        backend.seen()[0].authorization.as_deref(),
        Some("Bearer secret")
    );
}

#[tokio::test]
async fn separate_requests_get_distinct_request_ids() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::OK, json!([])),
        MockResponse::json(StatusCode::OK, json!([])),
    ])
    .await;
    let client = server.client();

    for _ in 0..2 {
        client
            .get::<JsonValue>("/students", RequestOptions::new())
            .await
            .expect("request must succeed");
    }

    let seen = server.seen();
    assert_ne!(seen[0].request_id, seen[1].request_id);
}

#[tokio::test]
async fn application_error_is_not_retried() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::BAD_REQUEST,
        json!({"success": false, "error": {"message": "Invalid field", "code": "VALIDATION"}}),
    )])
    .await;

    let err = server
        .client()
        .post::<JsonValue, _>("/students", &json!({"name": ""}), RequestOptions::new())
        .await
        .expect_err("request must fail");

    assert_eq!(err.kind, ErrorKind::ApplicationError);
    assert_eq!(err.message, "Invalid field");
    assert_eq!(err.code.as_deref(), Some("VALIDATION"));
    assert_eq!(err.http_status, Some(400));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn not_found_short_circuits() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::NOT_FOUND,
        json!({"message": "Certificate not found"}),
    )])
    .await;

    let err = server
        .client()
        .get::<JsonValue>("/certificates/missing", RequestOptions::new())
        .await
        .expect_err("request must fail");

    assert_eq!(err.kind, ErrorKind::ClientError);
    assert_eq!(err.message, "Certificate not found");
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn persistent_unavailability_exhausts_budget() {
    let server = spawn_server(
        (0..5)
            .map(|_| MockResponse::json(StatusCode::SERVICE_UNAVAILABLE, json!({})))
            .collect(),
    )
    .await;

    let err = server
        .client()
        .get::<JsonValue>("/programs", RequestOptions::new().with_retries(2))
        .await
        .expect_err("request must fail");

    assert_eq!(err.kind, ErrorKind::ServerError);
    assert_eq!(err.http_status, Some(503));
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn zero_retries_and_disabled_retry_issue_one_attempt() {
    let server = spawn_server(
        (0..4)
            .map(|_| MockResponse::json(StatusCode::BAD_GATEWAY, json!({})))
            .collect(),
    )
    .await;
    let client = server.client();

    let err = client
        .get::<JsonValue>("/institutions", RequestOptions::new().with_retries(0))
        .await
        .expect_err("request must fail");
    assert_eq!(err.kind, ErrorKind::ServerError);
    assert_eq!(server.hits(), 1);

    client
        .get::<JsonValue>("/institutions", RequestOptions::new().no_retry())
        .await
        .expect_err("request must fail");
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn attempt_timeout_is_classified() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!([]))
        .with_delay(Duration::from_millis(300))])
    .await;

    let err = server
        .client()
        .get::<JsonValue>(
            "/certificates",
            RequestOptions::new().with_timeout_ms(20).no_retry(),
        )
        .await
        .expect_err("request must time out");

    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(err.http_status, None);
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind");
    let address = listener.local_addr().expect("must have local addr");
    drop(listener);

    let client = ApiClient::new(ClientOptions::new(format!("http://{address}")))
        .expect("client must build");
    let err = client
        .get::<JsonValue>("/certificates", RequestOptions::new().no_retry())
        .await
        .expect_err("request must fail");

    assert_eq!(err.kind, ErrorKind::Network);
}

#[tokio::test]
async fn unparsable_success_body_is_malformed() {
    let server = spawn_server(vec![MockResponse::raw(StatusCode::OK, b"<html>oops</html>")]).await;

    let err = server
        .client()
        .get::<JsonValue>("/certificates", RequestOptions::new())
        .await
        .expect_err("request must fail");

    assert_eq!(err.kind, ErrorKind::MalformedResponse);
    assert_eq!(err.http_status, Some(200));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn binary_download_bypasses_envelope() {
    let server = spawn_server(vec![MockResponse::raw(StatusCode::OK, b"id,name\nc1,Kit\n")]).await;

    let bytes = server
        .client()
        .download("/certificates/export", RequestOptions::new())
        .await
        .expect("download must succeed");

    assert_eq!(&bytes[..], b"id,name\nc1,Kit\n");
}

#[tokio::test]
async fn pagination_metadata_is_preserved() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!({"success": true, "data": {"items": [{"id": "c1"}], "total": 31, "page": 2}}),
    )])
    .await;

    let response = server
        .client()
        .request_payload(Method::GET, "/certificates", RequestOptions::new())
        .await
        .expect("request must succeed");

    assert_eq!(response.data, Payload::Json(json!([{"id": "c1"}])));
    assert_eq!(response.meta_u64("total"), Some(31));
    assert_eq!(response.meta_u64("page"), Some(2));
}

#[tokio::test]
async fn cancellation_aborts_in_flight_attempt() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!([]))
        .with_delay(Duration::from_secs(5))])
    .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = server
        .client()
        .get::<JsonValue>("/certificates", RequestOptions::new().with_cancel(cancel))
        .await
        .expect_err("request must be cancelled");

    assert_eq!(err.kind, ErrorKind::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn notifier_sees_each_outcome_once() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::INTERNAL_SERVER_ERROR, json!({})),
        MockResponse::json(StatusCode::INTERNAL_SERVER_ERROR, json!({})),
        MockResponse::json(StatusCode::FORBIDDEN, json!({})),
        MockResponse::json(StatusCode::OK, json!({"success": true, "data": {"id": "c9"}})),
    ])
    .await;
    let notifier = Arc::new(RecordingNotifier::default());
    let client = server.client().with_notifier(notifier.clone());

    client
        .get::<JsonValue>("/certificates", RequestOptions::new().with_retries(1))
        .await
        .expect_err("request must fail");
    client
        .get::<JsonValue>("/certificates", RequestOptions::new().silent())
        .await
        .expect_err("request must fail");
    client
        .post::<Certificate, _>(
            "/certificates",
            &json!({"studentId": "s1"}),
            RequestOptions::new().with_success_message("Certificate issued"),
        )
        .await
        .expect("request must succeed");

    let errors = notifier.errors.lock().expect("errors").clone();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::ServerError);
    assert_eq!(
        notifier.successes.lock().expect("successes").clone(),
        vec!["Certificate issued".to_owned()]
    );
}
