#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end tests against a local mock server.

use async_trait::async_trait;
use futures::StreamExt;
use httpmock::prelude::*;
use parking_lot::Mutex;
use requestkit::{
    Authentication, DataResult, DownloadDestination, ErrorReporter, HttpError, MultipartFormData,
    Network, NetworkConfig, NetworkError, Progress, ProgressHandler, Requestable, RetryContext,
    RetryDecision, RetryPolicy, Task, UrlEncoding, ValidationType,
};
use serde::Deserialize;
use serde_json::json;
use std::borrow::Cow;
use std::io::Write;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;
use url::Url;

struct Endpoint<T> {
    base: Url,
    path: String,
    method: http::Method,
    task: Task,
    key_path: Option<&'static str>,
    validation: ValidationType,
    headers: Option<Vec<(String, String)>>,
    response: PhantomData<fn() -> T>,
}

impl<T> Endpoint<T> {
    fn get(server: &MockServer, path: &str) -> Self {
        Self {
            base: Url::parse(&server.base_url()).unwrap(),
            path: path.to_owned(),
            method: http::Method::GET,
            task: Task::RequestPlain,
            key_path: None,
            validation: ValidationType::SuccessCodes,
            headers: None,
            response: PhantomData,
        }
    }

    fn post(server: &MockServer, path: &str, task: Task) -> Self {
        Self {
            method: http::Method::POST,
            task,
            ..Self::get(server, path)
        }
    }
}

impl<T> Requestable for Endpoint<T> {
    type Response = T;

    fn base_url(&self) -> Url {
        self.base.clone()
    }

    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.path)
    }

    fn method(&self) -> http::Method {
        self.method.clone()
    }

    fn validation(&self) -> ValidationType {
        self.validation.clone()
    }

    fn headers(&self) -> Option<Vec<(String, String)>> {
        self.headers.clone()
    }

    fn key_path(&self) -> Option<&str> {
        self.key_path
    }

    fn task(&self) -> Task {
        self.task.clone()
    }
}

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: u64,
    name: String,
}

#[derive(Default)]
struct Collecting(Mutex<Vec<String>>);

impl ErrorReporter for Collecting {
    fn report(&self, error: &NetworkError) {
        self.0.lock().push(error.to_string());
    }
}

fn network() -> Network {
    Network::builder()
        .config(NetworkConfig::for_testing())
        .log_level(None)
        .build()
        .unwrap()
}

async fn fetch<R: Requestable>(network: &Network, requestable: &R) -> DataResult {
    let (tx, rx) = oneshot::channel();
    let _handle = network
        .request(requestable, move |result| {
            tx.send(result).unwrap();
        })
        .unwrap();
    rx.await.unwrap()
}

#[tokio::test]
async fn test_typed_decode_under_key_path() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/v1/users");
        then.status(200)
            .json_body(json!({"data": [{"id": 1, "name": "ada"}], "meta": {"page": 1}}));
    });

    let mut endpoint = Endpoint::<Vec<User>>::get(&server, "v1/users");
    endpoint.key_path = Some("data");

    let users = network().request_stream(&endpoint).unwrap().await.unwrap();
    assert_eq!(
        users,
        vec![User {
            id: 1,
            name: "ada".to_owned()
        }]
    );
    mock.assert();
}

#[tokio::test]
async fn test_missing_key_path_is_object_mapping_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/users");
        then.status(200).json_body(json!({"items": []}));
    });

    let collecting = Arc::new(Collecting::default());
    let network = Network::builder()
        .config(NetworkConfig::for_testing())
        .error_reporter(collecting.clone())
        .build()
        .unwrap();
    let mut endpoint = Endpoint::<Vec<User>>::get(&server, "/users");
    endpoint.key_path = Some("data");

    let err = network.request_stream(&endpoint).unwrap().await.unwrap_err();
    assert!(matches!(err, NetworkError::ObjectMapping { .. }));
    assert_eq!(err.status(), Some(http::StatusCode::OK));
    assert_eq!(collecting.0.lock().len(), 1);
}

#[tokio::test]
async fn test_json_body_is_sent() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/users")
            .header("content-type", "application/json")
            .json_body(json!({"name": "grace"}));
        then.status(201).json_body(json!({"id": 7, "name": "grace"}));
    });

    let endpoint =
        Endpoint::<User>::post(&server, "/users", Task::json(json!({"name": "grace"})));
    let user = network().request_stream(&endpoint).unwrap().await.unwrap();
    assert_eq!(user.id, 7);
    mock.assert();
}

#[tokio::test]
async fn test_composite_parameters_split_between_query_and_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/search")
            .query_param("page", "2")
            .header("content-type", "application/x-www-form-urlencoded; charset=utf-8")
            .body_includes("q=rust");
        then.status(200).body("ok");
    });

    let mut body_parameters = requestkit::Parameters::new();
    body_parameters.insert("q".to_owned(), json!("rust"));
    let mut url_parameters = requestkit::Parameters::new();
    url_parameters.insert("page".to_owned(), json!(2));
    let endpoint = Endpoint::<()>::post(
        &server,
        "/search",
        Task::RequestCompositeParameters {
            body_parameters,
            body_encoding: UrlEncoding::http_body().into(),
            url_parameters,
        },
    );

    let (body, response) = fetch(&network(), &endpoint).await.unwrap();
    assert_eq!(body.as_ref(), b"ok");
    assert_eq!(response.unwrap().status(), http::StatusCode::OK);
    mock.assert();
}

#[tokio::test]
async fn test_rejected_status_keeps_response_snapshot() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/missing");
        then.status(404).json_body(json!({"error": "not found"}));
    });

    let endpoint = Endpoint::<()>::get(&server, "/missing");
    let err = fetch(&network(), &endpoint).await.unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Underlying {
            source: HttpError::Validation { .. },
            ..
        }
    ));
    assert_eq!(err.status(), Some(http::StatusCode::NOT_FOUND));
    let text = err.response().unwrap().text();
    assert!(text.contains("not found"));
}

#[tokio::test]
async fn test_custom_validation_accepts_listed_status() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/gone");
        then.status(410).body("gone");
    });

    let mut endpoint = Endpoint::<()>::get(&server, "/gone");
    endpoint.validation = ValidationType::codes([200, 410]);
    let (body, _) = fetch(&network(), &endpoint).await.unwrap();
    assert_eq!(body.as_ref(), b"gone");
}

#[tokio::test]
async fn test_gzip_response_is_decompressed() {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(br#"{"id": 3, "name": "zip"}"#).unwrap();
    let compressed = encoder.finish().unwrap();

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/compressed");
        then.status(200)
            .header("content-encoding", "gzip")
            .header("content-type", "application/json")
            .body(compressed);
    });

    let endpoint = Endpoint::<User>::get(&server, "/compressed");
    let user = network().request_stream(&endpoint).unwrap().await.unwrap();
    assert_eq!(user.name, "zip");
}

#[tokio::test]
async fn test_download_uses_suggested_file_name() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/exports/latest");
        then.status(200)
            .header("content-disposition", "attachment; filename=\"report.csv\"")
            .body("a,b\n1,2\n");
    });

    let dir = tempfile::tempdir().unwrap();
    let mut endpoint = Endpoint::<()>::get(&server, "/exports/latest");
    endpoint.task = Task::DownloadDestination(DownloadDestination::suggested(dir.path()));

    let seen = Arc::new(Mutex::new(Vec::<Progress>::new()));
    let sink = Arc::clone(&seen);
    let progress: ProgressHandler = Arc::new(move |p: Progress| sink.lock().push(p));

    let path = network()
        .download_stream(&endpoint, Some(progress))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(path, dir.path().join("report.csv"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n1,2\n");
    let last = *seen.lock().last().unwrap();
    assert_eq!(last.completed, 8);
}

#[tokio::test]
async fn test_multipart_upload() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("notes.txt");
    std::fs::write(&file, "hello from disk").unwrap();

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/upload")
            .body_includes("name=\"title\"")
            .body_includes("filename=\"notes.txt\"")
            .body_includes("hello from disk");
        then.status(200).json_body(json!({"id": 9, "name": "notes.txt"}));
    });

    let form = MultipartFormData::new().text("title", "weekly").file("doc", &file);
    let endpoint = Endpoint::<User>::post(&server, "/upload", Task::UploadMultipart(form));

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let progress: ProgressHandler = Arc::new(move |_: Progress| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let user = network()
        .upload_stream(&endpoint, Some(progress))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(user.id, 9);
    assert!(calls.load(Ordering::SeqCst) >= 1);
    mock.assert();
}

#[tokio::test]
async fn test_authentication_and_param_key_adapters() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/me")
            .header("authorization", "Bearer secret")
            .query_param("api_key", "k1");
        then.status(200).json_body(json!({"id": 1, "name": "me"}));
    });

    let network = Network::builder()
        .config(NetworkConfig::for_testing())
        .authentication(Authentication::Bearer("secret".to_owned()))
        .param_key("api_key", "k1")
        .build()
        .unwrap();
    let endpoint = Endpoint::<User>::get(&server, "/me");
    let user = network.request_stream(&endpoint).unwrap().await.unwrap();
    assert_eq!(user.name, "me");
    mock.assert();
}

struct RetryOnceOnUnavailable;

#[async_trait]
impl RetryPolicy for RetryOnceOnUnavailable {
    async fn decide(&self, context: &RetryContext<'_>) -> RetryDecision {
        let unavailable = matches!(
            context.failure,
            requestkit::interceptor::AttemptFailure::Status { status, .. }
                if status == http::StatusCode::SERVICE_UNAVAILABLE
        );
        match (unavailable, context.policy_retry_count) {
            (true, 0) => RetryDecision::Retry,
            (true, _) => RetryDecision::DoNotRetry,
            (false, _) => RetryDecision::Decline,
        }
    }
}

#[tokio::test]
async fn test_custom_retry_policy_retries_rejected_status() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/flaky");
        then.status(503).body("busy");
    });

    let network = Network::builder()
        .config(NetworkConfig::for_testing())
        .retry_policy(Arc::new(RetryOnceOnUnavailable))
        .build()
        .unwrap();
    let endpoint = Endpoint::<()>::get(&server, "/flaky");

    let err = fetch(&network, &endpoint).await.unwrap_err();
    assert_eq!(err.status(), Some(http::StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(mock.calls(), 2);
}

#[tokio::test]
async fn test_reporter_sees_failures_once() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/broken");
        then.status(500);
    });

    let collecting = Arc::new(Collecting::default());
    let network = Network::builder()
        .config(NetworkConfig::for_testing())
        .error_reporter(collecting.clone())
        .build()
        .unwrap();
    let endpoint = Endpoint::<()>::get(&server, "/broken");

    assert!(fetch(&network, &endpoint).await.is_err());
    assert_eq!(collecting.0.lock().len(), 1);
}

#[tokio::test]
async fn test_cancel_queued_request_delivers_cancelled() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/never");
        then.status(200);
    });

    let network = network();
    network.request_manager().suspend();
    let endpoint = Endpoint::<()>::get(&server, "/never");

    let mut response = network.request_stream(&endpoint).unwrap();
    response.cancel();
    let err = response.next().await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert!(response.next().await.is_none());

    network.request_manager().resume();
    assert_eq!(network.request_manager().operation_count(), 0);
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn test_concurrency_limit_queues_excess_requests() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/slow");
        then.status(200)
            .delay(std::time::Duration::from_millis(100))
            .body("done");
    });

    let network = Network::builder()
        .config(NetworkConfig::for_testing())
        .request_queue(requestkit::QueueConfig {
            max_concurrency: 1,
            ..requestkit::QueueConfig::default()
        })
        .build()
        .unwrap();
    let endpoint = Endpoint::<()>::get(&server, "/slow");

    let (tx_a, rx_a) = oneshot::channel();
    let (tx_b, rx_b) = oneshot::channel();
    let _a = network
        .request(&endpoint, move |r| tx_a.send(r.is_ok()).unwrap())
        .unwrap();
    let _b = network
        .request(&endpoint, move |r| tx_b.send(r.is_ok()).unwrap())
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    assert_eq!(network.request_manager().running_count(), 1);
    assert_eq!(network.request_manager().pending_count(), 1);

    assert!(rx_a.await.unwrap());
    assert!(rx_b.await.unwrap());
}

#[tokio::test]
async fn test_plain_http_rejected_in_tls_only_mode() {
    let server = MockServer::start();
    let network = Network::builder()
        .config(NetworkConfig {
            transport: requestkit::TransportSecurity::TlsOnly,
            ..NetworkConfig::for_testing()
        })
        .build()
        .unwrap();
    let endpoint = Endpoint::<()>::get(&server, "/anything");

    let err = fetch(&network, &endpoint).await.unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Underlying {
            source: HttpError::InvalidScheme { .. },
            response: None
        }
    ));
}
