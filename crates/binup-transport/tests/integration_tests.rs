//! Integration tests for binup-transport
//!
//! These tests spin up a real HTTP server and drive the transport against it,
//! checking what arrives on the wire and what comes back to the callbacks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, Path};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use binup_transport::header::HeaderValue;
use binup_transport::testing::{read_parts, TestServer};
use binup_transport::{
    FieldValue, Method, TransportConfig, UploadError, UploadFile, UploadHandlers, UploadRequest,
};
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value};

// =============================================================================
// Test server
// =============================================================================

const ANNOTATED: &[u8] = b"\x89PNG\r\n\x1a\n annotated frame \x00\xff";

async fn parts_handler(multipart: Multipart) -> impl IntoResponse {
    let parts = read_parts(multipart).await.unwrap_or_default();
    let described: Vec<Value> = parts
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "filename": p.filename,
                "content_type": p.content_type,
                "data": String::from_utf8_lossy(&p.data),
            })
        })
        .collect();
    Json(described)
}

async fn image_handler(_multipart: Multipart) -> impl IntoResponse {
    // Declares JSON on purpose; the transport must not care.
    ([("content-type", "application/json")], ANNOTATED)
}

async fn status_handler(Path(code): Path<u16>) -> impl IntoResponse {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn json_error_handler() -> impl IntoResponse {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": "bad" })))
}

async fn text_error_handler() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "oops")
}

async fn headers_handler(headers: HeaderMap) -> impl IntoResponse {
    let pick = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };
    Json(json!({
        "x-test": pick("x-test"),
        "x-skip": pick("x-skip"),
        "x-multi": headers
            .get_all("x-multi")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>(),
        "x-default": pick("x-default"),
        "cookie": pick("cookie"),
        "user-agent": pick("user-agent"),
        "content-type": pick("content-type"),
    }))
}

async fn slow_handler() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(10)).await;
    "late"
}

fn router() -> Router {
    Router::new()
        .route("/detect/pic", post(image_handler))
        .route("/parts", post(parts_handler))
        .route("/status/{code}", post(status_handler).put(status_handler))
        .route("/json-error", post(json_error_handler))
        .route("/text-error", post(text_error_handler))
        .route("/headers", post(headers_handler))
        .route("/slow", post(slow_handler))
}

fn jpeg(name: &str) -> UploadFile {
    UploadFile::new(name, b"\xff\xd8\xff\xe0 fake jpeg".to_vec())
}

/// Callback recorder counting how often each side fires
#[derive(Clone, Default)]
struct Recorder {
    successes: Arc<AtomicUsize>,
    errors: Arc<AtomicUsize>,
    body: Arc<Mutex<Option<Bytes>>>,
    error: Arc<Mutex<Option<UploadError>>>,
}

impl Recorder {
    fn handlers(&self) -> UploadHandlers {
        let ok = self.clone();
        let err = self.clone();
        UploadHandlers::new(
            move |body| {
                ok.successes.fetch_add(1, Ordering::SeqCst);
                *ok.body.lock() = Some(body);
            },
            move |e| {
                err.errors.fetch_add(1, Ordering::SeqCst);
                *err.error.lock() = Some(e);
            },
        )
    }

    fn counts(&self) -> (usize, usize) {
        (
            self.successes.load(Ordering::SeqCst),
            self.errors.load(Ordering::SeqCst),
        )
    }
}

// =============================================================================
// Success path
// =============================================================================

#[tokio::test]
async fn test_success_delivers_raw_body_once() {
    let server = TestServer::start(router()).await.unwrap();
    let recorder = Recorder::default();

    let handle = server.transport.execute(
        UploadRequest::new("/detect/pic", jpeg("upload.jpg")),
        recorder.handlers(),
    );

    assert!(handle.settled().await);
    assert_eq!(recorder.counts(), (1, 0));
    assert_eq!(
        recorder.body.lock().clone().unwrap(),
        Bytes::from_static(ANNOTATED)
    );
}

#[tokio::test]
async fn test_execute_returns_before_any_callback() {
    let server = TestServer::start(router()).await.unwrap();
    let recorder = Recorder::default();

    let handle = server.transport.execute(
        UploadRequest::new("/detect/pic", jpeg("upload.jpg")),
        recorder.handlers(),
    );

    assert_eq!(recorder.counts(), (0, 0));
    assert!(!handle.is_finished());
    assert!(handle.settled().await);
    assert_eq!(recorder.counts(), (1, 0));
}

#[tokio::test]
async fn test_future_upload_returns_body() {
    let server = TestServer::start(router()).await.unwrap();

    let body = server
        .transport
        .upload(UploadRequest::new("/detect/pic", jpeg("upload.jpg")))
        .await
        .unwrap();

    assert_eq!(body, Bytes::from_static(ANNOTATED));
}

#[tokio::test]
async fn test_progress_handler_is_never_called() {
    let server = TestServer::start(router()).await.unwrap();
    let recorder = Recorder::default();
    let progress_calls = Arc::new(AtomicUsize::new(0));
    let counter = progress_calls.clone();

    let handlers = recorder.handlers().on_progress(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let handle = server
        .transport
        .execute(UploadRequest::new("/detect/pic", jpeg("a.jpg")), handlers);

    assert!(handle.settled().await);
    assert_eq!(recorder.counts(), (1, 0));
    assert_eq!(progress_calls.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Multipart body on the wire
// =============================================================================

#[tokio::test]
async fn test_multipart_parts_on_the_wire() {
    let server = TestServer::start(router()).await.unwrap();

    let request = UploadRequest::new("/parts", jpeg("upload.jpg").with_content_type("image/jpeg"))
        .file_field("image")
        .field("foo", "bar")
        .field("blobField", FieldValue::named_blob(b"png".to_vec(), "name.png"))
        .field("ignored", json!(42));

    let body = server.transport.upload(request).await.unwrap();
    let parts: Vec<Value> = serde_json::from_slice(&body).unwrap();

    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0]["name"], "foo");
    assert_eq!(parts[0]["filename"], Value::Null);
    assert_eq!(parts[0]["data"], "bar");
    assert_eq!(parts[1]["name"], "blobField");
    assert_eq!(parts[1]["filename"], "name.png");
    assert_eq!(parts[1]["data"], "png");
    assert_eq!(parts[2]["name"], "image");
    assert_eq!(parts[2]["filename"], "upload.jpg");
    assert_eq!(parts[2]["content_type"], "image/jpeg");
}

// =============================================================================
// Headers and credentials
// =============================================================================

#[tokio::test]
async fn test_header_mapping_skips_null() {
    let server = TestServer::start_with_config(
        router(),
        TransportConfig::builder().default_header("X-Default", "on"),
    )
    .await
    .unwrap();

    let request = UploadRequest::new("/headers", jpeg("a.jpg"))
        .header("X-Test", "1")
        .header("X-Skip", Value::Null);

    let body = server.transport.upload(request).await.unwrap();
    let seen: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(seen["x-test"], "1");
    assert_eq!(seen["x-skip"], Value::Null);
    assert_eq!(seen["x-default"], "on");
    assert!(seen["user-agent"].as_str().unwrap().starts_with("binup/"));
    assert!(seen["content-type"]
        .as_str()
        .unwrap()
        .starts_with("multipart/form-data; boundary="));
}

#[tokio::test]
async fn test_header_collection_is_applied() {
    let server = TestServer::start(router()).await.unwrap();

    let mut headers = binup_transport::header::HeaderMap::new();
    headers.insert("x-test", HeaderValue::from_static("from-map"));
    headers.append("x-multi", HeaderValue::from_static("a"));
    headers.append("x-multi", HeaderValue::from_static("b"));

    let request = UploadRequest::new("/headers", jpeg("a.jpg")).headers(headers);
    let body = server.transport.upload(request).await.unwrap();
    let seen: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(seen["x-test"], "from-map");
    assert_eq!(seen["x-multi"], json!(["a", "b"]));
}

#[tokio::test]
async fn test_invalid_header_reports_error() {
    let server = TestServer::start(router()).await.unwrap();

    let request = UploadRequest::new("/headers", jpeg("a.jpg")).header("X-Bad", "line\nbreak");
    let err = server.transport.upload(request).await.unwrap_err();

    assert_eq!(err.status, 0);
    assert!(err.message.contains("X-Bad"));
}

#[tokio::test]
async fn test_cookies_only_with_credentials() {
    let server = TestServer::start(router()).await.unwrap();
    let url = server.url("/headers").parse().unwrap();
    server
        .transport
        .cookie_jar()
        .add_cookie_str("session=abc123", &url);

    let with = server
        .transport
        .upload(UploadRequest::new("/headers", jpeg("a.jpg")).with_credentials(true))
        .await
        .unwrap();
    let without = server
        .transport
        .upload(UploadRequest::new("/headers", jpeg("a.jpg")))
        .await
        .unwrap();

    let with: Value = serde_json::from_slice(&with).unwrap();
    let without: Value = serde_json::from_slice(&without).unwrap();
    assert_eq!(with["cookie"], "session=abc123");
    assert_eq!(without["cookie"], Value::Null);
}

// =============================================================================
// Error classification
// =============================================================================

#[tokio::test]
async fn test_non_2xx_statuses_reach_on_error() {
    let server = TestServer::start(router()).await.unwrap();

    for code in [302u16, 400, 404, 500, 503] {
        let recorder = Recorder::default();
        let action = format!("/status/{}", code);
        let handle = server.transport.execute(
            UploadRequest::new(action.clone(), jpeg("a.jpg")),
            recorder.handlers(),
        );

        assert!(handle.settled().await);
        assert_eq!(recorder.counts(), (0, 1), "status {}", code);

        let err = recorder.error.lock().clone().unwrap();
        assert_eq!(err.status, code);
        assert_eq!(err.method, Method::POST);
        assert_eq!(err.url, action);
        assert_eq!(err.message, format!("fail to POST {} {}", action, code));
    }
}

#[tokio::test]
async fn test_2xx_range_is_success() {
    let server = TestServer::start(router()).await.unwrap();

    for code in [200u16, 201, 204, 299] {
        let body = server
            .transport
            .upload(UploadRequest::new(format!("/status/{}", code), jpeg("a.jpg")))
            .await;
        assert_eq!(body, Ok(Bytes::new()), "status {}", code);
    }
}

#[tokio::test]
async fn test_method_is_reported_in_error() {
    let server = TestServer::start(router()).await.unwrap();

    let err = server
        .transport
        .upload(UploadRequest::new("/status/418", jpeg("a.jpg")).method(Method::PUT))
        .await
        .unwrap_err();

    assert_eq!(err.status, 418);
    assert_eq!(err.method, Method::PUT);
    assert_eq!(err.message, "fail to PUT /status/418 418");
}

#[tokio::test]
async fn test_error_message_from_json_field() {
    let server = TestServer::start(router()).await.unwrap();

    let err = server
        .transport
        .upload(UploadRequest::new("/json-error", jpeg("a.jpg")))
        .await
        .unwrap_err();

    assert_eq!(err.status, 400);
    assert_eq!(err.message, "bad");
}

#[tokio::test]
async fn test_error_message_from_text() {
    let server = TestServer::start(router()).await.unwrap();

    let err = server
        .transport
        .upload(UploadRequest::new("/text-error", jpeg("a.jpg")))
        .await
        .unwrap_err();

    assert_eq!(err.status, 500);
    assert_eq!(err.message, "oops");
}

#[tokio::test]
async fn test_connection_refused_has_status_zero() {
    // Grab a free port, then close it again
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport =
        binup_transport::UploadTransport::new(TransportConfig::default()).unwrap();
    let action = format!("http://{}/detect/pic", addr);
    let recorder = Recorder::default();

    let handle = transport.execute(
        UploadRequest::new(action.clone(), jpeg("a.jpg")),
        recorder.handlers(),
    );

    assert!(handle.settled().await);
    assert_eq!(recorder.counts(), (0, 1));
    let err = recorder.error.lock().clone().unwrap();
    assert_eq!(err.status, 0);
    assert_eq!(err.message, format!("fail to POST {} 0", action));
}

// =============================================================================
// Cancellation and timeouts
// =============================================================================

#[tokio::test]
async fn test_abort_suppresses_callbacks() {
    let server = TestServer::start(router()).await.unwrap();
    let recorder = Recorder::default();

    let handle = server
        .transport
        .execute(UploadRequest::new("/slow", jpeg("a.jpg")), recorder.handlers());
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.abort();

    assert!(!handle.settled().await);
    assert_eq!(recorder.counts(), (0, 0));
}

#[tokio::test]
async fn test_configured_timeout_is_a_transport_failure() {
    let server = TestServer::start_with_config(
        router(),
        TransportConfig::builder().request_timeout_ms(100),
    )
    .await
    .unwrap();

    let err = server
        .transport
        .upload(UploadRequest::new("/slow", jpeg("a.jpg")))
        .await
        .unwrap_err();

    assert_eq!(err.status, 0);
    assert_eq!(err.url, "/slow");
}
