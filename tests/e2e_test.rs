//! End-to-end: settings file on disk through the router to a live downstream.

#![allow(clippy::unwrap_used)]

use std::{io::Write, sync::Arc};

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use eel_api::{create_router, AppState};
use eel_core::{RealClock, Runtime, Settings};
use eel_delivery::{
    register_duplicate_checker, register_transport, ClientConfig, DuplicateConfig, HttpTransport,
    LruDuplicateChecker,
};
use serde_json::json;
use tempfile::NamedTempFile;
use tower::ServiceExt;
use wiremock::{
    matchers::{body_string, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn write_config(document: &serde_json::Value) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(document.to_string().as_bytes()).unwrap();
    file
}

fn router_for(settings: Settings) -> axum::Router {
    let clock = Arc::new(RealClock::new());
    let client = ClientConfig::from_settings(&settings);
    let dedup = DuplicateConfig::from_settings(&settings);

    let runtime = Runtime::new(settings, "e2e");
    register_transport(runtime.root(), Arc::new(HttpTransport::new(client).unwrap()));
    if let Some(config) = dedup {
        register_duplicate_checker(runtime.root(), Arc::new(LruDuplicateChecker::from_config(config, clock.clone())));
    }
    create_router(AppState::new(runtime, clock))
}

fn event(body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/events")
        .header("content-type", "application/json")
        .header("X-B3-TraceId", "e2e-trace")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn event_flows_from_config_file_to_downstream() {
    let downstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("X-B3-TraceId", "e2e-trace"))
        .and(body_string(r#"{"n":1}"#))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&downstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(201).set_body_string("stored"))
        .mount(&downstream)
        .await;

    let config = write_config(&json!({
        "Name": "eel-e2e",
        "Endpoint": format!("{}/hook", downstream.uri()),
        "MaxAttempts": 3,
        "InitialDelay": 5,
        "InitialBackoff": 5,
        "HttpTimeout": 2000,
        "DuplicateTimeout": 60000,
        "DuplicateCacheSize": 100
    }));
    let settings = Settings::load(config.path()).unwrap();
    let router = router_for(settings);

    let response = router.clone().oneshot(event(r#"{"n":1}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["X-B3-TraceId"], "e2e-trace");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, "stored");
    assert_eq!(downstream.received_requests().await.unwrap().len(), 2);

    let repeat = router.oneshot(event(r#"{"n":1}"#)).await.unwrap();
    assert_eq!(repeat.status(), StatusCode::OK);
    assert_eq!(downstream.received_requests().await.unwrap().len(), 2);
}

#[test]
fn missing_config_file_reports_open_cause() {
    let dir = tempfile::tempdir().unwrap();
    let error = Settings::load(dir.path().join("absent.json")).unwrap_err();

    let line: serde_json::Value = serde_json::from_str(&error.to_json_line()).unwrap();
    assert_eq!(line["error_type"], "get_config");
    assert_eq!(line["cause"], "open_config");
}

#[test]
fn malformed_config_file_reports_parse_cause() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"{\"MaxAttempts\": \"many\"}").unwrap();

    let error = Settings::load(file.path()).unwrap_err();
    assert_eq!(error.cause(), "parse_config");
}
