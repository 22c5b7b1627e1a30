//! Event ingest tests: forwarding, retries, dedup and limits.

#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use axum::{body::Body, http::StatusCode};
use common::{body_bytes, post_event, TestApp};
use eel_core::{keys, LogLevel};
use eel_delivery::{DeliveryError, Exchange};
use eel_testing::{ScriptedTransport, SettingsBuilder};
use serde_json::{json, Value};

const ENDPOINT: &str = "http://downstream.test/events";

fn settings() -> SettingsBuilder {
    SettingsBuilder::retrying().endpoint(ENDPOINT).field("AllowPartner", true)
}

#[tokio::test]
async fn forwards_event_and_echoes_correlation_id() {
    let transport = ScriptedTransport::default();
    transport.push(Exchange::response(202, "queued"));
    let app = TestApp::new(settings().build(), transport);

    let response = app
        .send(
            post_event()
                .header("X-Tenant-Id", "shop_acme")
                .header("X-B3-TraceId", "trace-123")
                .body(Body::from(r#"{"id":1}"#))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers()["X-B3-TraceId"], "trace-123");
    assert_eq!(body_bytes(response).await, "queued");

    let sent = app.transport.sent();
    assert_eq!(sent.len(), 1);
    let (correlation_id, request) = &sent[0];
    assert_eq!(correlation_id, "trace-123");
    assert_eq!(request.url, ENDPOINT);
    assert_eq!(request.payload, r#"{"id":1}"#);
    assert_eq!(request.headers.get("X-Tenant-Id").map(String::as_str), Some("shop_acme"));
    assert_eq!(request.headers.get("X-B3-TraceId").map(String::as_str), Some("trace-123"));
}

#[tokio::test]
async fn mints_correlation_id_when_header_missing() {
    let app = TestApp::new(settings().build(), ScriptedTransport::statuses(&[200]));

    let response = app.send(post_event().body(Body::from("{}")).unwrap()).await;

    let echoed = response.headers()["X-B3-TraceId"].to_str().unwrap().to_string();
    assert_eq!(echoed.len(), 36);
    assert_eq!(app.transport.sent()[0].0, echoed);
}

#[tokio::test]
async fn server_errors_are_retried_then_mirrored() {
    let app = TestApp::new(settings().build(), ScriptedTransport::statuses(&[500, 500, 200]));

    let response = app.send(post_event().body(Body::from("{}")).unwrap()).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.transport.calls(), 3);
    assert_eq!(app.clock.total_slept(), Duration::from_millis(35));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let app = TestApp::new(settings().build(), ScriptedTransport::statuses(&[404]));

    let response = app.send(post_event().body(Body::from("{}")).unwrap()).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.transport.calls(), 1);
    assert_eq!(app.clock.sleep_count(), 0);
}

#[tokio::test]
async fn transport_failure_is_bad_gateway() {
    let transport = ScriptedTransport::failing(DeliveryError::network("connection refused"));
    let app = TestApp::new(settings().build(), transport);

    let response = app.send(post_event().body(Body::from("{}")).unwrap()).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(app.transport.calls(), 3);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(body["error"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn duplicate_payload_is_suppressed() {
    let app = TestApp::new(settings().dedup(1000, 16).build(), ScriptedTransport::statuses(&[200]));
    let payload = r#"{"event":"order.created","id":42}"#;

    let first = app.send(post_event().body(Body::from(payload)).unwrap()).await;
    let second = app.send(post_event().body(Body::from(payload)).unwrap()).await;

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(second).await).unwrap();
    assert_eq!(body, json!({"status": "duplicate"}));
    assert_eq!(app.transport.calls(), 1);

    app.clock.advance(Duration::from_millis(1500));
    let third = app.send(post_event().body(Body::from(payload)).unwrap()).await;
    assert_eq!(third.status(), StatusCode::OK);
    assert_eq!(app.transport.calls(), 2);
}

#[tokio::test]
async fn failed_delivery_leaves_payload_open_for_client_retry() {
    let transport = ScriptedTransport::default();
    for _ in 0..3 {
        transport.push(Exchange::failed(DeliveryError::network("connection reset")));
    }
    transport.push(Exchange::response(200, "ok"));
    let app = TestApp::new(settings().dedup(60_000, 16).build(), transport);
    let payload = r#"{"event":"order.paid","id":7}"#;

    let first = app.send(post_event().body(Body::from(payload)).unwrap()).await;
    assert_eq!(first.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(app.transport.calls(), 3);

    let second = app.send(post_event().body(Body::from(payload)).unwrap()).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_bytes(second).await, "ok");
    assert_eq!(app.transport.calls(), 4);

    let third = app.send(post_event().body(Body::from(payload)).unwrap()).await;
    let body: Value = serde_json::from_slice(&body_bytes(third).await).unwrap();
    assert_eq!(body, json!({"status": "duplicate"}));
    assert_eq!(app.transport.calls(), 4);
}

#[tokio::test]
async fn exhausted_server_errors_do_not_mark_payload_seen() {
    let transport = ScriptedTransport::statuses(&[503, 503, 503, 201]);
    let app = TestApp::new(settings().dedup(60_000, 16).build(), transport);

    let first = app.send(post_event().body(Body::from("{\"id\":8}")).unwrap()).await;
    let second = app.send(post_event().body(Body::from("{\"id\":8}")).unwrap()).await;

    assert_eq!(first.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(second.status(), StatusCode::CREATED);
    assert_eq!(app.transport.calls(), 4);
}

#[tokio::test]
async fn oversized_payload_is_rejected() {
    let app = TestApp::new(settings().field("MaxMessageSize", 16).build(), ScriptedTransport::default());

    let response = app.send(post_event().body(Body::from("x".repeat(64))).unwrap()).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.transport.calls(), 0);
}

#[tokio::test]
async fn missing_endpoint_is_unavailable() {
    let app = TestApp::new(SettingsBuilder::new().build(), ScriptedTransport::default());

    let response = app.send(post_event().body(Body::from("{}")).unwrap()).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(app.transport.calls(), 0);
}

#[tokio::test]
async fn log_lines_carry_tenant_attempt_and_payload_fields() {
    let settings = settings().log_param("orderId", "order.id").field("TopicPath", "topic").build();
    let app = TestApp::new(settings, ScriptedTransport::statuses(&[409]));

    app.send(
        post_event()
            .header("X-Tenant-Id", "shop_acme")
            .header("X-B3-TraceId", "trace-9")
            .body(Body::from(r#"{"topic":"orders","order":{"id":"A-17"}}"#))
            .unwrap(),
    )
    .await;

    let rejected = app.sink.with_message("downstream rejected event");
    assert_eq!(rejected.len(), 1);
    let line = &rejected[0];
    assert_eq!(line.level, LogLevel::Warn);
    assert_eq!(line.field(keys::TENANT_ID).as_deref(), Some("shop"));
    assert_eq!(line.field(keys::PARTNER_ID).as_deref(), Some("acme"));
    assert_eq!(line.field(keys::LOG_TX_ID).as_deref(), Some("trace-9"));
    assert_eq!(line.field(keys::LOG_ATTEMPT).as_deref(), Some("1"));
    assert_eq!(line.field("orderId").as_deref(), Some("A-17"));
    assert_eq!(line.field("status").as_deref(), Some("409"));
}

#[tokio::test]
async fn partner_header_overrides_tenant_suffix() {
    let app = TestApp::new(settings().build(), ScriptedTransport::statuses(&[400]));

    app.send(
        post_event()
            .header("X-Tenant-Id", "shop")
            .header("X-Partner-Id", "globex")
            .body(Body::from("{}"))
            .unwrap(),
    )
    .await;

    let line = &app.sink.with_message("downstream rejected event")[0];
    assert_eq!(line.field(keys::TENANT_ID).as_deref(), Some("shop"));
    assert_eq!(line.field(keys::PARTNER_ID).as_deref(), Some("globex"));
}
