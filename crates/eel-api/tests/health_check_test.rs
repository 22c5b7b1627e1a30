//! Health and liveness probe tests.

#![allow(clippy::unwrap_used)]

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{body_bytes, TestApp};
use eel_testing::{ScriptedTransport, SettingsBuilder};
use serde_json::Value;

#[tokio::test]
async fn health_reports_identity() {
    let settings = SettingsBuilder::new().field("Name", "eel-3").field("Version", "2.4.1").build();
    let app = TestApp::new(settings, ScriptedTransport::default());

    let response = app.send(Request::get("/health").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["instance"], "eel-3");
    assert_eq!(body["version"], "2.4.1");
    assert_eq!(body["env"], "test");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn liveness_is_always_ok() {
    let app = TestApp::new(SettingsBuilder::new().build(), ScriptedTransport::default());

    let response = app.send(Request::get("/live").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "alive");
    assert_eq!(body["service"], "eel");
}
