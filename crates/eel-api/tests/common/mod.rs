//! Shared router setup for API tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response, Router};
use eel_api::{create_router, AppState};
use eel_core::{Runtime, Settings};
use eel_delivery::{register_duplicate_checker, register_transport, DuplicateConfig, LruDuplicateChecker, Transport};
use eel_testing::{CapturingSink, ScriptedTransport, TestClock};
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub transport: Arc<ScriptedTransport>,
    pub sink: Arc<CapturingSink>,
    pub clock: TestClock,
}

impl TestApp {
    pub fn new(settings: Settings, transport: ScriptedTransport) -> Self {
        let transport = Arc::new(transport);
        let mut app = Self::with_transport(settings, transport.clone());
        app.transport = transport;
        app
    }

    /// Registers `downstream` in place of the scripted transport; `transport`
    /// then stays idle.
    pub fn with_transport(settings: Settings, downstream: Arc<dyn Transport>) -> Self {
        let sink = CapturingSink::new();
        let clock = TestClock::new();
        let transport = Arc::new(ScriptedTransport::default());

        let runtime = Runtime::with_root(CapturingSink::context(&sink), settings, "test");
        register_transport(runtime.root(), downstream);
        if let Some(config) = DuplicateConfig::from_settings(runtime.settings()) {
            let checker = LruDuplicateChecker::from_config(config, Arc::new(clock.clone()));
            register_duplicate_checker(runtime.root(), Arc::new(checker));
        }

        let state = AppState::new(runtime, Arc::new(clock.clone()));
        Self { router: create_router(state), transport, sink, clock }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub fn post_event() -> axum::http::request::Builder {
    Request::builder().method("POST").uri("/v1/events").header("content-type", "application/json")
}

pub async fn body_bytes(response: Response) -> bytes::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
}
