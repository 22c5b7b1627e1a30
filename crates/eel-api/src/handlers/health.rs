//! Health check handlers for service monitoring.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::AppState;

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service health status
    pub status: &'static str,
    /// Timestamp when health check was performed
    pub timestamp: DateTime<Utc>,
    /// Deployed version
    pub version: String,
    /// Instance name
    pub instance: String,
    /// Deployment environment
    pub env: String,
}

/// Health check endpoint handler.
///
/// Reports identity only; the dispatcher has no stateful dependencies to
/// probe.
#[instrument(name = "health_check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Response {
    let settings = state.runtime.settings();
    let version =
        if settings.version.is_empty() { env!("CARGO_PKG_VERSION") } else { settings.version.as_str() };

    let response = HealthResponse {
        status: "healthy",
        timestamp: DateTime::<Utc>::from(state.clock.now_system()),
        version: version.to_string(),
        instance: state.runtime.instance_name().to_string(),
        env: state.runtime.env_name().to_string(),
    };

    debug!(instance = %response.instance, "Health check completed");
    (StatusCode::OK, Json(response)).into_response()
}

/// Liveness check endpoint for orchestration probes.
#[instrument(name = "liveness_check", skip(state))]
pub async fn liveness_check(State(state): State<AppState>) -> Response {
    let response = serde_json::json!({
        "status": "alive",
        "timestamp": DateTime::<Utc>::from(state.clock.now_system()),
        "service": state.runtime.instance_name(),
    });

    (StatusCode::OK, Json(response)).into_response()
}
