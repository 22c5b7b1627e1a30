//! Event ingest: dedup, then forward downstream with retries.
//!
//! Each request runs in its own `http.handle` observer span. Headers, query,
//! tenant and partner are recorded on the span context before the payload
//! is checked against the duplicate window and handed to the retry driver.
//! The downstream status and body are mirrored back to the caller.

use std::{collections::HashMap, sync::Arc};

use axum::{
    body::{to_bytes, Body},
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use bytes::Bytes;
use eel_core::{
    attributes,
    helpers::{lookup_path, split_tenant, to_flat_string},
    keys, metrics, spans, Attribute, Context, Settings,
};
use eel_delivery::{duplicate_checker, Exchange, OutboundRequest};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument, warn};

use crate::{middleware::panic::echo_transaction_header, server::EVENTS_ROUTE, AppState};

/// Body returned when a payload is suppressed.
#[derive(Debug, Serialize)]
pub struct DuplicateResponse {
    /// Always `"duplicate"`
    pub status: &'static str,
}

/// Accepts an event and forwards it to the configured endpoint.
///
/// Returns:
/// - 200 `{"status":"duplicate"}` when the payload was seen within the window
/// - 413 when the body exceeds `MaxMessageSize`
/// - 502 when the downstream could not be reached
/// - 503 when no endpoint is configured
///
/// A payload whose delivery failed is forgotten by the duplicate checker so
/// the caller may resend it.
/// - otherwise the downstream status and body
///
/// The span derives from the request context placed in the extensions by
/// [`wrap_panic_http_handler`](crate::wrap_panic_http_handler), or from the
/// root context when the route runs without it.
#[instrument(name = "ingest_event", skip_all)]
pub async fn ingest_event(
    State(state): State<AppState>,
    request_ctx: Option<Extension<Arc<Context>>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let settings = state.runtime.settings().clone();
    let started = state.clock.now();

    let mut attrs: Vec<Attribute> = vec![
        (attributes::HTTP_METHOD, "POST".to_string()),
        (attributes::HTTP_ROUTE, EVENTS_ROUTE.to_string()),
    ];
    if let Some(host) = header_str(&headers, header::HOST.as_str()) {
        attrs.push((attributes::HTTP_HOST, host.to_string()));
    }

    let ctx = match &request_ctx {
        Some(Extension(parent)) => parent.start_span(spans::HTTP_HANDLE, &attrs),
        None => state.runtime.root().start_span(spans::HTTP_HANDLE, &attrs),
    };
    if let Some(id) = header_str(&headers, settings.transaction_header()).filter(|id| !id.is_empty()) {
        ctx.set_id(id);
    }
    record_request(&ctx, &settings, &headers, &query);

    let mut response = handle(&state, &ctx, &settings, &headers, body, &mut attrs).await;

    echo_transaction_header(&mut response, settings.transaction_header(), &ctx);

    attrs.push((attributes::HTTP_STATUS_CODE, response.status().as_u16().to_string()));
    let elapsed_ms = i64::try_from(state.clock.now().duration_since(started).as_millis()).unwrap_or(i64::MAX);
    let observer = ctx.observer();
    observer.record(&ctx, metrics::HTTP_HANDLE_DURATION, &attrs, elapsed_ms);
    observer.end(&ctx, &attrs, None);

    response
}

async fn handle(
    state: &AppState,
    ctx: &Context,
    settings: &Settings,
    headers: &HeaderMap,
    body: Body,
    attrs: &mut Vec<Attribute>,
) -> Response {
    let limit = match usize::try_from(settings.max_message_size) {
        Ok(0) | Err(_) => usize::MAX,
        Ok(limit) => limit,
    };
    let payload = match to_bytes(body, limit).await {
        Ok(payload) => payload,
        Err(e) => {
            let limit = settings.max_message_size.to_string();
            let reason = e.to_string();
            ctx.log().warn("payload rejected", &[("limit", limit.as_str()), ("reason", reason.as_str())]);
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, "payload too large");
        },
    };

    if let Ok(document) = serde_json::from_slice::<Value>(&payload) {
        record_payload_fields(ctx, settings, &document, attrs);
    }

    if settings.endpoint.is_empty() {
        ctx.log().error("no endpoint configured", &[]);
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "no endpoint configured");
    }

    let checker = duplicate_checker(ctx);
    if let Some(checker) = &checker {
        if checker.is_duplicate(&payload) {
            ctx.log().info("duplicate event suppressed", &[]);
            return (StatusCode::OK, Json(DuplicateResponse { status: "duplicate" })).into_response();
        }
    }

    let request = outbound_request(ctx, settings, headers, payload);
    let exchange = state.driver.send(ctx, &request).await;
    debug!(status = exchange.status, "downstream exchange finished");

    // Undelivered payloads must stay acceptable for the caller's own retry.
    if exchange.is_retryable() {
        if let Some(checker) = &checker {
            checker.forget(&request.payload);
        }
    }
    downstream_response(ctx, exchange)
}

/// Copies headers, query and tenant identity onto the request context.
fn record_request(ctx: &Context, settings: &Settings, headers: &HeaderMap, query: &HashMap<String, String>) {
    let header_values: Map<String, Value> = headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str().to_string(), Value::from(value.to_str().ok()?))))
        .collect();
    ctx.put_value(keys::HEADER, Value::Object(header_values));
    ctx.put_value(keys::QUERY, json!(query));

    let tenant = header_str(headers, settings.tenant_header()).unwrap_or_default();
    let (app_id, mut partner_id) = split_tenant(tenant, settings.allow_partner, settings.default_partner());
    if settings.allow_partner {
        if let Some(partner) = header_str(headers, settings.partner_header()).filter(|p| !p.is_empty()) {
            partner_id = partner.to_string();
        }
    }

    if !app_id.is_empty() {
        ctx.put_value(keys::TENANT_ID, app_id.as_str());
        ctx.put_log_value(keys::TENANT_ID, app_id);
    }
    if !partner_id.is_empty() {
        ctx.put_value(keys::PARTNER_ID, partner_id.as_str());
        ctx.put_log_value(keys::PARTNER_ID, partner_id);
    }
}

/// Resolves `LogParams` and `TopicPath` against the payload.
fn record_payload_fields(ctx: &Context, settings: &Settings, document: &Value, attrs: &mut Vec<Attribute>) {
    for (field, path) in &settings.log_params {
        if let Some(value) = lookup_path(document, path) {
            ctx.put_log_value(field.as_str(), to_flat_string(value));
        }
    }

    if !settings.topic_path.is_empty() {
        if let Some(topic) = lookup_path(document, &settings.topic_path) {
            let topic = to_flat_string(topic);
            ctx.put_value(attributes::TOPIC, topic.as_str());
            attrs.push((attributes::TOPIC, topic));
        }
    }
}

fn outbound_request(ctx: &Context, settings: &Settings, headers: &HeaderMap, payload: Bytes) -> OutboundRequest {
    let content_type = header_str(headers, header::CONTENT_TYPE.as_str()).unwrap_or("application/json");
    let mut request = OutboundRequest::post(settings.endpoint.clone(), payload)
        .with_header(header::CONTENT_TYPE.as_str(), content_type)
        .with_header(settings.transaction_header(), ctx.id())
        .with_auth(settings.endpoint_auth.clone());

    if let Some(tenant) = header_str(headers, settings.tenant_header()) {
        request = request.with_header(settings.tenant_header(), tenant);
    }
    request
}

fn downstream_response(ctx: &Context, exchange: Exchange) -> Response {
    if let Some(error) = exchange.error {
        let message = error.to_string();
        ctx.log().error("delivery failed", &[("error", message.as_str())]);
        return error_response(StatusCode::BAD_GATEWAY, &message);
    }

    let status = StatusCode::from_u16(exchange.status).unwrap_or(StatusCode::BAD_GATEWAY);
    if !status.is_success() {
        let code = exchange.status.to_string();
        warn!(status = exchange.status, "downstream returned non-success status");
        ctx.log().warn("downstream rejected event", &[("status", code.as_str())]);
    }
    (status, exchange.body).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
