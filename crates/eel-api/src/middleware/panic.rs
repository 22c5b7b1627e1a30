//! Panic capture around every route.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use eel_core::{catch_panic_async, Context};
use serde_json::json;

use crate::AppState;

/// Runs the rest of the stack, turning a panic into a logged 500.
///
/// The request context is created here, takes its correlation id from the
/// transaction header when present, and is placed in the request extensions
/// so handlers derive their spans from it. A panic is logged once through it
/// with `panicError` and a truncated `stackTrace`; the server keeps running.
pub async fn wrap_panic_http_handler(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let settings = Arc::clone(state.runtime.settings());
    let ctx = Arc::new(state.runtime.request_context());
    if let Some(id) = req
        .headers()
        .get(settings.transaction_header())
        .and_then(|value| value.to_str().ok())
        .filter(|id| !id.is_empty())
    {
        ctx.set_id(id);
    }
    ctx.put_log_value("route", req.uri().path());
    req.extensions_mut().insert(Arc::clone(&ctx));

    match catch_panic_async(&ctx, next.run(req)).await {
        Some(response) => response,
        None => {
            let mut response = (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal server error", "correlationId": ctx.id()})),
            )
                .into_response();
            echo_transaction_header(&mut response, settings.transaction_header(), &ctx);
            response
        },
    }
}

/// Sets the transaction header on `response` to the correlation id of `ctx`.
pub(crate) fn echo_transaction_header(response: &mut Response, header: &str, ctx: &Context) {
    if let (Ok(name), Ok(value)) = (HeaderName::try_from(header), HeaderValue::from_str(&ctx.id())) {
        response.headers_mut().insert(name, value);
    }
}
