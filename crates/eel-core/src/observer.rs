//! Pluggable metrics and tracing sink.
//!
//! An [`Observer`] is registered once in the root context's ConfigValues
//! under [`keys::OBSERVER`](crate::keys::OBSERVER) and consulted around every
//! phase boundary of request handling. When none is registered the dispatcher
//! falls back to [`NoOpObserver`], whose `start` still returns a span-scoped
//! sub-context so callers can treat the result uniformly.

use std::{error::Error, fmt, sync::Arc};

use serde_json::{Map, Value};

use crate::{
    context::Context,
    keys,
    logging::LogLevel,
    time::{Clock, RealClock},
};

/// One observer attribute.
pub type Attribute = (&'static str, String);

/// Metric identifiers.
pub mod metrics {
    /// Outbound request duration.
    pub const HTTP_REQUEST_DURATION: &str = "http.request.duration";
    /// Inbound request handling duration.
    pub const HTTP_HANDLE_DURATION: &str = "http.handle.duration";
    /// Message processing duration.
    pub const MESSAGE_PROCESS_DURATION: &str = "message.process.duration";
    /// Message response duration.
    pub const MESSAGE_RESPONSE_DURATION: &str = "message.response.duration";
    /// Delay between message creation and processing.
    pub const MESSAGE_LATENCY: &str = "message.message.latency";
}

/// Span identifiers.
pub mod spans {
    /// Inbound request handling.
    pub const HTTP_HANDLE: &str = "http.handle";
    /// Outbound request.
    pub const HTTP_REQUEST: &str = "http.request";
    /// Message processing.
    pub const MESSAGE_PROCESS: &str = "message.process";
}

/// Attribute keys.
pub mod attributes {
    /// Request host.
    pub const HTTP_HOST: &str = "http.host";
    /// Request method.
    pub const HTTP_METHOD: &str = "http.method";
    /// Matched route.
    pub const HTTP_ROUTE: &str = "http.route";
    /// Response status code.
    pub const HTTP_STATUS_CODE: &str = "http.status_code";
    /// Request URL.
    pub const HTTP_URL: &str = "http.url";
    /// Failure family of an unsuccessful request.
    pub const ERROR_TYPE: &str = "error.type";
    /// Event topic.
    pub const TOPIC: &str = "topic";
    /// Handler name.
    pub const HANDLER: &str = "handler";
}

/// Metrics and tracing sink.
///
/// Implementations are shared process-wide and must tolerate concurrent
/// calls. Within one context chain `start`/`end` pairs nest.
pub trait Observer: Send + Sync + fmt::Debug {
    /// Opens a span and returns the context scoped to it.
    fn start(&self, ctx: &Context, trace_name: &str, attrs: &[Attribute]) -> Context;

    /// Closes the span opened on `ctx`.
    fn end(&self, ctx: &Context, attrs: &[Attribute], err: Option<&(dyn Error + 'static)>);

    /// Records one metric sample.
    fn record(&self, ctx: &Context, metric_name: &str, attrs: &[Attribute], value: i64);
}

/// Inert observer used when none is registered.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl Observer for NoOpObserver {
    fn start(&self, ctx: &Context, _trace_name: &str, _attrs: &[Attribute]) -> Context {
        ctx.sub_context()
    }

    fn end(&self, _ctx: &Context, _attrs: &[Attribute], _err: Option<&(dyn Error + 'static)>) {}

    fn record(&self, _ctx: &Context, _metric_name: &str, _attrs: &[Attribute], _value: i64) {}
}

/// Value key holding the open span's name.
const SPAN_NAME: &str = "Eel.SpanName";

/// Observer that reports spans and metrics through the context logger.
///
/// Spans stamp [`keys::START_TIME`] on the child context; `end` logs the
/// elapsed time as `duration_ms`.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    clock: Arc<dyn Clock>,
}

impl TracingObserver {
    /// Creates an observer reading wall time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new(Arc::new(RealClock))
    }
}

fn attribute_fields(attrs: &[Attribute]) -> Map<String, Value> {
    attrs.iter().map(|(key, value)| ((*key).to_string(), Value::String(value.clone()))).collect()
}

impl Observer for TracingObserver {
    fn start(&self, ctx: &Context, trace_name: &str, attrs: &[Attribute]) -> Context {
        let child = ctx.sub_context();
        child.put_value(keys::START_TIME, self.clock.now_ns());
        child.put_value(SPAN_NAME, trace_name);

        let mut fields = attribute_fields(attrs);
        fields.insert("span".into(), Value::from(trace_name));
        child.log().emit_fields(LogLevel::Debug, "span started", fields);
        child
    }

    fn end(&self, ctx: &Context, attrs: &[Attribute], err: Option<&(dyn Error + 'static)>) {
        let mut fields = attribute_fields(attrs);
        if let Some(span) = ctx.value(SPAN_NAME) {
            fields.insert("span".into(), span);
        }
        if let Some(started) = ctx.value(keys::START_TIME).and_then(|v| v.as_u64()) {
            let elapsed_ms = self.clock.now_ns().saturating_sub(started) / 1_000_000;
            fields.insert("duration_ms".into(), Value::from(elapsed_ms));
        }

        match err {
            Some(err) => {
                fields.insert("error".into(), Value::from(err.to_string()));
                ctx.log().emit_fields(LogLevel::Warn, "span ended with error", fields);
            },
            None => ctx.log().emit_fields(LogLevel::Debug, "span ended", fields),
        }
    }

    fn record(&self, ctx: &Context, metric_name: &str, attrs: &[Attribute], value: i64) {
        let mut fields = attribute_fields(attrs);
        fields.insert("metric".into(), Value::from(metric_name));
        fields.insert("value".into(), Value::from(value));
        ctx.log().emit_fields(LogLevel::Info, "metric recorded", fields);
    }
}
