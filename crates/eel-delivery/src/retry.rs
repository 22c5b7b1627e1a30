//! Capped exponential backoff around an injected transport.
//!
//! A send is retried when it fails at the network level or returns a status
//! outside `[200, 499]`. Client errors (4xx) and redirects are terminal. The
//! first retry waits `InitialDelay`; every later one waits
//! `backoff + Pad` and then doubles `backoff`. No jitter is applied.

use std::{collections::HashMap, error::Error, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use eel_core::{attributes, keys, metrics, spans, BasicAuth, Clock, Context, Settings};

use crate::error::{DeliveryError, ErrorCategory};

/// How the backoff step grows between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffMethod {
    /// Backoff doubles after every retry.
    #[default]
    Exponential,
    /// Backoff stays at `InitialBackoff`.
    Constant,
}

impl BackoffMethod {
    /// Parses the settings value. Empty and unknown names mean exponential.
    pub fn parse(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("constant") {
            Self::Constant
        } else {
            Self::Exponential
        }
    }
}

/// Retry tuning converted from settings milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum sends including the first; zero behaves as one.
    pub max_attempts: u32,
    /// Wait after the first failed attempt.
    pub initial_delay: Duration,
    /// First backoff step, used from the second retry on.
    pub initial_backoff: Duration,
    /// Constant added to every backoff step.
    pub pad: Duration,
    /// Growth policy for the backoff step.
    pub backoff_method: BackoffMethod,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            initial_backoff: Duration::ZERO,
            pad: Duration::ZERO,
            backoff_method: BackoffMethod::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Builds the retry view of `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            initial_delay: Duration::from_millis(settings.initial_delay),
            initial_backoff: Duration::from_millis(settings.initial_backoff),
            pad: Duration::from_millis(settings.pad),
            backoff_method: BackoffMethod::parse(&settings.backoff_method),
        }
    }

    /// Policy from the settings registered on `ctx`, or the single-attempt
    /// default when none are registered.
    pub fn from_context(ctx: &Context) -> Self {
        ctx.settings().map(|settings| Self::from_settings(&settings)).unwrap_or_default()
    }

    /// Effective attempt limit.
    pub fn attempt_limit(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Waits performed before attempts `2..=attempt_limit`, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        let mut backoff = self.initial_backoff;
        (1..self.attempt_limit()).map(|attempt| self.next_delay(attempt, &mut backoff)).collect()
    }

    fn next_delay(&self, attempt: u32, backoff: &mut Duration) -> Duration {
        if attempt == 1 {
            return self.initial_delay;
        }
        let delay = backoff.saturating_add(self.pad);
        if self.backoff_method == BackoffMethod::Exponential {
            *backoff = backoff.saturating_mul(2);
        }
        delay
    }
}

/// One outbound request, reused verbatim across attempts.
#[derive(Debug, Clone, Default)]
pub struct OutboundRequest {
    /// Destination URL.
    pub url: String,
    /// Request body.
    pub payload: Bytes,
    /// HTTP method; POST when empty.
    pub verb: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Optional basic credentials.
    pub auth: Option<BasicAuth>,
}

impl OutboundRequest {
    /// POST of `payload` to `url`.
    pub fn post(url: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self { url: url.into(), payload: payload.into(), verb: "POST".into(), ..Self::default() }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets basic credentials.
    #[must_use]
    pub fn with_auth(mut self, auth: Option<BasicAuth>) -> Self {
        self.auth = auth;
        self
    }
}

/// Outcome of a send: body, status and error travel together.
///
/// `status` is zero when no response was received.
#[derive(Debug, Clone, Default)]
pub struct Exchange {
    /// Response body.
    pub body: Bytes,
    /// Response status.
    pub status: u16,
    /// Failure, if any.
    pub error: Option<DeliveryError>,
}

impl Exchange {
    /// A received response.
    pub fn response(status: u16, body: impl Into<Bytes>) -> Self {
        Self { body: body.into(), status, error: None }
    }

    /// A send that failed before a usable response.
    pub fn failed(error: DeliveryError) -> Self {
        Self { body: Bytes::new(), status: 0, error: Some(error) }
    }

    /// Whether the retry driver would send again.
    pub fn is_retryable(&self) -> bool {
        self.error.is_some() || self.status < 200 || self.status > 499
    }
}

/// Sends one request. Implementations enforce their own timeouts.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Performs a single attempt.
    async fn send(&self, ctx: &Context, request: &OutboundRequest) -> Exchange;
}

/// Drives a transport until success, a terminal status, exhaustion or
/// cancellation.
#[derive(Debug, Clone)]
pub struct RetryDriver {
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl RetryDriver {
    /// Creates a driver sleeping through `clock`.
    pub fn new(policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { policy, clock }
    }

    /// The policy in force.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sends `request` through `transport`, retrying as configured.
    ///
    /// The current attempt number is written to `ctx`'s LogValues before each
    /// send. Each attempt runs in its own `http.request` observer span and
    /// records `http.request.duration`. When `ctx` is cancelled during a wait
    /// the last exchange is returned with [`DeliveryError::Cancelled`].
    pub async fn retry<T>(&self, ctx: &Context, request: &OutboundRequest, transport: &T) -> Exchange
    where
        T: Transport + ?Sized,
    {
        let limit = self.policy.attempt_limit();
        let mut backoff = self.policy.initial_backoff;
        let mut attempt = 1;

        loop {
            ctx.put_log_value(keys::LOG_ATTEMPT, attempt);
            let exchange = self.attempt(ctx, request, transport).await;

            if !exchange.is_retryable() {
                return exchange;
            }
            let status = exchange.status.to_string();
            if attempt >= limit {
                ctx.log().warn("retries exhausted", &[
                    ("status", status.as_str()),
                    ("url", request.url.as_str()),
                ]);
                return exchange;
            }

            let delay = self.policy.next_delay(attempt, &mut backoff);
            let delay_ms = delay.as_millis().to_string();
            let transient = exchange.error.as_ref().map_or(true, DeliveryError::is_retryable);
            ctx.log().debug("retrying request", &[
                ("status", status.as_str()),
                ("delay_ms", delay_ms.as_str()),
                ("transient", if transient { "true" } else { "false" }),
            ]);

            tokio::select! {
                biased;
                () = ctx.cancellation_token().cancelled() => {
                    ctx.log().info("retry cancelled", &[]);
                    return Exchange {
                        error: Some(DeliveryError::Cancelled { attempts: attempt }),
                        ..exchange
                    };
                },
                () = self.clock.sleep(delay) => {},
            }
            attempt += 1;
        }
    }

    /// Sends through the transport registered on `ctx` under
    /// [`keys::HTTP_TRANSPORT`].
    pub async fn send(&self, ctx: &Context, request: &OutboundRequest) -> Exchange {
        match crate::client::registered_transport(ctx) {
            Some(transport) => self.retry(ctx, request, transport.as_ref()).await,
            None => Exchange::failed(DeliveryError::configuration("no HTTP transport registered")),
        }
    }

    async fn attempt<T>(&self, ctx: &Context, request: &OutboundRequest, transport: &T) -> Exchange
    where
        T: Transport + ?Sized,
    {
        let attrs = [(attributes::HTTP_URL, request.url.clone())];
        let span = ctx.start_span(spans::HTTP_REQUEST, &attrs);
        let observer = span.observer();
        let started = self.clock.now();

        let exchange = transport.send(&span, request).await;

        let elapsed = self.clock.now().duration_since(started);
        let elapsed_ms = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
        let mut status_attrs = vec![
            (attributes::HTTP_URL, request.url.clone()),
            (attributes::HTTP_STATUS_CODE, exchange.status.to_string()),
        ];
        if let Some(error) = &exchange.error {
            status_attrs.push((attributes::ERROR_TYPE, ErrorCategory::from(error).to_string()));
        }
        observer.record(&span, metrics::HTTP_REQUEST_DURATION, &status_attrs, elapsed_ms);
        let error = exchange.error.as_ref().map(|e| e as &(dyn Error + 'static));
        observer.end(&span, &status_attrs, error);
        exchange
    }
}
