//! Standard HTTP transport built on reqwest.
//!
//! Handles request construction, timeouts, response size limits and error
//! categorization. One client is shared process-wide so connections are
//! pooled across requests.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use eel_core::{keys, Context, Settings};
use reqwest::{Method, Response};
use tracing::{info_span, Instrument};

use crate::{
    error::{DeliveryError, Result},
    retry::{Exchange, OutboundRequest, Transport},
};

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Whole-request timeout; none when unset.
    pub timeout: Option<Duration>,
    /// Timeout between reads of response data; none when unset.
    pub read_timeout: Option<Duration>,
    /// Idle pooled connections kept per host.
    pub pool_max_idle_per_host: usize,
    /// Largest accepted response body; unlimited when unset.
    pub max_body_bytes: Option<u64>,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            read_timeout: None,
            pool_max_idle_per_host: usize::MAX,
            max_body_bytes: None,
            user_agent: concat!("eel/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Builds the transport view of `settings`. Zero values mean unset.
    pub fn from_settings(settings: &Settings) -> Self {
        let millis = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        Self {
            timeout: millis(settings.http_timeout),
            read_timeout: millis(settings.response_header_timeout),
            pool_max_idle_per_host: if settings.max_idle_conns_per_host == 0 {
                usize::MAX
            } else {
                settings.max_idle_conns_per_host
            },
            max_body_bytes: (settings.max_message_size > 0).then_some(settings.max_message_size),
            ..Self::default()
        }
    }
}

/// Transport sending requests over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    /// Creates a transport with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built from the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .pool_max_idle_per_host(config.pool_max_idle_per_host);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(read_timeout) = config.read_timeout {
            builder = builder.read_timeout(read_timeout);
        }
        let client = builder
            .build()
            .map_err(|e| DeliveryError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Creates a transport with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// The configuration in force.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn timeout_ms(&self) -> u64 {
        self.config
            .timeout
            .or(self.config.read_timeout)
            .map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX))
    }

    async fn perform(&self, request: &OutboundRequest) -> Exchange {
        let verb = if request.verb.is_empty() { "POST" } else { request.verb.as_str() };
        let method = match Method::from_bytes(verb.to_ascii_uppercase().as_bytes()) {
            Ok(method) => method,
            Err(e) => return Exchange::failed(DeliveryError::invalid_request(format!("bad verb {verb}: {e}"))),
        };

        let mut http_request = self.client.request(method, &request.url).body(request.payload.clone());
        for (name, value) in &request.headers {
            if !is_managed_header(name) {
                http_request = http_request.header(name, value);
            }
        }
        if let Some(auth) = &request.auth {
            http_request = http_request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = match http_request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "request failed");
                return Exchange::failed(self.classify(&e));
            },
        };

        let status = response.status().as_u16();
        tracing::debug!(status, "received response");

        match self.read_body(response).await {
            Ok(body) => Exchange::response(status, body),
            Err(error) => Exchange { body: Bytes::new(), status, error: Some(error) },
        }
    }

    fn classify(&self, error: &reqwest::Error) -> DeliveryError {
        if error.is_timeout() {
            DeliveryError::timeout(self.timeout_ms())
        } else if error.is_builder() {
            DeliveryError::invalid_request(error.to_string())
        } else if error.is_connect() {
            DeliveryError::network(format!("connection failed: {error}"))
        } else {
            DeliveryError::network(error.to_string())
        }
    }

    /// Reads the body, stopping as soon as it exceeds the size cap.
    async fn read_body(&self, mut response: Response) -> Result<Bytes> {
        let limit = self.config.max_body_bytes;
        if let (Some(limit), Some(declared)) = (limit, response.content_length()) {
            if declared > limit {
                return Err(DeliveryError::BodyTooLarge { limit });
            }
        }

        let mut body = BytesMut::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    body.extend_from_slice(&chunk);
                    if let Some(limit) = limit {
                        if body.len() as u64 > limit {
                            return Err(DeliveryError::BodyTooLarge { limit });
                        }
                    }
                },
                Ok(None) => return Ok(body.freeze()),
                Err(e) => return Err(self.classify(&e)),
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, ctx: &Context, request: &OutboundRequest) -> Exchange {
        let span = info_span!(
            "http_request",
            url = %request.url,
            verb = %request.verb,
            correlation_id = %ctx.id(),
        );
        self.perform(request).instrument(span).await
    }
}

/// Registers the standard transport used by [`RetryDriver::send`](crate::RetryDriver::send).
pub fn register_transport(ctx: &Context, transport: Arc<dyn Transport>) {
    ctx.put_config(keys::HTTP_TRANSPORT, Arc::new(transport));
}

/// Transport registered on `ctx`, if any.
pub fn registered_transport(ctx: &Context) -> Option<Arc<dyn Transport>> {
    ctx.config::<Arc<dyn Transport>>(keys::HTTP_TRANSPORT).map(|transport| Arc::clone(&*transport))
}

/// Headers computed by the client that must not be copied from callers.
fn is_managed_header(header_name: &str) -> bool {
    let lowercase = header_name.to_lowercase();
    matches!(
        lowercase.as_str(),
        "content-length"
            | "host"
            | "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}
