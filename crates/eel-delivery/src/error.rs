//! Error types for outbound delivery.
//!
//! Errors travel by value inside an [`Exchange`](crate::Exchange) next to the
//! body and status they relate to; the retry driver never turns them into an
//! early return.

use std::fmt;

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Failure of a single outbound send or of the retry loop around it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure.
    #[error("network connection failed: {message}")]
    Network {
        /// Error message describing the network failure
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout that elapsed, in milliseconds
        timeout_ms: u64,
    },

    /// The request could not be constructed.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// What was wrong with the request
        message: String,
    },

    /// Response body exceeded the configured size cap.
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge {
        /// Configured cap in bytes
        limit: u64,
    },

    /// The context was cancelled while waiting to retry.
    #[error("delivery cancelled after {attempts} attempts")]
    Cancelled {
        /// Attempts made before cancellation
        attempts: u32,
    },

    /// Missing or invalid transport configuration.
    #[error("invalid transport configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether the failure is transient.
    ///
    /// The retry driver retries on any error regardless; this informs logs
    /// and callers deciding what to surface.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } | Self::BodyTooLarge { .. } => true,
            Self::InvalidRequest { .. } | Self::Cancelled { .. } | Self::Configuration { .. } => {
                false
            },
        }
    }
}

/// Category of delivery error for metrics and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connectivity or timeout.
    Network,
    /// Problems with the request or the response it produced.
    Request,
    /// Work abandoned by the caller.
    Cancelled,
    /// Configuration problems.
    Configuration,
}

impl From<&DeliveryError> for ErrorCategory {
    fn from(error: &DeliveryError) -> Self {
        match error {
            DeliveryError::Network { .. } | DeliveryError::Timeout { .. } => Self::Network,
            DeliveryError::InvalidRequest { .. } | DeliveryError::BodyTooLarge { .. } => {
                Self::Request
            },
            DeliveryError::Cancelled { .. } => Self::Cancelled,
            DeliveryError::Configuration { .. } => Self::Configuration,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Request => write!(f, "request"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_identified() {
        assert!(DeliveryError::network("connection refused").is_retryable());
        assert!(DeliveryError::timeout(3000).is_retryable());
        assert!(DeliveryError::BodyTooLarge { limit: 10 }.is_retryable());

        assert!(!DeliveryError::invalid_request("bad method").is_retryable());
        assert!(!DeliveryError::Cancelled { attempts: 2 }.is_retryable());
        assert!(!DeliveryError::configuration("no transport").is_retryable());
    }

    #[test]
    fn categories_mapped() {
        assert_eq!(ErrorCategory::from(&DeliveryError::timeout(1)), ErrorCategory::Network);
        assert_eq!(
            ErrorCategory::from(&DeliveryError::BodyTooLarge { limit: 1 }),
            ErrorCategory::Request
        );
        assert_eq!(ErrorCategory::from(&DeliveryError::Cancelled { attempts: 1 }).to_string(), "cancelled");
    }

    #[test]
    fn display_format() {
        assert_eq!(DeliveryError::timeout(250).to_string(), "request timeout after 250ms");
        assert_eq!(
            DeliveryError::Cancelled { attempts: 2 }.to_string(),
            "delivery cancelled after 2 attempts"
        );
    }
}
