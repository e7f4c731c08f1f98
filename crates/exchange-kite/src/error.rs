//! Error types for the Kite Connect integration.
//!
//! Kite reports failures as `{"status": "error", "message": ..., "error_type": ...}`.
//! The `error_type` drives classification here.

use alert_bridge_core::{GatewayError, LeaseError};
use thiserror::Error;

/// Errors that can occur when talking to Kite Connect.
#[derive(Debug, Error)]
pub enum KiteError {
    /// Session or token rejected (`TokenException`, HTTP 403).
    #[error("token error: {0}")]
    Token(String),

    /// No valid access token is installed.
    #[error("credential unavailable: {0}")]
    Credential(#[from] LeaseError),

    /// Missing or malformed request parameters (`InputException`).
    #[error("input error: {0}")]
    Input(String),

    /// Order placement failed (`OrderException`, margin or RMS rejection).
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// Any other non-success response.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error message from the API.
        message: String,
    },

    /// Rate limit exceeded (HTTP 429).
    #[error("rate limit exceeded")]
    RateLimit,

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Request timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Response body could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl KiteError {
    /// Creates an API error from status code and message.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Maps a Kite error envelope onto a typed error.
    pub fn from_envelope(status_code: u16, error_type: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        match error_type {
            Some("TokenException") => Self::Token(message),
            Some("InputException") => Self::Input(message),
            Some("OrderException" | "MarginException") => Self::OrderRejected(message),
            _ if status_code == 403 => Self::Token(message),
            _ => Self::api(status_code, message),
        }
    }

    /// Returns true if the error indicates the request may succeed later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimit => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for KiteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for KiteError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<csv::Error> for KiteError {
    fn from(err: csv::Error) -> Self {
        Self::Serialization(format!("instrument dump: {err}"))
    }
}

impl From<KiteError> for GatewayError {
    fn from(err: KiteError) -> Self {
        match err {
            KiteError::Token(msg) => Self::Authentication(msg),
            KiteError::Credential(lease) => Self::LeaseUnavailable(lease),
            KiteError::Input(msg) | KiteError::OrderRejected(msg) => Self::Rejected(msg),
            KiteError::Api {
                status_code,
                message,
            } => Self::Api {
                status_code,
                message,
            },
            KiteError::RateLimit => Self::RateLimited,
            KiteError::Network(msg) | KiteError::Timeout(msg) => Self::Network(msg),
            KiteError::Serialization(msg) => Self::Decode(msg),
            KiteError::Configuration(msg) => Self::Network(format!("client misconfigured: {msg}")),
        }
    }
}

/// Result type alias for Kite operations.
pub type Result<T> = std::result::Result<T, KiteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_error_types_are_classified() {
        assert!(matches!(
            KiteError::from_envelope(403, Some("TokenException"), "expired"),
            KiteError::Token(_)
        ));
        assert!(matches!(
            KiteError::from_envelope(400, Some("InputException"), "bad qty"),
            KiteError::Input(_)
        ));
        assert!(matches!(
            KiteError::from_envelope(400, Some("OrderException"), "RMS"),
            KiteError::OrderRejected(_)
        ));
        assert!(matches!(
            KiteError::from_envelope(502, Some("NetworkException"), "upstream"),
            KiteError::Api { status_code: 502, .. }
        ));
    }

    #[test]
    fn bare_403_is_a_token_error() {
        assert!(matches!(
            KiteError::from_envelope(403, None, "forbidden"),
            KiteError::Token(_)
        ));
    }

    #[test]
    fn transient_classification() {
        assert!(KiteError::RateLimit.is_transient());
        assert!(KiteError::api(503, "down").is_transient());
        assert!(!KiteError::api(400, "bad").is_transient());
        assert!(!KiteError::Token("x".into()).is_transient());
    }

    #[test]
    fn converts_into_gateway_error() {
        let err: GatewayError = KiteError::Token("expired".into()).into();
        assert!(err.is_auth());

        let err: GatewayError = KiteError::OrderRejected("margin".into()).into();
        assert!(matches!(err, GatewayError::Rejected(_)));

        let err: GatewayError = KiteError::RateLimit.into();
        assert!(matches!(err, GatewayError::RateLimited));
    }
}
