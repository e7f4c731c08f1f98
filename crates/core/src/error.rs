//! Error types at the gateway seam.
//!
//! Adapters convert their own errors into these so the pipeline never
//! depends on a concrete broker.

use thiserror::Error;

/// Failure of a request/response call to the brokerage gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport failure (connect, timeout, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The broker throttled the request (HTTP 429).
    #[error("rate limited by broker")]
    RateLimited,

    /// The access token was rejected or has expired on the broker side.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// No valid access-token lease is installed locally.
    #[error("credential unavailable: {0}")]
    LeaseUnavailable(#[from] LeaseError),

    /// The broker refused the order or its parameters.
    #[error("order rejected: {0}")]
    Rejected(String),

    /// Any other non-success API response.
    #[error("API error: {status_code} - {message}")]
    Api { status_code: u16, message: String },

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// True when the failure stems from credentials rather than the request.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::LeaseUnavailable(_))
    }
}

/// Why the process-wide credential cannot be handed out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaseError {
    #[error("no access token installed; log in first")]
    Missing,

    #[error("access token expired at {expired_at}")]
    Expired { expired_at: chrono::DateTime<chrono::Utc> },
}

/// Error reported on a live tick stream. Never fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// Handshake rejected with HTTP 429.
    #[error("stream rate limited (HTTP 429)")]
    RateLimited,

    #[error("stream connection failed: {0}")]
    Connection(String),

    /// Error message pushed by the broker over the stream.
    #[error("broker stream error: {0}")]
    Broker(String),

    #[error("stream credential unavailable: {0}")]
    Credential(#[from] LeaseError),

    #[error("giving up after {attempts} reconnect attempts")]
    ReconnectsExhausted { attempts: u32 },
}

impl StreamError {
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_error_converts_into_gateway_error() {
        let err: GatewayError = LeaseError::Missing.into();
        assert!(err.is_auth());
        assert!(err.to_string().contains("log in"));
    }

    #[test]
    fn api_error_display() {
        let err = GatewayError::api(502, "bad gateway");
        assert!(err.to_string().contains("502"));
        assert!(!err.is_auth());
    }

    #[test]
    fn only_429_counts_as_rate_limited() {
        assert!(StreamError::RateLimited.is_rate_limited());
        assert!(!StreamError::Connection("reset".into()).is_rate_limited());
    }
}
