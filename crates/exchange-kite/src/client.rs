//! Kite Connect REST client with rate limiting.
//!
//! Every request waits on a shared governor quota. Authenticated requests take
//! their access token from the [`CredentialStore`] at call time, so a re-login
//! is picked up without rebuilding the client.

use crate::auth::{session_checksum, Session};
use crate::error::{KiteError, Result};
use alert_bridge_core::{
    AccessTokenLease, CredentialStore, InstrumentRow, KiteConfig, OrderRequest, OrderType,
};
use chrono::Utc;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

// =============================================================================
// Constants
// =============================================================================

/// Kite Connect production API base URL.
pub const KITE_API_URL: &str = "https://api.kite.trade";

/// API version header value.
const KITE_VERSION: &str = "3";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Kite REST client.
#[derive(Debug, Clone)]
pub struct KiteClientConfig {
    /// Base URL for the API.
    pub base_url: String,

    /// Public API key of the Kite Connect app.
    pub api_key: String,

    /// Exchange segment for quotes and orders.
    pub exchange: String,

    /// Product code attached to orders.
    pub product: String,

    /// Requests per second limit.
    pub requests_per_second: NonZeroU32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for KiteClientConfig {
    fn default() -> Self {
        Self {
            base_url: KITE_API_URL.to_string(),
            api_key: String::new(),
            exchange: "NFO".to_string(),
            product: "NRML".to_string(),
            requests_per_second: nonzero!(10u32),
            timeout_secs: 10,
        }
    }
}

impl KiteClientConfig {
    /// Builds a client configuration from application settings.
    #[must_use]
    pub fn from_settings(settings: &KiteConfig) -> Self {
        Self {
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            exchange: settings.exchange.clone(),
            product: settings.product.clone(),
            requests_per_second: NonZeroU32::new(settings.requests_per_second)
                .unwrap_or(nonzero!(10u32)),
            timeout_secs: settings.timeout_secs,
        }
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Sets the rate limit.
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_second: NonZeroU32) -> Self {
        self.requests_per_second = requests_per_second;
        self
    }
}

// =============================================================================
// API Response Types
// =============================================================================

/// Standard Kite response wrapper.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    data: Option<T>,
    message: Option<String>,
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LtpQuote {
    #[allow(dead_code)]
    instrument_token: u32,
    last_price: Decimal,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order_id: String,
}

// =============================================================================
// KiteClient
// =============================================================================

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Kite Connect REST API client.
pub struct KiteClient {
    config: KiteClientConfig,
    http: Client,
    rate_limiter: Arc<DirectRateLimiter>,
    credentials: Arc<CredentialStore>,
}

impl std::fmt::Debug for KiteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KiteClient")
            .field("base_url", &self.config.base_url)
            .field("exchange", &self.config.exchange)
            .field("requests_per_second", &self.config.requests_per_second)
            .finish_non_exhaustive()
    }
}

impl KiteClient {
    /// Creates a new client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: KiteClientConfig, credentials: Arc<CredentialStore>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KiteError::Network(format!("failed to build HTTP client: {e}")))?;

        let quota = Quota::per_second(config.requests_per_second);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            config,
            http,
            rate_limiter,
            credentials,
        })
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &KiteClientConfig {
        &self.config
    }

    /// Returns the credential store the client authenticates from.
    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    fn authorization(&self) -> Result<String> {
        let lease = self.credentials.current()?;
        Ok(format!("token {}:{}", self.config.api_key, lease.token()))
    }

    /// Waits for the rate limiter and makes an authenticated GET request.
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let authorization = self.authorization()?;
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.config.base_url, path);
        tracing::debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .query(query)
            .header("X-Kite-Version", KITE_VERSION)
            .header("Authorization", authorization)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Waits for the rate limiter and makes a form-encoded POST request.
    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
        authorization: Option<String>,
    ) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.config.base_url, path);
        tracing::debug!("POST {} fields={}", url, form.len());

        let mut request = self
            .http
            .post(&url)
            .header("X-Kite-Version", KITE_VERSION)
            .form(form);
        if let Some(authorization) = authorization {
            request = request.header("Authorization", authorization);
        }

        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// Unwraps the Kite envelope, converting error responses.
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if status.as_u16() == 429 {
            return Err(KiteError::RateLimit);
        }

        let text = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(body) => KiteError::from_envelope(
                    status.as_u16(),
                    body.error_type.as_deref(),
                    body.message.unwrap_or(text),
                ),
                Err(_) => KiteError::api(status.as_u16(), text),
            });
        }

        let envelope: Envelope<T> = serde_json::from_str(&text)?;
        if envelope.status != "success" {
            return Err(KiteError::from_envelope(
                status.as_u16(),
                envelope.error_type.as_deref(),
                envelope.message.unwrap_or_default(),
            ));
        }

        envelope
            .data
            .ok_or_else(|| KiteError::Serialization("response has no data".to_string()))
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Exchanges a login `request_token` for a session.
    ///
    /// # Errors
    /// Returns error if the token is rejected or the call fails.
    pub async fn generate_session(
        &self,
        request_token: &str,
        api_secret: &SecretString,
    ) -> Result<Session> {
        if request_token.trim().is_empty() {
            return Err(KiteError::Input("request_token is empty".to_string()));
        }

        let checksum = session_checksum(&self.config.api_key, request_token, api_secret);
        let form = [
            ("api_key", self.config.api_key.clone()),
            ("request_token", request_token.to_string()),
            ("checksum", checksum),
        ];

        self.post_form("/session/token", &form, None).await
    }

    /// Completes the login handshake and installs the resulting lease.
    ///
    /// The lease expires at the broker's next daily token reset.
    ///
    /// # Errors
    /// Returns error if the session cannot be generated.
    pub async fn login(
        &self,
        request_token: &str,
        api_secret: &SecretString,
    ) -> Result<Arc<AccessTokenLease>> {
        let session = self.generate_session(request_token, api_secret).await?;
        let lease = AccessTokenLease::until_daily_reset(session.access_token, Utc::now());

        tracing::info!(
            user_id = %session.user_id,
            expires_at = %lease.expires_at(),
            "Kite session established"
        );

        self.credentials.install(lease);
        Ok(self.credentials.current()?)
    }

    // =========================================================================
    // Market Data
    // =========================================================================

    /// Gets the last traded price of an instrument on the configured exchange.
    ///
    /// # Errors
    /// Returns error if the quote is missing or the call fails.
    pub async fn last_price(&self, tradingsymbol: &str) -> Result<Decimal> {
        let key = format!("{}:{}", self.config.exchange, tradingsymbol);
        let quotes: HashMap<String, LtpQuote> = self.get("/quote/ltp", &[("i", key.as_str())]).await?;

        quotes
            .get(&key)
            .map(|quote| quote.last_price)
            .ok_or_else(|| KiteError::api(404, format!("no quote returned for {key}")))
    }

    /// Downloads the instrument dump for an exchange.
    ///
    /// The endpoint returns CSV rather than the JSON envelope.
    ///
    /// # Errors
    /// Returns error if the download fails or the CSV is malformed.
    pub async fn instruments(&self, exchange: &str) -> Result<Vec<InstrumentRow>> {
        self.rate_limiter.until_ready().await;

        let url = format!(
            "{}/instruments/{}",
            self.config.base_url,
            urlencoding::encode(exchange)
        );
        tracing::debug!("GET {}", url);

        let mut request = self.http.get(&url).header("X-Kite-Version", KITE_VERSION);
        if let Ok(authorization) = self.authorization() {
            request = request.header("Authorization", authorization);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(KiteError::RateLimit);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(KiteError::api(status.as_u16(), body));
        }

        parse_instrument_csv(&body)
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Places a regular day order and returns the broker's order id.
    ///
    /// # Errors
    /// Returns error if the order is rejected or the call fails.
    pub async fn place_order(&self, order: &OrderRequest) -> Result<String> {
        if order.quantity == 0 {
            return Err(KiteError::Input("quantity must be positive".to_string()));
        }
        let authorization = self.authorization()?;

        let mut form = vec![
            ("tradingsymbol", order.tradingsymbol.clone()),
            ("exchange", self.config.exchange.clone()),
            ("transaction_type", order.side.to_string()),
            ("quantity", order.quantity.to_string()),
            ("product", self.config.product.clone()),
            ("validity", "DAY".to_string()),
        ];
        match order.order_type {
            OrderType::Limit { price } => {
                form.push(("order_type", "LIMIT".to_string()));
                form.push(("price", price.normalize().to_string()));
            }
            OrderType::Market => form.push(("order_type", "MARKET".to_string())),
        }

        let response: OrderResponse = self
            .post_form("/orders/regular", &form, Some(authorization))
            .await?;

        Ok(response.order_id)
    }
}

/// Parses the instrument dump CSV.
///
/// # Errors
/// Returns error if a row cannot be decoded.
pub fn parse_instrument_csv(body: &str) -> Result<Vec<InstrumentRow>> {
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let mut rows = Vec::new();
    for row in reader.deserialize::<InstrumentRow>() {
        rows.push(row?);
    }
    Ok(rows)
}
