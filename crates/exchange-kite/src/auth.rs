//! Kite Connect login handshake.
//!
//! After the user signs in through the Kite login page, the redirect carries a
//! short-lived `request_token`. It is exchanged for an access token by posting
//! `sha256(api_key + request_token + api_secret)` as a checksum.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{KiteError, Result};

/// Environment variable holding the API secret.
pub const API_SECRET_ENV: &str = "KITE_API_SECRET";

/// Reads the API secret from the environment.
///
/// # Errors
/// Returns a configuration error if the variable is unset or empty.
pub fn api_secret_from_env() -> Result<SecretString> {
    match std::env::var(API_SECRET_ENV) {
        Ok(secret) if !secret.trim().is_empty() => Ok(SecretString::from(secret)),
        _ => Err(KiteError::Configuration(format!("{API_SECRET_ENV} is not set"))),
    }
}

/// Computes the hex-encoded session checksum.
#[must_use]
pub fn session_checksum(api_key: &str, request_token: &str, api_secret: &SecretString) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hasher.update(request_token.as_bytes());
    hasher.update(api_secret.expose_secret().as_bytes());
    hex::encode(hasher.finalize())
}

/// Session returned by `POST /session/token`.
#[derive(Deserialize)]
pub struct Session {
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub login_time: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("user_name", &self.user_name)
            .field("access_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}
