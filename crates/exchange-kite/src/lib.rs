//! Kite Connect integration for the alert bridge.
//!
//! - [`KiteClient`]: rate-limited REST access (quotes, orders, session, instrument dump)
//! - [`KiteTicker`]: binary tick stream with reconnect and backoff
//! - [`KiteGateway`]: the live [`alert_bridge_core::BrokerageGateway`]
//! - [`PaperGateway`]: simulated order fills over any gateway

pub mod auth;
pub mod client;
pub mod error;
pub mod gateway;
pub mod paper;
pub mod ticker;

pub use auth::{api_secret_from_env, session_checksum, Session, API_SECRET_ENV};
pub use client::{parse_instrument_csv, KiteClient, KiteClientConfig, KITE_API_URL};
pub use error::{KiteError, Result};
pub use gateway::KiteGateway;
pub use paper::{PaperFill, PaperGateway};
pub use ticker::{parse_binary, KiteTicker, KiteTickerConfig};
