//! Error types for the pipeline.

use alert_bridge_core::{GatewayError, LeaseError};
use std::path::PathBuf;
use thiserror::Error;

/// An alert rejected before any processing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlertError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("alert lists {stocks} stocks but {prices} trigger prices")]
    ArityMismatch { stocks: usize, prices: usize },

    #[error("trigger price for {symbol} is not a number: {value:?}")]
    InvalidPrice { symbol: String, value: String },

    #[error("alert contains no symbols")]
    Empty,
}

/// Instrument catalog could not be loaded.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read instrument catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode instrument catalog {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum TradeConfigError {
    #[error("trade config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("trade config file {path} is not a symbol map: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid trade config for {symbol}: {reason}")]
    Invalid { symbol: String, reason: String },
}

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Starting a monitor needs a valid access token.
    #[error("cannot start monitor: {0}")]
    LeaseUnavailable(#[from] LeaseError),

    #[error("failed to open tick stream: {0}")]
    Stream(#[from] GatewayError),

    #[error("no monitor with id {0}")]
    NotFound(u64),
}
