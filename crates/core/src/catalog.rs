//! On-disk shape of the broker's instrument dump.
//!
//! The same row layout arrives as CSV from the broker and is stored as a JSON
//! array locally. Only option rows become [`InstrumentRecord`]s.

use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{InstrumentRecord, OptionType};

/// Exchange local time (IST) is UTC+05:30.
const EXCHANGE_UTC_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// One row of the instrument dump, as published by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRow {
    pub instrument_token: u32,
    /// Underlying name.
    #[serde(default)]
    pub name: String,
    pub tradingsymbol: String,
    /// `YYYY-MM-DD`, an RFC 3339 timestamp, or empty for non-expiring rows.
    #[serde(default)]
    pub expiry: String,
    #[serde(default)]
    pub strike: Decimal,
    pub tick_size: Decimal,
    pub lot_size: u32,
    /// "CE", "PE", "FUT", "EQ", ...
    pub instrument_type: String,
    #[serde(default)]
    pub segment: String,
    #[serde(default)]
    pub exchange: String,
}

impl InstrumentRow {
    /// Converts an option row into a catalog record.
    ///
    /// Returns `None` for non-option rows, rows without a parseable expiry
    /// and rows with a non-positive tick size.
    #[must_use]
    pub fn to_record(&self) -> Option<InstrumentRecord> {
        let option_type = self.instrument_type.parse::<OptionType>().ok()?;
        let expiry = parse_expiry(&self.expiry)?;
        if self.tick_size <= Decimal::ZERO || self.lot_size == 0 {
            return None;
        }

        Some(InstrumentRecord {
            symbol: self.name.clone(),
            tradingsymbol: self.tradingsymbol.clone(),
            instrument_token: self.instrument_token,
            expiry,
            strike: self.strike,
            option_type,
            lot_size: self.lot_size,
            tick_size: self.tick_size,
        })
    }
}

/// Parses an expiry as a plain date or as a timestamp converted to exchange-local date.
#[must_use]
pub fn parse_expiry(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    let offset = FixedOffset::east_opt(EXCHANGE_UTC_OFFSET_SECS)?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&offset).date_naive())
}
