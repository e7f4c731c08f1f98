//! Domain types shared by the gateway adapter and the pipeline.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Option contract type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

impl OptionType {
    /// Exchange code used in instrument dumps ("CE" / "PE").
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Call => "CE",
            Self::Put => "PE",
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for OptionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CE" | "CALL" => Ok(Self::Call),
            "PE" | "PUT" => Ok(Self::Put),
            other => Err(format!("not an option type: {other}")),
        }
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// One row of the instrument catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentRecord {
    /// Underlying name (e.g. "SBIN").
    pub symbol: String,
    /// Exchange-unique contract code (e.g. "SBIN24MAY800CE").
    pub tradingsymbol: String,
    /// Opaque numeric key for tick subscriptions.
    pub instrument_token: u32,
    pub expiry: NaiveDate,
    pub strike: Decimal,
    pub option_type: OptionType,
    pub lot_size: u32,
    pub tick_size: Decimal,
}

/// Contract picked by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedContract {
    pub tradingsymbol: String,
    pub instrument_token: u32,
    pub lot_size: u32,
    pub tick_size: Decimal,
}

impl From<&InstrumentRecord> for ResolvedContract {
    fn from(record: &InstrumentRecord) -> Self {
        Self {
            tradingsymbol: record.tradingsymbol.clone(),
            instrument_token: record.instrument_token,
            lot_size: record.lot_size,
            tick_size: record.tick_size,
        }
    }
}

/// Per-symbol trade policy: lots to buy, take-profit and stop-loss percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeConfig {
    pub qty: u32,
    pub tp: Decimal,
    pub sl: Decimal,
}

impl TradeConfig {
    /// Checks `qty > 0` and non-negative percentages.
    ///
    /// # Errors
    /// Returns a description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.qty == 0 {
            return Err("qty must be at least one lot".to_string());
        }
        if self.tp.is_sign_negative() {
            return Err(format!("tp must be >= 0, got {}", self.tp));
        }
        if self.sl.is_sign_negative() {
            return Err(format!("sl must be >= 0, got {}", self.sl));
        }
        Ok(())
    }
}

/// Price type of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit { price: Decimal },
}

/// Order to hand to the brokerage gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub tradingsymbol: String,
    pub side: OrderSide,
    pub quantity: u32,
    pub order_type: OrderType,
}

impl OrderRequest {
    #[must_use]
    pub fn limit(tradingsymbol: &str, side: OrderSide, quantity: u32, price: Decimal) -> Self {
        Self {
            tradingsymbol: tradingsymbol.to_string(),
            side,
            quantity,
            order_type: OrderType::Limit { price },
        }
    }

    /// Limit price, if this is a limit order.
    #[must_use]
    pub const fn limit_price(&self) -> Option<Decimal> {
        match self.order_type {
            OrderType::Limit { price } => Some(price),
            OrderType::Market => None,
        }
    }
}

/// Broker acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
}

/// Last-traded-price update for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub instrument_token: u32,
    pub last_price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn option_type_parses_exchange_codes() {
        assert_eq!("CE".parse::<OptionType>(), Ok(OptionType::Call));
        assert_eq!("pe".parse::<OptionType>(), Ok(OptionType::Put));
        assert!("FUT".parse::<OptionType>().is_err());
    }

    #[test]
    fn option_type_serializes_as_code() {
        let json = serde_json::to_string(&OptionType::Call).unwrap();
        assert_eq!(json, "\"CE\"");
    }

    #[test]
    fn trade_config_validation() {
        let ok = TradeConfig { qty: 2, tp: dec!(5), sl: dec!(2) };
        assert!(ok.validate().is_ok());

        let zero_qty = TradeConfig { qty: 0, ..ok };
        assert!(zero_qty.validate().is_err());

        let negative_sl = TradeConfig { sl: dec!(-1), ..ok };
        assert!(negative_sl.validate().unwrap_err().contains("sl"));
    }

    #[test]
    fn trade_config_reads_numeric_json() {
        let cfg: TradeConfig = serde_json::from_str(r#"{"qty": 1, "tp": 5, "sl": 2.5}"#).unwrap();
        assert_eq!(cfg.qty, 1);
        assert_eq!(cfg.tp, dec!(5));
        assert_eq!(cfg.sl, dec!(2.5));
    }

    #[test]
    fn limit_order_exposes_price() {
        let order = OrderRequest::limit("SBIN24MAY800CE", OrderSide::Buy, 1500, dec!(12.35));
        assert_eq!(order.limit_price(), Some(dec!(12.35)));
        assert_eq!(order.side.to_string(), "BUY");
    }
}
