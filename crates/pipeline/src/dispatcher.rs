//! Alert dispatch: one alert in, one independent outcome per symbol out.

use alert_bridge_core::{BrokerageGateway, OptionType, OrderSide};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::activity_log::ActivityLog;
use crate::error::{AlertError, CatalogError};
use crate::monitor::Position;
use crate::resolver::{target_expiry_month, CatalogProvider};
use crate::submitter::OrderSubmitter;
use crate::supervisor::MonitorSupervisor;
use crate::trade_config::TradeConfigStore;

/// Screener webhook body as received.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertPayload {
    /// Comma-separated symbols.
    pub stocks: Option<String>,
    /// Comma-separated prices, same arity as `stocks`.
    pub trigger_prices: Option<String>,
    pub scan_name: Option<String>,
    #[serde(default)]
    pub scan_url: Option<String>,
    #[serde(default)]
    pub alert_name: Option<String>,
    #[serde(default)]
    pub triggered_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertLeg {
    pub symbol: String,
    pub trigger_price: Decimal,
}

/// A validated alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub option_type: OptionType,
    pub scan_name: String,
    pub legs: Vec<AlertLeg>,
}

/// Infers the option side from a scan label: calls if it mentions `CE`, puts otherwise.
#[must_use]
pub fn option_type_for_scan(scan_name: &str) -> OptionType {
    let mentions_ce = scan_name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word == "CE");
    if mentions_ce {
        OptionType::Call
    } else {
        OptionType::Put
    }
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
}

impl TryFrom<&AlertPayload> for Alert {
    type Error = AlertError;

    fn try_from(payload: &AlertPayload) -> Result<Self, Self::Error> {
        let stocks = payload
            .stocks
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(AlertError::MissingField("stocks"))?;
        let prices = payload
            .trigger_prices
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(AlertError::MissingField("trigger_prices"))?;

        let stocks = split_list(stocks);
        let prices = split_list(prices);
        if stocks.len() != prices.len() {
            return Err(AlertError::ArityMismatch {
                stocks: stocks.len(),
                prices: prices.len(),
            });
        }
        if stocks.is_empty() {
            return Err(AlertError::Empty);
        }

        let legs = stocks
            .into_iter()
            .zip(prices)
            .map(|(symbol, price)| {
                let trigger_price = price.parse::<Decimal>().map_err(|_| AlertError::InvalidPrice {
                    symbol: symbol.to_string(),
                    value: price.to_string(),
                })?;
                Ok(AlertLeg {
                    symbol: symbol.to_string(),
                    trigger_price,
                })
            })
            .collect::<Result<Vec<_>, AlertError>>()?;

        let scan_name = payload.scan_name.clone().unwrap_or_default();
        Ok(Self {
            option_type: option_type_for_scan(&scan_name),
            scan_name,
            legs,
        })
    }
}

/// What happened to one symbol of an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SymbolOutcome {
    Opened {
        symbol: String,
        tradingsymbol: String,
        order_id: String,
        monitor_id: u64,
        entry_price: Decimal,
        qty: u32,
    },
    ContractNotFound {
        symbol: String,
    },
    PriceUnavailable {
        symbol: String,
        tradingsymbol: String,
        error: String,
    },
    ConfigMissing {
        symbol: String,
    },
    OrderFailed {
        symbol: String,
        tradingsymbol: String,
        error: String,
    },
    /// The entry order went through but the position is not being watched.
    MonitorNotStarted {
        symbol: String,
        tradingsymbol: String,
        order_id: String,
        error: String,
    },
}

impl SymbolOutcome {
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Opened { symbol, .. }
            | Self::ContractNotFound { symbol }
            | Self::PriceUnavailable { symbol, .. }
            | Self::ConfigMissing { symbol }
            | Self::OrderFailed { symbol, .. }
            | Self::MonitorNotStarted { symbol, .. } => symbol,
        }
    }

    #[must_use]
    pub const fn is_opened(&self) -> bool {
        matches!(self, Self::Opened { .. })
    }
}

pub struct AlertDispatcher {
    catalog: Arc<CatalogProvider>,
    trade_configs: Arc<TradeConfigStore>,
    gateway: Arc<dyn BrokerageGateway>,
    submitter: Arc<OrderSubmitter>,
    supervisor: Arc<MonitorSupervisor>,
    log: Arc<dyn ActivityLog>,
}

impl AlertDispatcher {
    #[must_use]
    pub fn new(
        catalog: Arc<CatalogProvider>,
        trade_configs: Arc<TradeConfigStore>,
        gateway: Arc<dyn BrokerageGateway>,
        submitter: Arc<OrderSubmitter>,
        supervisor: Arc<MonitorSupervisor>,
        log: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            catalog,
            trade_configs,
            gateway,
            submitter,
            supervisor,
            log,
        }
    }

    #[must_use]
    pub fn supervisor(&self) -> &Arc<MonitorSupervisor> {
        &self.supervisor
    }

    #[must_use]
    pub fn trade_configs(&self) -> &Arc<TradeConfigStore> {
        &self.trade_configs
    }

    /// Processes every symbol of `alert` in order; one failure never stops the rest.
    ///
    /// # Errors
    /// Returns error only if the instrument catalog cannot be loaded.
    pub async fn handle(&self, alert: &Alert, as_of: NaiveDate) -> Result<Vec<SymbolOutcome>, CatalogError> {
        let catalog = self.catalog.get().await?;
        let (year, month) = target_expiry_month(as_of);
        info!(
            scan = %alert.scan_name,
            option_type = %alert.option_type,
            symbols = alert.legs.len(),
            expiry_month = %format!("{year}-{month:02}"),
            "Dispatching alert"
        );

        let mut outcomes = Vec::with_capacity(alert.legs.len());
        for leg in &alert.legs {
            let outcome = match catalog.resolve(&leg.symbol, alert.option_type, leg.trigger_price, as_of) {
                Some(contract) => self.open_position(leg, contract).await,
                None => {
                    self.log.trade(&format!(
                        "No {} contract for {} near {} expiring {year}-{month:02}; skipping",
                        alert.option_type, leg.symbol, leg.trigger_price
                    ));
                    SymbolOutcome::ContractNotFound {
                        symbol: leg.symbol.clone(),
                    }
                }
            };
            if !outcome.is_opened() {
                warn!(symbol = %leg.symbol, outcome = ?outcome, "Symbol skipped");
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    async fn open_position(
        &self,
        leg: &AlertLeg,
        contract: alert_bridge_core::ResolvedContract,
    ) -> SymbolOutcome {
        let symbol = leg.symbol.clone();
        let tradingsymbol = contract.tradingsymbol.clone();

        let entry_price = match self.gateway.last_price(&tradingsymbol).await {
            Ok(price) => price,
            Err(e) => {
                self.log.trade(&format!("Failed to fetch LTP for {tradingsymbol}: {e}"));
                return SymbolOutcome::PriceUnavailable {
                    symbol,
                    tradingsymbol,
                    error: e.to_string(),
                };
            }
        };

        let Some(config) = self.trade_configs.get(&symbol) else {
            self.log.trade(&format!("No trade config for {symbol} and no DEFAULT; skipping"));
            return SymbolOutcome::ConfigMissing { symbol };
        };

        let Some(qty) = config.qty.checked_mul(contract.lot_size) else {
            let error = format!("quantity {} lots x {} overflows", config.qty, contract.lot_size);
            self.log.trade(&format!("Skipping {tradingsymbol}: {error}"));
            return SymbolOutcome::OrderFailed {
                symbol,
                tradingsymbol,
                error,
            };
        };

        self.log.trade(&format!(
            "Placing order for {tradingsymbol} ({symbol}): qty {qty}, LTP {entry_price}, tp {}%, sl {}%",
            config.tp, config.sl
        ));
        let ack = match self
            .submitter
            .submit(&tradingsymbol, qty, entry_price, OrderSide::Buy, contract.tick_size)
            .await
        {
            Ok(ack) => ack,
            Err(e) => {
                return SymbolOutcome::OrderFailed {
                    symbol,
                    tradingsymbol,
                    error: e.to_string(),
                }
            }
        };

        let position = Position {
            tradingsymbol: tradingsymbol.clone(),
            instrument_token: contract.instrument_token,
            entry_price,
            qty,
            tick_size: contract.tick_size,
            tp_percent: config.tp,
            sl_percent: config.sl,
        };

        match self.supervisor.spawn(position).await {
            Ok(monitor) => SymbolOutcome::Opened {
                symbol,
                tradingsymbol,
                order_id: ack.order_id,
                monitor_id: monitor.id(),
                entry_price,
                qty,
            },
            Err(e) => SymbolOutcome::MonitorNotStarted {
                symbol,
                tradingsymbol,
                order_id: ack.order_id,
                error: e.to_string(),
            },
        }
    }
}
