//! In-process brokerage used by the pipeline integration tests.

#![allow(dead_code)]

use alert_bridge_core::{
    AccessTokenLease, BrokerageGateway, CredentialStore, GatewayError, InstrumentRecord, OptionType,
    OrderAck, OrderRequest, StreamCommand, StreamEvent, TickSubscription, TradeConfig,
};
use alert_bridge_pipeline::{
    AlertDispatcher, CatalogProvider, InstrumentCatalog, MemoryActivityLog, MonitorSupervisor,
    OrderSubmitter, PriceAdjuster, TradeConfigStore,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Far end of a tick stream handed to a monitor.
pub struct StreamHandle {
    pub events: mpsc::Sender<StreamEvent>,
    pub commands: mpsc::Receiver<StreamCommand>,
}

#[derive(Default)]
pub struct MockGateway {
    prices: Mutex<HashMap<String, Decimal>>,
    orders: Mutex<Vec<OrderRequest>>,
    reject_orders: Mutex<bool>,
    streams: Mutex<Vec<StreamHandle>>,
}

impl MockGateway {
    pub fn with_price(self, tradingsymbol: &str, price: Decimal) -> Self {
        self.prices.lock().insert(tradingsymbol.to_string(), price);
        self
    }

    pub fn reject_orders(&self) {
        *self.reject_orders.lock() = true;
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().clone()
    }

    pub fn take_stream(&self) -> StreamHandle {
        self.streams.lock().remove(0)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }
}

#[async_trait]
impl BrokerageGateway for MockGateway {
    async fn last_price(&self, tradingsymbol: &str) -> Result<Decimal, GatewayError> {
        self.prices
            .lock()
            .get(tradingsymbol)
            .copied()
            .ok_or_else(|| GatewayError::api(404, format!("no quote for {tradingsymbol}")))
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError> {
        self.orders.lock().push(order.clone());
        if *self.reject_orders.lock() {
            return Err(GatewayError::Rejected("RMS: margin exceeds".to_string()));
        }
        Ok(OrderAck {
            order_id: format!("MOCK-{}", self.orders.lock().len()),
        })
    }

    async fn open_tick_stream(&self) -> Result<TickSubscription, GatewayError> {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (command_tx, command_rx) = mpsc::channel(64);
        self.streams.lock().push(StreamHandle {
            events: event_tx,
            commands: command_rx,
        });
        Ok(TickSubscription {
            commands: command_tx,
            events: event_rx,
        })
    }
}

pub fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
}

pub fn contract(symbol: &str, strike: Decimal, option_type: OptionType, token: u32) -> InstrumentRecord {
    InstrumentRecord {
        symbol: symbol.to_string(),
        tradingsymbol: format!("{symbol}24MAY{strike}{}", option_type.code()),
        instrument_token: token,
        expiry: NaiveDate::from_ymd_opt(2024, 5, 30).unwrap(),
        strike,
        option_type,
        lot_size: 100,
        tick_size: dec!(0.05),
    }
}

pub fn catalog() -> InstrumentCatalog {
    InstrumentCatalog::from_records(vec![
        contract("SBIN", dec!(720), OptionType::Call, 1001),
        contract("SBIN", dec!(730), OptionType::Call, 1002),
        contract("SBIN", dec!(720), OptionType::Put, 1003),
        contract("TCS", dec!(3900), OptionType::Call, 2001),
        contract("TCS", dec!(3950), OptionType::Call, 2002),
    ])
}

pub fn trade_config(qty: u32, tp: Decimal, sl: Decimal) -> TradeConfig {
    TradeConfig { qty, tp, sl }
}

pub struct Pipeline {
    pub dispatcher: AlertDispatcher,
    pub supervisor: Arc<MonitorSupervisor>,
    pub gateway: Arc<MockGateway>,
    pub log: Arc<MemoryActivityLog>,
    pub credentials: Arc<CredentialStore>,
}

pub fn pipeline(gateway: MockGateway, configs: BTreeMap<String, TradeConfig>) -> Pipeline {
    let gateway = Arc::new(gateway);
    let log = Arc::new(MemoryActivityLog::new());
    let credentials = Arc::new(CredentialStore::new());
    credentials.install(AccessTokenLease::new(
        "test-token",
        Utc::now(),
        Utc::now() + chrono::Duration::hours(6),
    ));

    let submitter = Arc::new(OrderSubmitter::new(
        gateway.clone(),
        PriceAdjuster::default(),
        log.clone(),
    ));
    let supervisor = Arc::new(MonitorSupervisor::new(
        gateway.clone(),
        Arc::clone(&submitter),
        Arc::clone(&credentials),
        log.clone(),
    ));
    let dispatcher = AlertDispatcher::new(
        Arc::new(CatalogProvider::preloaded(catalog())),
        Arc::new(TradeConfigStore::in_memory(configs)),
        gateway.clone(),
        submitter,
        Arc::clone(&supervisor),
        log.clone(),
    );

    Pipeline {
        dispatcher,
        supervisor,
        gateway,
        log,
        credentials,
    }
}
