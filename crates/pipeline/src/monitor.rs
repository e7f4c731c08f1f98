//! Per-position streaming monitor.
//!
//! A monitor owns one tick subscription for one open position. It evaluates
//! take-profit and stop-loss on every tick and fires the closing SELL exactly
//! once. The transition ACTIVE -> EXITED is a single compare-and-swap, so
//! concurrent qualifying ticks cannot produce a second exit.

use alert_bridge_core::{OrderSide, StreamCommand, StreamEvent, StreamMode, Tick};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::activity_log::ActivityLog;
use crate::submitter::OrderSubmitter;

const ACTIVE: u8 = 0;
const EXITED: u8 = 1;

/// The monitor's unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub tradingsymbol: String,
    pub instrument_token: u32,
    pub entry_price: Decimal,
    /// Units, already multiplied by the lot size.
    pub qty: u32,
    pub tick_size: Decimal,
    pub tp_percent: Decimal,
    pub sl_percent: Decimal,
}

impl Position {
    #[must_use]
    pub fn take_profit_price(&self) -> Decimal {
        self.entry_price * (Decimal::ONE + self.tp_percent / Decimal::ONE_HUNDRED)
    }

    #[must_use]
    pub fn stop_loss_price(&self) -> Decimal {
        self.entry_price * (Decimal::ONE - self.sl_percent / Decimal::ONE_HUNDRED)
    }

    /// Returns why a tick at `last_price` closes the position, if it does.
    #[must_use]
    pub fn exit_reason(&self, last_price: Decimal) -> Option<ExitReason> {
        if last_price >= self.take_profit_price() {
            Some(ExitReason::TakeProfit)
        } else if last_price <= self.stop_loss_price() {
            Some(ExitReason::StopLoss)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    /// Unsubscribed by an operator or at shutdown; no order is placed.
    Manual,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TakeProfit => write!(f, "take-profit"),
            Self::StopLoss => write!(f, "stop-loss"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MonitorState {
    Active,
    Exited,
}

/// What happened when the position was closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitRecord {
    pub reason: ExitReason,
    /// Triggering tick price; `None` for manual exits.
    pub price: Option<Decimal>,
    pub at: DateTime<Utc>,
    pub order_id: Option<String>,
    pub order_error: Option<String>,
}

/// Point-in-time view of a monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorSnapshot {
    pub id: u64,
    pub tradingsymbol: String,
    pub instrument_token: u32,
    pub entry_price: Decimal,
    pub qty: u32,
    pub take_profit_price: Decimal,
    pub stop_loss_price: Decimal,
    pub state: MonitorState,
    /// False once the tick stream has ended.
    pub streaming: bool,
    pub started_at: DateTime<Utc>,
    pub exit: Option<ExitRecord>,
}

pub struct PositionMonitor {
    id: u64,
    position: Position,
    state: AtomicU8,
    streaming: AtomicBool,
    started_at: DateTime<Utc>,
    exit: Mutex<Option<ExitRecord>>,
    commands: mpsc::Sender<StreamCommand>,
    submitter: Arc<OrderSubmitter>,
    log: Arc<dyn ActivityLog>,
}

impl std::fmt::Debug for PositionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionMonitor")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PositionMonitor {
    /// Creates an ACTIVE monitor that drives the stream through `commands`.
    #[must_use]
    pub fn new(
        id: u64,
        position: Position,
        commands: mpsc::Sender<StreamCommand>,
        submitter: Arc<OrderSubmitter>,
        log: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            id,
            position,
            state: AtomicU8::new(ACTIVE),
            streaming: AtomicBool::new(true),
            started_at: Utc::now(),
            exit: Mutex::new(None),
            commands,
            submitter,
            log,
        }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn position(&self) -> &Position {
        &self.position
    }

    #[must_use]
    pub fn state(&self) -> MonitorState {
        if self.state.load(Ordering::Acquire) == ACTIVE {
            MonitorState::Active
        } else {
            MonitorState::Exited
        }
    }

    #[must_use]
    pub fn is_exited(&self) -> bool {
        self.state() == MonitorState::Exited
    }

    /// False once the tick stream has ended, whatever the position state.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn exit_record(&self) -> Option<ExitRecord> {
        self.exit.lock().clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            id: self.id,
            tradingsymbol: self.position.tradingsymbol.clone(),
            instrument_token: self.position.instrument_token,
            entry_price: self.position.entry_price,
            qty: self.position.qty,
            take_profit_price: self.position.take_profit_price(),
            stop_loss_price: self.position.stop_loss_price(),
            state: self.state(),
            streaming: self.is_streaming(),
            started_at: self.started_at,
            exit: self.exit_record(),
        }
    }

    /// Single winner for ACTIVE -> EXITED.
    fn try_exit(&self) -> bool {
        self.state
            .compare_exchange(ACTIVE, EXITED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Consumes stream events until the position exits, the stream ends, or
    /// `cancel` fires (or its sender is dropped).
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<StreamEvent>,
        mut cancel: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = &mut cancel => {
                    self.cancel().await;
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        self.on_event(event).await;
                        if self.is_exited() {
                            break;
                        }
                    }
                    None => {
                        if !self.is_exited() {
                            warn!(
                                monitor_id = self.id,
                                tradingsymbol = %self.position.tradingsymbol,
                                "Tick stream ended while position is still open"
                            );
                            self.log.tick(&format!(
                                "Tick stream ended for token {}; position {} remains open",
                                self.position.instrument_token, self.position.tradingsymbol
                            ));
                            self.log.trade(&format!(
                                "Monitoring stopped for tradingsymbol {} token number {}: tick stream ended, position left open",
                                self.position.tradingsymbol, self.position.instrument_token
                            ));
                        }
                        break;
                    }
                }
            }
        }

        self.streaming.store(false, Ordering::Release);
        debug!(monitor_id = self.id, state = ?self.state(), "Monitor task finished");
    }

    /// Handles one stream event.
    pub async fn on_event(&self, event: StreamEvent) {
        if self.is_exited() {
            return;
        }
        let token = self.position.instrument_token;

        match event {
            StreamEvent::Ticks(ticks) => self.on_ticks(&ticks).await,
            StreamEvent::Connected => {
                self.log.tick(&format!("Connected; subscribing token {token} in ltp mode"));
                self.send(StreamCommand::Subscribe(vec![token])).await;
                self.send(StreamCommand::SetMode(StreamMode::Ltp, vec![token])).await;
            }
            StreamEvent::Disconnected { reason } => {
                self.log.tick(&format!("Disconnected for token {token}: {reason}"));
            }
            StreamEvent::Reconnecting { attempt, delay } => {
                self.log.tick(&format!(
                    "Reconnecting for token {token}: attempt {attempt}, delay {}ms",
                    delay.as_millis()
                ));
            }
            StreamEvent::Error(error) if error.is_rate_limited() => {
                // Keep the subscription; the stream's own backoff recovers.
                warn!(monitor_id = self.id, token, "Tick stream rate limited");
                self.log.tick(&format!(
                    "Rate limited (HTTP 429) on tick stream for token {token}; keeping subscription"
                ));
            }
            StreamEvent::Error(error) => {
                warn!(monitor_id = self.id, token, error = %error, "Tick stream error");
                self.log.tick(&format!("Tick stream error for token {token}: {error}"));
            }
        }
    }

    /// Evaluates a tick batch in delivery order.
    ///
    /// Safe to call concurrently; at most one call ever places the exit order.
    pub async fn on_ticks(&self, ticks: &[Tick]) {
        let token = self.position.instrument_token;
        let tp_price = self.position.take_profit_price();
        let sl_price = self.position.stop_loss_price();

        for tick in ticks.iter().filter(|t| t.instrument_token == token) {
            if self.is_exited() {
                return;
            }

            self.log.tick(&format!(
                "Tick for token {token}: LTP = {} tpPrice = {tp_price} slPrice = {sl_price}",
                tick.last_price
            ));

            if let Some(reason) = self.position.exit_reason(tick.last_price) {
                if self.try_exit() {
                    self.execute_exit(reason, tick.last_price).await;
                }
                return;
            }
        }
    }

    async fn execute_exit(&self, reason: ExitReason, last_price: Decimal) {
        let position = &self.position;
        let outcome = self
            .submitter
            .submit(
                &position.tradingsymbol,
                position.qty,
                last_price,
                OrderSide::Sell,
                position.tick_size,
            )
            .await;

        let (order_id, order_error) = match outcome {
            Ok(ack) => (Some(ack.order_id), None),
            Err(e) => (None, Some(e.to_string())),
        };
        info!(
            monitor_id = self.id,
            tradingsymbol = %position.tradingsymbol,
            token = position.instrument_token,
            %last_price,
            %reason,
            order_id = order_id.as_deref().unwrap_or("-"),
            order_error = order_error.as_deref().unwrap_or("-"),
            "Exiting position"
        );
        let result = match (&order_id, &order_error) {
            (Some(id), _) => format!("exit order id={id}"),
            (None, Some(e)) => format!("exit order failed: {e}"),
            (None, None) => "exit order not placed".to_string(),
        };
        self.log.trade(&format!(
            "Exiting position for tradingsymbol {} token number {} at price {last_price} ({reason}): {result}",
            position.tradingsymbol, position.instrument_token
        ));

        *self.exit.lock() = Some(ExitRecord {
            reason,
            price: Some(last_price),
            at: Utc::now(),
            order_id,
            order_error,
        });

        self.teardown().await;
    }

    /// Exits without placing an order. Returns false if already exited.
    pub async fn cancel(&self) -> bool {
        if !self.try_exit() {
            return false;
        }

        info!(
            monitor_id = self.id,
            tradingsymbol = %self.position.tradingsymbol,
            "Monitor cancelled"
        );
        self.log.trade(&format!(
            "Monitor cancelled for tradingsymbol {} token number {}; no exit order placed",
            self.position.tradingsymbol, self.position.instrument_token
        ));
        *self.exit.lock() = Some(ExitRecord {
            reason: ExitReason::Manual,
            price: None,
            at: Utc::now(),
            order_id: None,
            order_error: None,
        });

        self.teardown().await;
        true
    }

    async fn teardown(&self) {
        self.send(StreamCommand::Unsubscribe(vec![self.position.instrument_token]))
            .await;
        self.send(StreamCommand::Close).await;
    }

    async fn send(&self, command: StreamCommand) {
        if self.commands.send(command).await.is_err() {
            debug!(monitor_id = self.id, "Tick stream already closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity_log::{LogChannel, MemoryActivityLog};
    use crate::pricing::PriceAdjuster;
    use alert_bridge_core::{BrokerageGateway, GatewayError, OrderAck, OrderRequest, TickSubscription};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    #[derive(Default)]
    struct CountingGateway {
        orders: Mutex<Vec<OrderRequest>>,
        reject: bool,
    }

    #[async_trait]
    impl BrokerageGateway for CountingGateway {
        async fn last_price(&self, _tradingsymbol: &str) -> Result<Decimal, GatewayError> {
            Ok(dec!(100))
        }

        async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError> {
            self.orders.lock().push(order.clone());
            if self.reject {
                return Err(GatewayError::Rejected("margin exceeds".to_string()));
            }
            Ok(OrderAck {
                order_id: format!("ORD-{}", self.orders.lock().len()),
            })
        }

        async fn open_tick_stream(&self) -> Result<TickSubscription, GatewayError> {
            Err(GatewayError::Network("unused".to_string()))
        }
    }

    fn position() -> Position {
        Position {
            tradingsymbol: "SBIN24MAY730CE".to_string(),
            instrument_token: 7,
            entry_price: dec!(100),
            qty: 1500,
            tick_size: dec!(0.05),
            tp_percent: dec!(5),
            sl_percent: dec!(2),
        }
    }

    struct Harness {
        monitor: Arc<PositionMonitor>,
        gateway: Arc<CountingGateway>,
        log: Arc<MemoryActivityLog>,
        commands: mpsc::Receiver<StreamCommand>,
    }

    fn harness() -> Harness {
        harness_with(CountingGateway::default())
    }

    fn harness_with(gateway: CountingGateway) -> Harness {
        let gateway = Arc::new(gateway);
        let log = Arc::new(MemoryActivityLog::new());
        let submitter = Arc::new(OrderSubmitter::new(
            gateway.clone(),
            PriceAdjuster::default(),
            log.clone(),
        ));
        let (tx, rx) = mpsc::channel(16);
        let monitor = Arc::new(PositionMonitor::new(1, position(), tx, submitter, log.clone()));
        Harness {
            monitor,
            gateway,
            log,
            commands: rx,
        }
    }

    fn tick(token: u32, price: Decimal) -> Tick {
        Tick {
            instrument_token: token,
            last_price: price,
        }
    }

    #[test]
    fn threshold_math() {
        let pos = position();
        assert_eq!(pos.take_profit_price(), dec!(105));
        assert_eq!(pos.stop_loss_price(), dec!(98));
        assert_eq!(pos.exit_reason(dec!(105)), Some(ExitReason::TakeProfit));
        assert_eq!(pos.exit_reason(dec!(98)), Some(ExitReason::StopLoss));
        assert_eq!(pos.exit_reason(dec!(100)), None);
    }

    #[tokio::test]
    async fn take_profit_tick_exits_once_and_tears_down() {
        let mut h = harness();

        h.monitor
            .on_ticks(&[tick(7, dec!(101)), tick(7, dec!(105)), tick(7, dec!(106))])
            .await;

        assert!(h.monitor.is_exited());
        let orders = h.gateway.orders.lock().clone();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, OrderSide::Sell);
        assert_eq!(orders[0].quantity, 1500);
        // 105 * 0.8 = 84
        assert_eq!(orders[0].limit_price(), Some(dec!(84)));

        assert_eq!(h.log.count_containing(LogChannel::Trade, "Exiting position"), 1);
        assert_eq!(h.log.count_containing(LogChannel::Tick, "Tick for token 7"), 2);

        assert_eq!(h.commands.recv().await, Some(StreamCommand::Unsubscribe(vec![7])));
        assert_eq!(h.commands.recv().await, Some(StreamCommand::Close));

        let exit = h.monitor.exit_record().unwrap();
        assert_eq!(exit.reason, ExitReason::TakeProfit);
        assert_eq!(exit.price, Some(dec!(105)));
        assert_eq!(exit.order_id.as_deref(), Some("ORD-1"));
    }

    #[tokio::test]
    async fn exit_line_follows_the_order_and_names_it() {
        let h = harness();
        h.monitor.on_ticks(&[tick(7, dec!(105))]).await;

        let trades = h.log.lines(LogChannel::Trade);
        let placed = trades.iter().position(|l| l.starts_with("Order placed")).unwrap();
        let exiting = trades.iter().position(|l| l.starts_with("Exiting position")).unwrap();
        assert!(placed < exiting);
        assert!(trades[exiting].ends_with("exit order id=ORD-1"));
    }

    #[tokio::test]
    async fn rejected_exit_order_is_recorded() {
        let h = harness_with(CountingGateway {
            reject: true,
            ..CountingGateway::default()
        });
        h.monitor.on_ticks(&[tick(7, dec!(98))]).await;

        assert!(h.monitor.is_exited());
        assert_eq!(
            h.log.count_containing(LogChannel::Trade, "exit order failed: "),
            1
        );
        let exit = h.monitor.exit_record().unwrap();
        assert!(exit.order_id.is_none());
        assert!(exit.order_error.unwrap().contains("margin exceeds"));
    }

    #[tokio::test]
    async fn stop_loss_and_neutral_ticks() {
        let h = harness();
        h.monitor.on_ticks(&[tick(7, dec!(100))]).await;
        assert!(!h.monitor.is_exited());

        h.monitor.on_ticks(&[tick(7, dec!(98))]).await;
        assert!(h.monitor.is_exited());
        assert_eq!(h.monitor.exit_record().unwrap().reason, ExitReason::StopLoss);
    }

    #[tokio::test]
    async fn other_tokens_are_ignored() {
        let h = harness();
        h.monitor.on_ticks(&[tick(8, dec!(500))]).await;
        assert!(!h.monitor.is_exited());
        assert!(h.log.lines(LogChannel::Tick).is_empty());
    }

    #[tokio::test]
    async fn ticks_after_exit_are_silent() {
        let h = harness();
        h.monitor.on_ticks(&[tick(7, dec!(110))]).await;
        let logged = h.log.lines(LogChannel::Tick).len();

        h.monitor.on_ticks(&[tick(7, dec!(120))]).await;
        h.monitor.on_event(StreamEvent::Connected).await;
        assert_eq!(h.log.lines(LogChannel::Tick).len(), logged);
        assert_eq!(h.gateway.orders.lock().len(), 1);
    }

    #[tokio::test]
    async fn connect_subscribes_in_ltp_mode() {
        let mut h = harness();
        h.monitor.on_event(StreamEvent::Connected).await;

        assert_eq!(h.commands.recv().await, Some(StreamCommand::Subscribe(vec![7])));
        assert_eq!(
            h.commands.recv().await,
            Some(StreamCommand::SetMode(StreamMode::Ltp, vec![7]))
        );
    }

    #[tokio::test]
    async fn rate_limit_is_distinguished_and_keeps_subscription() {
        let mut h = harness();
        h.monitor
            .on_event(StreamEvent::Error(alert_bridge_core::StreamError::RateLimited))
            .await;

        assert!(!h.monitor.is_exited());
        assert_eq!(h.log.count_containing(LogChannel::Tick, "429"), 1);
        assert!(h.commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn log_failure_does_not_stop_exit() {
        let h = harness();
        h.log.set_failing(true);

        h.monitor
            .on_event(StreamEvent::Disconnected {
                reason: "reset".to_string(),
            })
            .await;
        h.monitor.on_ticks(&[tick(7, dec!(97))]).await;

        assert!(h.monitor.is_exited());
        assert_eq!(h.gateway.orders.lock().len(), 1);
    }

    #[tokio::test]
    async fn cancel_exits_without_order() {
        let h = harness();
        assert!(h.monitor.cancel().await);
        assert!(!h.monitor.cancel().await);

        assert!(h.monitor.is_exited());
        assert!(h.gateway.orders.lock().is_empty());
        assert_eq!(h.monitor.exit_record().unwrap().reason, ExitReason::Manual);
    }

    #[tokio::test]
    async fn run_loop_stops_after_exit() {
        let h = harness();
        let (event_tx, event_rx) = mpsc::channel(8);
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(Arc::clone(&h.monitor).run(event_rx, cancel_rx));

        event_tx.send(StreamEvent::Connected).await.unwrap();
        event_tx
            .send(StreamEvent::Ticks(vec![tick(7, dec!(99)), tick(7, dec!(105.5))]))
            .await
            .unwrap();

        task.await.unwrap();
        assert!(h.monitor.is_exited());
        assert!(!h.monitor.snapshot().streaming);
        assert_eq!(h.gateway.orders.lock().len(), 1);
    }
}
