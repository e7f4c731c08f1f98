//! Paper trading gateway.
//!
//! Prices and ticks come from the wrapped gateway; orders are filled locally
//! at their limit price and never reach the broker.

use alert_bridge_core::{
    BrokerageGateway, GatewayError, OrderAck, OrderRequest, OrderSide, TickSubscription,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// A simulated fill.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperFill {
    pub order_id: String,
    pub tradingsymbol: String,
    pub side: OrderSide,
    pub quantity: u32,
    /// `None` for market orders.
    pub price: Option<Decimal>,
    pub filled_at: DateTime<Utc>,
}

pub struct PaperGateway {
    inner: Arc<dyn BrokerageGateway>,
    sequence: AtomicU64,
    fills: Mutex<Vec<PaperFill>>,
}

impl std::fmt::Debug for PaperGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperGateway")
            .field("fills", &self.fills.lock().len())
            .finish_non_exhaustive()
    }
}

impl PaperGateway {
    #[must_use]
    pub fn new(inner: Arc<dyn BrokerageGateway>) -> Self {
        Self {
            inner,
            sequence: AtomicU64::new(0),
            fills: Mutex::new(Vec::new()),
        }
    }

    /// Fills recorded so far, oldest first.
    #[must_use]
    pub fn fills(&self) -> Vec<PaperFill> {
        self.fills.lock().clone()
    }
}

#[async_trait]
impl BrokerageGateway for PaperGateway {
    async fn last_price(&self, tradingsymbol: &str) -> Result<Decimal, GatewayError> {
        self.inner.last_price(tradingsymbol).await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError> {
        if order.quantity == 0 {
            return Err(GatewayError::Rejected("quantity must be positive".to_string()));
        }

        let now = Utc::now();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let fill = PaperFill {
            order_id: format!("PAPER-{}-{seq}", now.timestamp_millis()),
            tradingsymbol: order.tradingsymbol.clone(),
            side: order.side,
            quantity: order.quantity,
            price: order.limit_price(),
            filled_at: now,
        };

        info!(
            order_id = %fill.order_id,
            tradingsymbol = %fill.tradingsymbol,
            side = %fill.side,
            quantity = fill.quantity,
            price = ?fill.price,
            "Paper fill simulated"
        );

        let ack = OrderAck {
            order_id: fill.order_id.clone(),
        };
        self.fills.lock().push(fill);
        Ok(ack)
    }

    async fn open_tick_stream(&self) -> Result<TickSubscription, GatewayError> {
        self.inner.open_tick_stream().await
    }
}
