//! Order submission with price adjustment and trade logging.

use alert_bridge_core::{BrokerageGateway, GatewayError, OrderAck, OrderRequest, OrderSide};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::activity_log::ActivityLog;
use crate::pricing::PriceAdjuster;

/// Places limit orders at an adjusted price and records the outcome.
///
/// Failures are logged and returned; retrying is left to the caller.
pub struct OrderSubmitter {
    gateway: Arc<dyn BrokerageGateway>,
    adjuster: PriceAdjuster,
    log: Arc<dyn ActivityLog>,
}

impl std::fmt::Debug for OrderSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderSubmitter")
            .field("adjuster", &self.adjuster)
            .finish_non_exhaustive()
    }
}

impl OrderSubmitter {
    #[must_use]
    pub fn new(gateway: Arc<dyn BrokerageGateway>, adjuster: PriceAdjuster, log: Arc<dyn ActivityLog>) -> Self {
        Self {
            gateway,
            adjuster,
            log,
        }
    }

    #[must_use]
    pub const fn adjuster(&self) -> &PriceAdjuster {
        &self.adjuster
    }

    /// Submits a limit order at `adjust(price, tick_size, side)`.
    ///
    /// # Errors
    /// Returns the gateway error if the order was not accepted.
    pub async fn submit(
        &self,
        tradingsymbol: &str,
        qty: u32,
        price: Decimal,
        side: OrderSide,
        tick_size: Decimal,
    ) -> Result<OrderAck, GatewayError> {
        let limit_price = self.adjuster.adjust(price, tick_size, side);
        let order = OrderRequest::limit(tradingsymbol, side, qty, limit_price);

        match self.gateway.place_order(&order).await {
            Ok(ack) => {
                tracing::info!(
                    order_id = %ack.order_id,
                    tradingsymbol,
                    %side,
                    qty,
                    %limit_price,
                    reference = %price,
                    "Order placed"
                );
                self.log.trade(&format!(
                    "Order placed: id={} {side} {qty} {tradingsymbol} @ {limit_price} (reference {price})",
                    ack.order_id
                ));
                Ok(ack)
            }
            Err(e) => {
                tracing::warn!(tradingsymbol, %side, qty, %limit_price, error = %e, "Order failed");
                self.log.trade(&format!(
                    "Order failed: {side} {qty} {tradingsymbol} @ {limit_price} (reference {price}): {e}"
                ));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity_log::{LogChannel, MemoryActivityLog};
    use alert_bridge_core::TickSubscription;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    #[derive(Default)]
    struct RecordingGateway {
        orders: Mutex<Vec<OrderRequest>>,
        reject: bool,
    }

    #[async_trait]
    impl BrokerageGateway for RecordingGateway {
        async fn last_price(&self, _tradingsymbol: &str) -> Result<Decimal, GatewayError> {
            Ok(Decimal::ZERO)
        }

        async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError> {
            self.orders.lock().push(order.clone());
            if self.reject {
                return Err(GatewayError::Rejected("insufficient margin".to_string()));
            }
            Ok(OrderAck {
                order_id: "240501000000001".to_string(),
            })
        }

        async fn open_tick_stream(&self) -> Result<TickSubscription, GatewayError> {
            Err(GatewayError::Network("unused".to_string()))
        }
    }

    #[tokio::test]
    async fn success_logs_adjusted_price_and_id() {
        let gateway = Arc::new(RecordingGateway::default());
        let log = Arc::new(MemoryActivityLog::new());
        let submitter = OrderSubmitter::new(gateway.clone(), PriceAdjuster::default(), log.clone());

        let ack = submitter
            .submit("SBIN24MAY730CE", 1500, dec!(12.35), OrderSide::Buy, dec!(0.05))
            .await
            .unwrap();

        assert_eq!(ack.order_id, "240501000000001");
        let orders = gateway.orders.lock();
        assert_eq!(orders[0].limit_price(), Some(dec!(14.80)));
        assert_eq!(orders[0].quantity, 1500);

        let lines = log.lines(LogChannel::Trade);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("240501000000001"));
        assert!(lines[0].contains("BUY 1500 SBIN24MAY730CE @ 14.8"));
    }

    #[tokio::test]
    async fn failure_is_logged_and_not_retried() {
        let gateway = Arc::new(RecordingGateway {
            reject: true,
            ..Default::default()
        });
        let log = Arc::new(MemoryActivityLog::new());
        let submitter = OrderSubmitter::new(gateway.clone(), PriceAdjuster::default(), log.clone());

        let err = submitter
            .submit("SBIN24MAY730CE", 1500, dec!(12.35), OrderSide::Sell, dec!(0.05))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Rejected(_)));
        assert_eq!(gateway.orders.lock().len(), 1);
        assert_eq!(log.count_containing(LogChannel::Trade, "Order failed"), 1);
        assert_eq!(log.count_containing(LogChannel::Trade, "insufficient margin"), 1);
    }
}
