//! [`BrokerageGateway`] backed by Kite Connect.

use crate::client::KiteClient;
use crate::ticker::{KiteTicker, KiteTickerConfig};
use alert_bridge_core::{
    BrokerageGateway, GatewayError, OrderAck, OrderRequest, TickSubscription,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Live gateway: quotes and orders over REST, ticks over the ticker socket.
#[derive(Debug)]
pub struct KiteGateway {
    client: Arc<KiteClient>,
    ticker: KiteTickerConfig,
}

impl KiteGateway {
    #[must_use]
    pub fn new(client: Arc<KiteClient>, ticker: KiteTickerConfig) -> Self {
        Self { client, ticker }
    }

    #[must_use]
    pub fn client(&self) -> &Arc<KiteClient> {
        &self.client
    }
}

#[async_trait]
impl BrokerageGateway for KiteGateway {
    async fn last_price(&self, tradingsymbol: &str) -> Result<Decimal, GatewayError> {
        Ok(self.client.last_price(tradingsymbol).await?)
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError> {
        let order_id = self.client.place_order(order).await?;
        Ok(OrderAck { order_id })
    }

    async fn open_tick_stream(&self) -> Result<TickSubscription, GatewayError> {
        // Fail fast; the ticker itself only re-checks on reconnect.
        self.client.credentials().current()?;
        Ok(KiteTicker::connect(
            self.ticker.clone(),
            Arc::clone(self.client.credentials()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::KiteClientConfig;
    use alert_bridge_core::{CredentialStore, LeaseError};

    #[tokio::test]
    async fn stream_requires_valid_lease() {
        let client = KiteClient::new(KiteClientConfig::default(), Arc::new(CredentialStore::new()))
            .unwrap();
        let gateway = KiteGateway::new(Arc::new(client), KiteTickerConfig::default());

        let err = gateway.open_tick_stream().await.unwrap_err();
        assert!(matches!(err, GatewayError::LeaseUnavailable(LeaseError::Missing)));
    }
}
