use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::events::{StreamCommand, StreamEvent};
use crate::types::{OrderAck, OrderRequest};

/// Both ends of one dedicated tick-stream connection.
///
/// The owner sends [`StreamCommand`]s and consumes [`StreamEvent`]s in
/// delivery order. Dropping both ends lets the connection task wind down.
#[derive(Debug)]
pub struct TickSubscription {
    pub commands: mpsc::Sender<StreamCommand>,
    pub events: mpsc::Receiver<StreamEvent>,
}

/// Brokerage capabilities consumed by the pipeline.
#[async_trait]
pub trait BrokerageGateway: Send + Sync {
    /// Last traded price of a contract.
    async fn last_price(&self, tradingsymbol: &str) -> Result<Decimal, GatewayError>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError>;

    /// Opens a new stream connection authenticated with the current lease.
    ///
    /// Implementations must refuse to open when no valid lease is installed.
    async fn open_tick_stream(&self) -> Result<TickSubscription, GatewayError>;
}
