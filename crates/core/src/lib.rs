//! Core types, gateway traits, credential lease and configuration shared by
//! the alert-to-exit pipeline and its brokerage adapters.

pub mod catalog;
pub mod config;
pub mod config_loader;
pub mod config_watcher;
pub mod error;
pub mod events;
pub mod lease;
pub mod traits;
pub mod types;

pub use catalog::InstrumentRow;
pub use config::{AppConfig, ExecutionConfig, ExecutionMode, KiteConfig, PathsConfig, ServerConfig, TickerConfig};
pub use config_loader::ConfigLoader;
pub use config_watcher::FileWatcher;
pub use error::{GatewayError, LeaseError, StreamError};
pub use events::{StreamCommand, StreamEvent, StreamMode};
pub use lease::{AccessTokenLease, CredentialStore};
pub use traits::{BrokerageGateway, TickSubscription};
pub use types::{
    InstrumentRecord, OptionType, OrderAck, OrderRequest, OrderSide, OrderType, ResolvedContract, Tick,
    TradeConfig,
};
