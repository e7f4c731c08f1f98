//! Alert-to-exit pipeline.
//!
//! An alert is resolved into a nearest-the-money option, bought at an adjusted
//! limit price, and handed to a [`PositionMonitor`] that sells once the
//! take-profit or stop-loss threshold is crossed.

pub mod activity_log;
pub mod dispatcher;
pub mod error;
pub mod monitor;
pub mod pricing;
pub mod resolver;
pub mod submitter;
pub mod supervisor;
pub mod trade_config;

pub use activity_log::{ActivityLog, FileActivityLog, LogChannel, MemoryActivityLog};
pub use dispatcher::{option_type_for_scan, Alert, AlertDispatcher, AlertLeg, AlertPayload, SymbolOutcome};
pub use error::{AlertError, CatalogError, MonitorError, TradeConfigError};
pub use monitor::{ExitReason, ExitRecord, MonitorSnapshot, MonitorState, Position, PositionMonitor};
pub use pricing::{round_to_tick, PriceAdjuster, DEFAULT_BIAS_PCT};
pub use resolver::{exchange_date, resolve, target_expiry_month, CatalogProvider, InstrumentCatalog};
pub use submitter::OrderSubmitter;
pub use supervisor::MonitorSupervisor;
pub use trade_config::{TradeConfigStore, DEFAULT_KEY};
