use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub kite: KiteConfig,
    pub paths: PathsConfig,
    pub execution: ExecutionConfig,
    pub ticker: TickerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KiteConfig {
    pub api_key: String,
    pub api_url: String,
    pub ws_url: String,
    /// Exchange segment orders and quotes are routed to.
    pub exchange: String,
    /// Product code for placed orders (carry-forward by default).
    pub product: String,
    pub requests_per_second: u32,
    pub timeout_secs: u64,
}

impl Default for KiteConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: "https://api.kite.trade".to_string(),
            ws_url: "wss://ws.kite.trade".to_string(),
            exchange: "NFO".to_string(),
            product: "NRML".to_string(),
            requests_per_second: 10,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub instruments: PathBuf,
    pub trade_config: PathBuf,
    pub trade_log: PathBuf,
    pub tick_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            instruments: PathBuf::from("instruments.json"),
            trade_config: PathBuf::from("tpsl.json"),
            trade_log: PathBuf::from("trade_logs.txt"),
            tick_log: PathBuf::from("ltp_logs.txt"),
        }
    }
}

/// Whether orders reach the broker or are filled locally.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Live,
    /// Orders are simulated; prices and ticks still come from the broker.
    #[default]
    Paper,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    /// Limit-price offset applied above (BUY) or below (SELL) the reference price.
    pub price_bias_pct: Decimal,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Paper,
            price_bias_pct: Decimal::from(20),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerConfig {
    pub initial_reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    /// 0 = retry forever.
    pub max_reconnect_attempts: u32,
    pub channel_buffer_size: usize,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            initial_reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 60_000,
            max_reconnect_attempts: 0,
            channel_buffer_size: 1_000,
        }
    }
}

impl TickerConfig {
    #[must_use]
    pub const fn initial_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.initial_reconnect_delay_ms)
    }

    #[must_use]
    pub const fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }
}
