//! Kite ticker WebSocket client.
//!
//! Streams binary tick packets for subscribed instrument tokens. Features:
//! - Subscribe, unsubscribe and mode changes driven through a command channel
//! - Lifecycle reported as [`StreamEvent`]s (connected, disconnected, reconnecting, error)
//! - Automatic reconnection with exponential backoff
//! - The access token is re-read from the credential store on every connect
//!
//! # Binary frame layout
//!
//! ```text
//! [u16 packet count] ([u16 packet length] [packet bytes])*
//! packet: [u32 instrument token] [i32 last price in paise] ...
//! ```
//!
//! A frame of a single byte is a heartbeat.

use crate::error::{KiteError, Result};
use alert_bridge_core::{
    CredentialStore, KiteConfig, StreamCommand, StreamError, StreamEvent, Tick, TickSubscription,
    TickerConfig,
};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tracing::{debug, error, info, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the ticker connection.
#[derive(Debug, Clone)]
pub struct KiteTickerConfig {
    /// WebSocket endpoint.
    pub url: String,

    /// Public API key of the Kite Connect app.
    pub api_key: String,

    /// Initial reconnection delay.
    pub initial_reconnect_delay: Duration,

    /// Maximum reconnection delay (for exponential backoff).
    pub max_reconnect_delay: Duration,

    /// Maximum number of consecutive reconnection attempts (0 = unlimited).
    pub max_reconnect_attempts: u32,

    /// Event channel buffer size.
    pub channel_buffer_size: usize,
}

impl Default for KiteTickerConfig {
    fn default() -> Self {
        Self {
            url: "wss://ws.kite.trade".to_string(),
            api_key: String::new(),
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            max_reconnect_attempts: 0,
            channel_buffer_size: 1000,
        }
    }
}

impl KiteTickerConfig {
    /// Builds ticker settings from application configuration.
    #[must_use]
    pub fn from_settings(kite: &KiteConfig, ticker: &TickerConfig) -> Self {
        Self {
            url: kite.ws_url.clone(),
            api_key: kite.api_key.clone(),
            initial_reconnect_delay: ticker.initial_reconnect_delay(),
            max_reconnect_delay: ticker.max_reconnect_delay(),
            max_reconnect_attempts: ticker.max_reconnect_attempts,
            channel_buffer_size: ticker.channel_buffer_size.max(1),
        }
    }

    fn endpoint(&self, access_token: &str) -> String {
        format!(
            "{}/?api_key={}&access_token={}",
            self.url.trim_end_matches('/'),
            urlencoding::encode(&self.api_key),
            urlencoding::encode(access_token)
        )
    }
}

// ============================================================================
// Ticker
// ============================================================================

/// Entry point for opening ticker streams.
pub struct KiteTicker;

impl KiteTicker {
    /// Spawns a connection task and returns its command and event channels.
    ///
    /// The task ends after a [`StreamCommand::Close`], when the event receiver
    /// is dropped, or when reconnect attempts are exhausted.
    #[must_use]
    pub fn connect(config: KiteTickerConfig, credentials: Arc<CredentialStore>) -> TickSubscription {
        let (event_tx, event_rx) = mpsc::channel(config.channel_buffer_size);
        let (command_tx, command_rx) = mpsc::channel(64);

        tokio::spawn(run_connection_loop(config, credentials, event_tx, command_rx));

        TickSubscription {
            commands: command_tx,
            events: event_rx,
        }
    }
}

/// How a single connection session ended.
#[derive(Debug)]
enum SessionEnd {
    /// Close requested or nobody is listening; do not reconnect.
    Closed,
    /// Connection failed or dropped.
    Dropped {
        error: StreamError,
        was_connected: bool,
    },
}

// ============================================================================
// Connection Loop Implementation
// ============================================================================

async fn run_connection_loop(
    config: KiteTickerConfig,
    credentials: Arc<CredentialStore>,
    event_tx: mpsc::Sender<StreamEvent>,
    mut command_rx: mpsc::Receiver<StreamCommand>,
) {
    let mut reconnect_delay = config.initial_reconnect_delay;
    let mut reconnect_attempts: u32 = 0;

    loop {
        let end = match credentials.current() {
            Ok(lease) => {
                info!(url = %config.url, "Connecting to Kite ticker");
                connect_and_run(&config, lease.token(), &event_tx, &mut command_rx).await
            }
            Err(lease_error) => SessionEnd::Dropped {
                error: StreamError::Credential(lease_error),
                was_connected: false,
            },
        };

        let (error, was_connected) = match end {
            SessionEnd::Closed => {
                info!("Kite ticker closed");
                break;
            }
            SessionEnd::Dropped {
                error,
                was_connected,
            } => (error, was_connected),
        };

        let notice = if was_connected {
            reconnect_delay = config.initial_reconnect_delay;
            reconnect_attempts = 0;
            warn!(error = %error, "Kite ticker disconnected");
            StreamEvent::Disconnected {
                reason: error.to_string(),
            }
        } else {
            error!(error = %error, "Kite ticker connection failed");
            StreamEvent::Error(error)
        };
        if event_tx.send(notice).await.is_err() {
            break;
        }

        reconnect_attempts += 1;
        if config.max_reconnect_attempts > 0 && reconnect_attempts >= config.max_reconnect_attempts {
            error!(attempts = reconnect_attempts, "Max reconnection attempts exceeded");
            let _ = event_tx
                .send(StreamEvent::Error(StreamError::ReconnectsExhausted {
                    attempts: reconnect_attempts,
                }))
                .await;
            break;
        }

        if event_tx
            .send(StreamEvent::Reconnecting {
                attempt: reconnect_attempts,
                delay: reconnect_delay,
            })
            .await
            .is_err()
        {
            break;
        }

        info!(delay = ?reconnect_delay, attempt = reconnect_attempts, "Waiting before reconnect");
        if !wait_for_reconnect(reconnect_delay, &mut command_rx).await {
            info!("Kite ticker closed during backoff");
            break;
        }

        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay);
    }
}

/// Sleeps through the backoff while still honouring `Close`.
///
/// Returns false if the stream should stop instead of reconnecting.
async fn wait_for_reconnect(delay: Duration, command_rx: &mut mpsc::Receiver<StreamCommand>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            () = &mut sleep => return true,
            command = command_rx.recv() => match command {
                None | Some(StreamCommand::Close) => return false,
                Some(other) => debug!(command = ?other, "Dropping command while disconnected"),
            }
        }
    }
}

/// Connect to the ticker and pump frames until the session ends.
async fn connect_and_run(
    config: &KiteTickerConfig,
    access_token: &str,
    event_tx: &mpsc::Sender<StreamEvent>,
    command_rx: &mut mpsc::Receiver<StreamCommand>,
) -> SessionEnd {
    let ws_stream = match connect_async(config.endpoint(access_token)).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            return SessionEnd::Dropped {
                error: handshake_error(e),
                was_connected: false,
            }
        }
    };

    info!("Kite ticker connected");
    let (mut write, mut read) = ws_stream.split();

    if event_tx.send(StreamEvent::Connected).await.is_err() {
        let _ = write.close().await;
        return SessionEnd::Closed;
    }

    let dropped = |error: StreamError| SessionEnd::Dropped {
        error,
        was_connected: true,
    };

    loop {
        tokio::select! {
            command = command_rx.recv() => {
                let Some(command) = command.filter(|c| *c != StreamCommand::Close) else {
                    let _ = write.close().await;
                    return SessionEnd::Closed;
                };
                if let Some(text) = command_message(&command) {
                    debug!(message = %text, "Sending ticker command");
                    if let Err(e) = write.send(Message::Text(text)).await {
                        return dropped(StreamError::Connection(e.to_string()));
                    }
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => match parse_binary(&data) {
                        Ok(ticks) if ticks.is_empty() => {}
                        Ok(ticks) => {
                            if event_tx.send(StreamEvent::Ticks(ticks)).await.is_err() {
                                let _ = write.close().await;
                                return SessionEnd::Closed;
                            }
                        }
                        Err(e) => warn!(error = %e, len = data.len(), "Skipping malformed tick frame"),
                    },
                    Some(Ok(Message::Text(text))) => {
                        if let Some(message) = broker_error(&text) {
                            if event_tx.send(StreamEvent::Error(StreamError::Broker(message))).await.is_err() {
                                let _ = write.close().await;
                                return SessionEnd::Closed;
                            }
                        } else {
                            debug!(message = %text, "Ticker text message");
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            return dropped(StreamError::Connection(e.to_string()));
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(frame = ?frame, "Received close frame");
                        return dropped(StreamError::Connection(
                            frame
                                .map(|f| f.reason.to_string())
                                .unwrap_or_else(|| "connection closed".to_string()),
                        ));
                    }
                    Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Err(e)) => return dropped(StreamError::Connection(e.to_string())),
                    None => return dropped(StreamError::Connection("stream ended".to_string())),
                }
            }
        }
    }
}

fn handshake_error(err: tungstenite::Error) -> StreamError {
    match err {
        tungstenite::Error::Http(response) if response.status().as_u16() == 429 => {
            StreamError::RateLimited
        }
        tungstenite::Error::Http(response) => {
            StreamError::Connection(format!("handshake rejected with HTTP {}", response.status()))
        }
        other => StreamError::Connection(other.to_string()),
    }
}

// ============================================================================
// Wire Format
// ============================================================================

/// Serializes a command into the ticker's JSON control message.
fn command_message(command: &StreamCommand) -> Option<String> {
    let value = match command {
        StreamCommand::Subscribe(tokens) => serde_json::json!({ "a": "subscribe", "v": tokens }),
        StreamCommand::Unsubscribe(tokens) => serde_json::json!({ "a": "unsubscribe", "v": tokens }),
        StreamCommand::SetMode(mode, tokens) => {
            serde_json::json!({ "a": "mode", "v": [mode.as_str(), tokens] })
        }
        StreamCommand::Close => return None,
    };
    Some(value.to_string())
}

#[derive(Debug, Deserialize)]
struct TextMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Extracts the message of a broker `error` text frame.
fn broker_error(text: &str) -> Option<String> {
    let message: TextMessage = serde_json::from_str(text).ok()?;
    if message.kind != "error" {
        return None;
    }
    Some(match message.data {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Decimal places of the price field for an instrument's segment.
fn price_scale(instrument_token: u32) -> u32 {
    match instrument_token & 0xff {
        // Currency derivatives
        3 => 7,
        // BSE currency derivatives
        6 => 4,
        _ => 2,
    }
}

/// Decodes a binary frame into ticks.
///
/// # Errors
/// Returns error if the frame is truncated.
pub fn parse_binary(frame: &[u8]) -> Result<Vec<Tick>> {
    if frame.len() < 2 {
        return Ok(Vec::new());
    }

    let count = usize::from(u16::from_be_bytes([frame[0], frame[1]]));
    let mut ticks = Vec::with_capacity(count);
    let mut offset = 2;

    for index in 0..count {
        let header = frame
            .get(offset..offset + 2)
            .ok_or_else(|| truncated(index, "length"))?;
        let len = usize::from(u16::from_be_bytes([header[0], header[1]]));
        offset += 2;

        let packet = frame
            .get(offset..offset + len)
            .ok_or_else(|| truncated(index, "payload"))?;
        offset += len;

        if packet.len() < 8 {
            debug!(len = packet.len(), "Ignoring short ticker packet");
            continue;
        }

        let instrument_token = u32::from_be_bytes([packet[0], packet[1], packet[2], packet[3]]);
        let raw_price = i32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);
        ticks.push(Tick {
            instrument_token,
            last_price: Decimal::new(i64::from(raw_price), price_scale(instrument_token)),
        });
    }

    Ok(ticks)
}

fn truncated(index: usize, part: &str) -> KiteError {
    KiteError::Serialization(format!("tick frame truncated in packet {index} {part}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_bridge_core::{AccessTokenLease, StreamMode};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn ltp_packet(token: u32, price_paise: i32) -> Vec<u8> {
        let mut packet = token.to_be_bytes().to_vec();
        packet.extend_from_slice(&price_paise.to_be_bytes());
        packet
    }

    fn frame(packets: &[Vec<u8>]) -> Vec<u8> {
        let mut out = (packets.len() as u16).to_be_bytes().to_vec();
        for packet in packets {
            out.extend_from_slice(&(packet.len() as u16).to_be_bytes());
            out.extend_from_slice(packet);
        }
        out
    }

    fn logged_in() -> Arc<CredentialStore> {
        let store = Arc::new(CredentialStore::new());
        store.install(AccessTokenLease::new(
            "tok",
            Utc::now(),
            Utc::now() + chrono::Duration::hours(1),
        ));
        store
    }

    fn fast_config(url: String, max_reconnect_attempts: u32) -> KiteTickerConfig {
        KiteTickerConfig {
            url,
            api_key: "key".to_string(),
            initial_reconnect_delay: Duration::from_millis(10),
            max_reconnect_delay: Duration::from_millis(20),
            max_reconnect_attempts,
            channel_buffer_size: 16,
        }
    }

    async fn next_event(sub: &mut TickSubscription) -> StreamEvent {
        tokio::time::timeout(Duration::from_secs(5), sub.events.recv())
            .await
            .expect("timeout waiting for event")
            .expect("channel closed")
    }

    #[test]
    fn parses_ltp_packets() {
        // 256265 & 0xff = 9 (indices), 12345 & 0xff = 57 (NFO)
        let data = frame(&[ltp_packet(12_345, 1235), ltp_packet(256_265, 2_245_010)]);
        let ticks = parse_binary(&data).unwrap();

        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].instrument_token, 12_345);
        assert_eq!(ticks[0].last_price, dec!(12.35));
        assert_eq!(ticks[1].last_price, dec!(22450.10));
    }

    #[test]
    fn currency_segment_uses_wider_scale() {
        let token = (1000 << 8) | 3;
        let ticks = parse_binary(&frame(&[ltp_packet(token, 834_512_500)])).unwrap();
        assert_eq!(ticks[0].last_price, dec!(83.45125));
    }

    #[test]
    fn heartbeat_yields_no_ticks() {
        assert!(parse_binary(&[0]).unwrap().is_empty());
        assert!(parse_binary(&[]).unwrap().is_empty());
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let mut data = frame(&[ltp_packet(12_345, 100)]);
        data.truncate(data.len() - 2);
        assert!(parse_binary(&data).is_err());
    }

    #[test]
    fn command_messages_match_ticker_protocol() {
        let sub = command_message(&StreamCommand::Subscribe(vec![1, 2])).unwrap();
        assert_eq!(sub, r#"{"a":"subscribe","v":[1,2]}"#);

        let mode = command_message(&StreamCommand::SetMode(StreamMode::Ltp, vec![7])).unwrap();
        assert_eq!(mode, r#"{"a":"mode","v":["ltp",[7]]}"#);

        assert!(command_message(&StreamCommand::Close).is_none());
    }

    #[test]
    fn broker_error_text_frames() {
        assert_eq!(
            broker_error(r#"{"type":"error","data":"Invalid access token"}"#).as_deref(),
            Some("Invalid access token")
        );
        assert!(broker_error(r#"{"type":"order","data":{}}"#).is_none());
        assert!(broker_error("not json").is_none());
    }

    #[test]
    fn endpoint_carries_credentials() {
        let config = fast_config("wss://ws.kite.trade".to_string(), 1);
        assert_eq!(
            config.endpoint("a/b"),
            "wss://ws.kite.trade/?api_key=key&access_token=a%2Fb"
        );
    }

    #[tokio::test]
    async fn missing_lease_reports_credential_error_then_gives_up() {
        let mut sub = KiteTicker::connect(
            fast_config("ws://127.0.0.1:9".to_string(), 1),
            Arc::new(CredentialStore::new()),
        );

        assert!(matches!(
            next_event(&mut sub).await,
            StreamEvent::Error(StreamError::Credential(_))
        ));
        assert!(matches!(
            next_event(&mut sub).await,
            StreamEvent::Error(StreamError::ReconnectsExhausted { attempts: 1 })
        ));
        assert!(sub.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn http_429_handshake_is_rate_limited() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = tokio::io::AsyncReadExt::read(&mut stream, &mut buf).await;
                let _ = stream
                    .write_all(b"HTTP/1.1 429 Too Many Requests\r\nContent-Length: 0\r\n\r\n")
                    .await;
            }
        });

        let mut sub = KiteTicker::connect(fast_config(format!("ws://{addr}"), 2), logged_in());

        assert_eq!(next_event(&mut sub).await, StreamEvent::Error(StreamError::RateLimited));
        assert!(matches!(
            next_event(&mut sub).await,
            StreamEvent::Reconnecting { attempt: 1, .. }
        ));
        assert_eq!(next_event(&mut sub).await, StreamEvent::Error(StreamError::RateLimited));
    }

    #[tokio::test]
    async fn subscribes_and_streams_ticks() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, mut seen_rx) = mpsc::channel::<String>(4);

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut write, mut read) = ws.split();

            if let Some(Ok(Message::Text(text))) = read.next().await {
                seen_tx.send(text).await.unwrap();
                write
                    .send(Message::Binary(frame(&[ltp_packet(12_345, 1480)])))
                    .await
                    .unwrap();
            }
            // Wait for the client's close.
            while let Some(Ok(msg)) = read.next().await {
                if matches!(msg, Message::Close(_)) {
                    break;
                }
            }
        });

        let mut sub = KiteTicker::connect(fast_config(format!("ws://{addr}"), 1), logged_in());
        assert_eq!(next_event(&mut sub).await, StreamEvent::Connected);

        sub.commands
            .send(StreamCommand::Subscribe(vec![12_345]))
            .await
            .unwrap();
        assert_eq!(seen_rx.recv().await.unwrap(), r#"{"a":"subscribe","v":[12345]}"#);

        match next_event(&mut sub).await {
            StreamEvent::Ticks(ticks) => {
                assert_eq!(ticks.len(), 1);
                assert_eq!(ticks[0].last_price, dec!(14.80));
            }
            other => panic!("expected ticks, got {other:?}"),
        }

        sub.commands.send(StreamCommand::Close).await.unwrap();
        assert!(sub.events.recv().await.is_none());
    }
}
