//! Append-only activity log with separate trade and tick channels.
//!
//! Each record is a single line `"<local timestamp>: <message>"`.

use chrono::Local;
use parking_lot::Mutex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogChannel {
    /// Orders, exits and dispatch decisions.
    Trade,
    /// Raw ticks and stream lifecycle.
    Tick,
}

impl LogChannel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Tick => "tick",
        }
    }
}

pub trait ActivityLog: Send + Sync {
    /// Appends one record to a channel.
    ///
    /// # Errors
    /// Returns the underlying I/O error if the record could not be written.
    fn append(&self, channel: LogChannel, message: &str) -> io::Result<()>;

    /// Appends a record, reporting a write failure instead of returning it.
    fn record(&self, channel: LogChannel, message: &str) {
        if let Err(e) = self.append(channel, message) {
            tracing::error!(channel = channel.as_str(), error = %e, "Failed to write activity log");
        }
    }

    fn trade(&self, message: &str) {
        self.record(LogChannel::Trade, message);
    }

    fn tick(&self, message: &str) {
        self.record(LogChannel::Tick, message);
    }
}

fn format_line(message: &str) -> String {
    format!("{}: {}\n", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"), message)
}

/// Pending records the writer task may fall behind by before appends fail.
const WRITE_BACKLOG: usize = 10_000;

enum Record {
    Line(LogChannel, String),
    Flush(oneshot::Sender<()>),
}

/// Writes each channel to its own append-only file.
///
/// Appends are queued to a writer task so the callers (tick handlers on the
/// runtime) never wait on disk.
#[derive(Debug, Clone)]
pub struct FileActivityLog {
    trade_path: PathBuf,
    tick_path: PathBuf,
    tx: mpsc::Sender<Record>,
}

impl FileActivityLog {
    /// Opens (creating if needed) both channel files and starts the writer task.
    ///
    /// # Errors
    /// Returns the I/O error if either file cannot be opened for appending.
    pub async fn open(trade_path: impl AsRef<Path>, tick_path: impl AsRef<Path>) -> io::Result<Self> {
        let trade_path = trade_path.as_ref().to_path_buf();
        let tick_path = tick_path.as_ref().to_path_buf();
        let trade = open_append(&trade_path).await?;
        let tick = open_append(&tick_path).await?;

        let (tx, rx) = mpsc::channel(WRITE_BACKLOG);
        tokio::spawn(write_records(trade, tick, rx));

        Ok(Self {
            trade_path,
            tick_path,
            tx,
        })
    }

    #[must_use]
    pub fn path(&self, channel: LogChannel) -> &Path {
        match channel {
            LogChannel::Trade => &self.trade_path,
            LogChannel::Tick => &self.tick_path,
        }
    }

    /// Waits until every record queued so far is on disk.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Record::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

impl ActivityLog for FileActivityLog {
    fn append(&self, channel: LogChannel, message: &str) -> io::Result<()> {
        tracing::debug!(channel = channel.as_str(), "{message}");

        self.tx
            .try_send(Record::Line(channel, format_line(message)))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    io::Error::new(io::ErrorKind::WouldBlock, "activity log backlog full")
                }
                mpsc::error::TrySendError::Closed(_) => {
                    io::Error::new(io::ErrorKind::BrokenPipe, "activity log writer stopped")
                }
            })
    }
}

async fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path).await
}

async fn write_records(mut trade: File, mut tick: File, mut rx: mpsc::Receiver<Record>) {
    while let Some(record) = rx.recv().await {
        match record {
            Record::Line(channel, line) => {
                let file = match channel {
                    LogChannel::Trade => &mut trade,
                    LogChannel::Tick => &mut tick,
                };
                // One write per line so a record is never split.
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    tracing::error!(channel = channel.as_str(), error = %e, "Failed to write activity log");
                }
            }
            Record::Flush(ack) => {
                flush_both(&mut trade, &mut tick).await;
                let _ = ack.send(());
            }
        }
        if rx.is_empty() {
            flush_both(&mut trade, &mut tick).await;
        }
    }
    flush_both(&mut trade, &mut tick).await;
}

async fn flush_both(trade: &mut File, tick: &mut File) {
    for file in [trade, tick] {
        if let Err(e) = file.flush().await {
            tracing::error!(error = %e, "Failed to flush activity log");
        }
    }
}

/// Keeps records in memory; used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryActivityLog {
    records: Mutex<Vec<(LogChannel, String)>>,
    failing: AtomicBool,
}

impl MemoryActivityLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent append fail, to exercise error paths.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Messages written to a channel, oldest first.
    #[must_use]
    pub fn lines(&self, channel: LogChannel) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, message)| message.clone())
            .collect()
    }

    #[must_use]
    pub fn count_containing(&self, channel: LogChannel, needle: &str) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|(c, message)| *c == channel && message.contains(needle))
            .count()
    }
}

impl ActivityLog for MemoryActivityLog {
    fn append(&self, channel: LogChannel, message: &str) -> io::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "activity log unavailable"));
        }
        tracing::debug!(channel = channel.as_str(), "{message}");
        self.records.lock().push((channel, message.to_string()));
        Ok(())
    }
}
