use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::StreamError;
use crate::types::Tick;

/// Event pushed by a tick stream to its single consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Socket (re)established; subscriptions must be (re)issued.
    Connected,
    /// Socket lost. Subscriptions are gone until the next `Connected`.
    Disconnected { reason: String },
    /// The stream is about to retry after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    Error(StreamError),
    /// One frame worth of ticks, in delivery order.
    Ticks(Vec<Tick>),
}

/// Quote depth requested for subscribed tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    Ltp,
    Quote,
    Full,
}

impl StreamMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ltp => "ltp",
            Self::Quote => "quote",
            Self::Full => "full",
        }
    }
}

/// Instruction sent from the consumer to its tick stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamCommand {
    Subscribe(Vec<u32>),
    Unsubscribe(Vec<u32>),
    SetMode(StreamMode, Vec<u32>),
    /// Close the socket and stop reconnecting.
    Close,
}
