//! One-way, server-to-client event channel.
//!
//! A session only needs `open`; the returned stream yields raw event payloads
//! and in-band transport faults, and ends when the server closes it.
mod http;
pub(crate) mod sse;

use std::pin::Pin;

pub use http::SseEventChannel;

use crate::errors::ChannelError;

/// Signals produced by an open channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelSignal {
    /// Raw payload of one event (usually a JSON object).
    Message(String),
    /// The transport reported a fault; more signals may still follow.
    Error(String),
}

/// Stream of signals from one open channel. `None` means the server closed it.
pub type ChannelStream = Pin<Box<dyn futures::Stream<Item = ChannelSignal> + Send + 'static>>;

/// Opens event channels keyed by operation id.
#[async_trait::async_trait]
pub trait EventChannel: Send + Sync {
    /// Opens the channel. Returning `Ok` is the transport-level "open" signal.
    async fn open(&self, operation_id: &str) -> Result<ChannelStream, ChannelError>;
}
