use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

use crate::config::StreamConfig;
use crate::errors::ChannelError;

use super::sse::{SseDecoder, SseFrame};
use super::{ChannelSignal, ChannelStream, EventChannel};

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// Event channel backed by the installer's `text/event-stream` endpoint.
pub struct SseEventChannel {
    client: reqwest::Client,
    config: StreamConfig,
}

impl SseEventChannel {
    /// Builds the HTTP client. Connecting and waiting for the response head
    /// are bounded by `request_timeout`; the stream itself stays open for as
    /// long as the server keeps it.
    pub fn new(config: StreamConfig) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| ChannelError::transport(format!("failed to build stream client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait::async_trait]
impl EventChannel for SseEventChannel {
    async fn open(&self, operation_id: &str) -> Result<ChannelStream, ChannelError> {
        let url = self.config.stream_url(operation_id);
        debug!(operation_id, %url, "opening installer event stream");

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(api_key) = &self.config.api_key {
            request = request.header("X-Api-Key", api_key);
        }

        let response = tokio::time::timeout(self.config.request_timeout, request.send())
            .await
            .map_err(|_| {
                ChannelError::transport(format!(
                    "stream did not answer within {} ms",
                    self.config.request_timeout.as_millis()
                ))
            })?
            .map_err(|e| ChannelError::transport(format!("stream request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ChannelError::rejected(status.as_u16(), body));
        }

        let bytes_stream: ByteStream = Box::pin(response.bytes_stream());
        Ok(Box::pin(signal_stream(bytes_stream)))
    }
}

fn signal_stream(bytes_stream: ByteStream) -> impl futures::Stream<Item = ChannelSignal> + Send {
    struct State {
        bytes_stream: ByteStream,
        decoder: SseDecoder,
        pending: VecDeque<ChannelSignal>,
        done: bool,
    }

    stream::unfold(
        State {
            bytes_stream,
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(signal) = state.pending.pop_front() {
                    return Some((signal, state));
                }
                if state.done {
                    return None;
                }

                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        let frames = state.decoder.push_chunk(&chunk);
                        state.pending.extend(frames.into_iter().filter_map(frame_signal));
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        state
                            .pending
                            .push_back(ChannelSignal::Error(format!("stream read failed: {e}")));
                    }
                    None => {
                        state.done = true;
                        if let Some(signal) = state.decoder.finish().and_then(frame_signal) {
                            state.pending.push_back(signal);
                        }
                    }
                }
            }
        },
    )
}

/// Frames with blank data carry nothing to show; `event: error` frames are
/// faults reported in-band by the server.
fn frame_signal(frame: SseFrame) -> Option<ChannelSignal> {
    if frame.data.trim().is_empty() {
        return None;
    }
    match frame.event.as_deref() {
        Some("error") => Some(ChannelSignal::Error(frame.data)),
        _ => Some(ChannelSignal::Message(frame.data)),
    }
}
