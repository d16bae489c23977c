//! Streaming session: one operation's event channel, log, progress and outcome.
//!
//! `StreamSession` is a cheap handle. The state lives in a spawned task that
//! processes commands and channel signals strictly one at a time, so sinks
//! and the completion callback are never invoked concurrently.
mod actor;
mod machine;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument as _;

use crate::channel::EventChannel;
use crate::config::StreamConfig;
use crate::errors::SessionError;
use crate::event::LogEvent;
use crate::outcome::Outcome;
use crate::progress::DisplayedProgress;
use crate::sink::SessionSinks;

use self::actor::{Command, SessionActor};
use self::machine::SessionMachine;

/// Lifecycle of a streaming session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created or reset, no channel yet.
    Idle,
    Connecting,
    Connected,
    /// The channel reported a fault; the session may reconnect.
    Error,
    /// Torn down without an outcome.
    Disconnected,
    /// Finalised; the outcome has been delivered.
    Complete,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
            Self::Disconnected => "disconnected",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivered once, at finalisation.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionCompletion {
    pub operation_id: String,
    pub outcome: Outcome,
    /// Remote events in arrival order.
    pub history: Vec<LogEvent>,
}

impl SessionCompletion {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Point-in-time view of a session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: uuid::Uuid,
    pub operation_id: String,
    pub state: SessionState,
    pub progress: DisplayedProgress,
    /// Remote events received.
    pub history_len: usize,
    /// Everything shown in the log, local notices included.
    pub log_len: usize,
    pub finalized: bool,
}

pub(crate) type CompletionCallback = Box<dyn FnOnce(SessionCompletion) + Send + 'static>;

/// Handle to a running session task.
///
/// Clones share the same session. The task stops once every handle is dropped.
#[derive(Clone)]
pub struct StreamSession {
    session_id: uuid::Uuid,
    commands: mpsc::Sender<Command>,
}

impl StreamSession {
    /// Binds a session to an operation id and its sinks and starts its task.
    ///
    /// Fails with `SessionError::Configuration` when no log sink is given or
    /// the mailbox capacity is zero. Must be called inside a tokio runtime.
    pub fn init(
        operation_id: impl Into<String>,
        sinks: SessionSinks,
        channel: Arc<dyn EventChannel>,
        config: &StreamConfig,
    ) -> Result<Self, SessionError> {
        if config.event_buffer_capacity == 0 {
            return Err(SessionError::Configuration(
                "event_buffer_capacity must be greater than 0".into(),
            ));
        }
        let operation_id = operation_id.into();
        let session_id = uuid::Uuid::new_v4();
        let machine = SessionMachine::new(session_id, operation_id.clone(), sinks)?;

        let (tx, rx) = mpsc::channel(config.event_buffer_capacity);
        let actor = SessionActor::new(machine, channel, config.clone());
        let span = tracing::info_span!("stream_session", %session_id, %operation_id);
        tokio::spawn(actor.run(rx).instrument(span));

        Ok(Self {
            session_id,
            commands: tx,
        })
    }

    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Opens the event channel and returns once it is open or has failed.
    ///
    /// A refused channel (non-success status) is returned as
    /// `SessionError::Channel`. Network failures are recorded in the log,
    /// leave the session in `Error` and are retried per the reconnect policy.
    /// Reconnecting an open session closes the previous channel first.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Connect { reply }).await?
    }

    /// Closes the channel. A no-op when already disconnected.
    ///
    /// A session that has not finalised drops its completion callback.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Disconnects, clears the log, zeroes the progress bar and returns to `Idle`.
    pub async fn reset(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Reset { reply }).await
    }

    /// Evaluates the history and delivers the outcome.
    ///
    /// Returns `None` when the session already finalised or was disconnected.
    pub async fn finalize(&self) -> Result<Option<Outcome>, SessionError> {
        self.request(|reply| Command::Finalize { reply }).await
    }

    pub async fn clear_logs(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::ClearLogs { reply }).await
    }

    /// Points an idle session at another operation id.
    pub async fn retarget(&self, operation_id: impl Into<String>) -> Result<(), SessionError> {
        let operation_id = operation_id.into();
        self.request(|reply| Command::Retarget {
            operation_id,
            reply,
        })
        .await?
    }

    /// Registers the completion callback, replacing any previous one.
    pub async fn on_complete<F>(&self, callback: F) -> Result<(), SessionError>
    where
        F: FnOnce(SessionCompletion) + Send + 'static,
    {
        let callback: CompletionCallback = Box::new(callback);
        self.request(|reply| Command::OnComplete { callback, reply })
            .await
    }

    /// Registers a completion callback that forwards into the returned receiver.
    ///
    /// The receiver errors if the session is disconnected or reset first.
    pub async fn completion(&self) -> Result<oneshot::Receiver<SessionCompletion>, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.on_complete(move |completion| {
            let _ = tx.send(completion);
        })
        .await?;
        Ok(rx)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelStream, SseEventChannel};
    use crate::errors::ChannelError;
    use crate::sink::MemorySink;

    struct RefusingChannel;

    #[async_trait::async_trait]
    impl EventChannel for RefusingChannel {
        async fn open(&self, _operation_id: &str) -> Result<ChannelStream, ChannelError> {
            Err(ChannelError::rejected(404, "unknown operation"))
        }
    }

    #[test]
    fn state_names_are_lowercase() {
        assert_eq!(SessionState::Complete.to_string(), "complete");
        assert_eq!(
            serde_json::to_string(&SessionState::Disconnected).expect("json"),
            "\"disconnected\""
        );
    }

    #[tokio::test]
    async fn zero_capacity_is_rejected() {
        let sink = Arc::new(MemorySink::new());
        let channel = Arc::new(SseEventChannel::new(StreamConfig::default()).expect("channel"));
        let config = StreamConfig::default().event_buffer_capacity(0);
        let err = StreamSession::init("op", SessionSinks::all(sink), channel, &config)
            .expect_err("zero capacity");
        assert!(matches!(err, SessionError::Configuration(_)));
    }

    #[tokio::test]
    async fn missing_log_sink_is_rejected() {
        let err = StreamSession::init(
            "op",
            SessionSinks::new(),
            Arc::new(RefusingChannel),
            &StreamConfig::default(),
        )
        .expect_err("no log sink");
        assert!(matches!(err, SessionError::Configuration(_)));
    }

    #[tokio::test]
    async fn refused_channel_surfaces_as_error() {
        let sink = Arc::new(MemorySink::new());
        let session = StreamSession::init(
            "missing",
            SessionSinks::all(sink.clone()),
            Arc::new(RefusingChannel),
            &StreamConfig::default(),
        )
        .expect("init");

        let err = session.connect().await.expect_err("refused");
        assert_eq!(
            err,
            SessionError::Channel(ChannelError::rejected(404, "unknown operation"))
        );
        let snapshot = session.snapshot().await.expect("snapshot");
        assert_eq!(snapshot.state, SessionState::Error);
        assert_eq!(snapshot.operation_id, "missing");
        assert_eq!(session.session_id(), snapshot.session_id);
    }
}
