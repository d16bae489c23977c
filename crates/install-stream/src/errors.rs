use crate::session::SessionState;

/// Errors raised while opening or reading the one-way event channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The server refused to open the stream (non-success HTTP status).
    #[error("stream rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    /// Network or stream I/O failed.
    #[error("stream transport error: {0}")]
    Transport(String),
}

impl ChannelError {
    /// Creates a rejection error.
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Whether reopening the channel may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Reasons an inbound event is dropped at the channel boundary.
///
/// These never leave the session; they are traced at debug level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// Payload is not a JSON object.
    #[error("malformed event: {0}")]
    Malformed(String),
    /// Payload has no non-blank text field.
    #[error("event has no usable text")]
    Empty,
}

/// Errors returned by the public `StreamSession` handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The session was initialised with an unusable configuration.
    #[error("session configuration error: {0}")]
    Configuration(String),
    /// The requested operation is not allowed in the current state.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    /// The channel refused to open and will not be retried.
    #[error(transparent)]
    Channel(ChannelError),
    /// The session task has stopped.
    #[error("session task is no longer running")]
    Closed,
}

/// Errors returned by `Orchestrator::run`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    /// Invalid operation request (nothing was sent).
    #[error("validation error: {0}")]
    Validation(String),
    /// The installer API refused to start the operation.
    #[error("installer rejected request with status {status}: {message}")]
    RequestRejected { status: u16, message: String },
    /// The start request failed on the network or timed out.
    #[error("transport error: {0}")]
    Transport(String),
    /// The installer accepted the request but the response was unusable.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Streaming session setup failed.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// The session ended without producing an outcome.
    #[error("operation {operation_id} was abandoned before completion")]
    Abandoned { operation_id: String },
}

impl OrchestratorError {
    /// Creates a rejection error from an HTTP status and body.
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::RequestRejected {
            status,
            message: message.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}
