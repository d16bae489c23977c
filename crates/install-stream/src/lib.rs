//! Live progress streaming for component install and uninstall operations.
//!
//! An [`Orchestrator`] asks the installer API to start an operation, then
//! follows it through a [`StreamSession`]: every event from the server's
//! one-way channel is rendered to the log sink, mapped to a monotonic
//! progress percentage and checked for a terminal condition. When the
//! operation finishes, the session computes an [`Outcome`] and hands it back.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use install_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), OrchestratorError> {
//! let orchestrator = Orchestrator::http(StreamConfig::new("http://erp.local:8080"))?;
//! let sink = Arc::new(MemorySink::new());
//!
//! let report = orchestrator
//!     .run(
//!         OperationRequest::install("erp.crm", "2.1.0"),
//!         SessionSinks::all(sink.clone()),
//!     )
//!     .await?;
//!
//! println!("{:?} after {} events", report.outcome, report.history.len());
//! # Ok(())
//! # }
//! ```

/// HTTP client for the installer's start endpoints.
pub mod api;
/// Event channel contract and the SSE implementation.
pub mod channel;
/// Keyword table mapping log text to progress percentages.
pub mod classifier;
/// Explicit configuration passed to orchestrators and sessions.
pub mod config;
/// Public error types.
pub mod errors;
/// Log events and payload normalisation.
pub mod event;
/// Tracing subscriber setup.
pub mod observability;
/// Operation requests and the start-then-follow flow.
pub mod orchestrator;
/// Outcome evaluation over an event history.
pub mod outcome;
/// Common imports.
pub mod prelude;
/// Monotonic progress gate.
pub mod progress;
/// Streaming session handle and lifecycle.
pub mod session;
/// Render targets for logs, progress and status.
pub mod sink;

pub use api::HttpInstallerApi;
pub use channel::{ChannelSignal, ChannelStream, EventChannel, SseEventChannel};
pub use classifier::{PROGRESS_INDICATORS, ProgressIndicator, classify};
pub use config::{Endpoints, ReconnectPolicy, StreamConfig};
pub use errors::{ChannelError, EventError, OrchestratorError, SessionError};
pub use event::{EventOrigin, LogEvent, LogLevel, normalize_event, parse_event};
pub use observability::init_observability;
pub use orchestrator::{
    InstallerApi, OperationMode, OperationReport, OperationRequest, OperationTicket,
    Orchestrator, OutcomeSink,
};
pub use outcome::{Evaluation, Outcome, evaluate};
pub use progress::{DisplayedProgress, ProgressColor, ProgressGate};
pub use session::{SessionCompletion, SessionSnapshot, SessionState, StreamSession};
pub use sink::{LogSink, MemorySink, ProgressSink, SessionSinks, StatusKind, StatusSink};
