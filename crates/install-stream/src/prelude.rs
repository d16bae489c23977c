//! Common imports for driving an operation and rendering it.
pub use crate::{
    DisplayedProgress, LogEvent, LogLevel, LogSink, MemorySink, OperationMode, OperationReport,
    OperationRequest, Orchestrator, OrchestratorError, Outcome, ProgressSink, SessionError,
    SessionSinks, StatusKind, StatusSink, StreamConfig, StreamSession,
};
