//! Render targets a session writes to: log panel, progress bar, status indicator.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::event::LogEvent;
use crate::outcome::Outcome;
use crate::progress::DisplayedProgress;

/// Receives every non-blank event in arrival order.
pub trait LogSink: Send + Sync {
    fn append(&self, event: &LogEvent);

    /// Drops everything rendered so far.
    fn clear(&self) {}
}

/// Receives the progress bar state whenever it changes.
pub trait ProgressSink: Send + Sync {
    fn render(&self, progress: DisplayedProgress);
}

/// Receives status indicator transitions.
pub trait StatusSink: Send + Sync {
    fn set_status(&self, status: StatusKind);
}

/// The five states a status indicator can show.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Connected,
    Disconnected,
    Error,
    Complete,
    Warning,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::Complete => "complete",
            Self::Warning => "warning",
        }
    }

    /// Display label for the indicator.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connected => "Connecté",
            Self::Disconnected => "Déconnecté",
            Self::Error => "Erreur",
            Self::Complete => "Terminé",
            Self::Warning => "Terminé avec avertissements",
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            Self::Connected => "status-connected",
            Self::Disconnected => "status-disconnected",
            Self::Error => "status-error",
            Self::Complete => "status-complete",
            Self::Warning => "status-warning",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Outcome> for StatusKind {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => Self::Complete,
            Outcome::PartialSuccess => Self::Warning,
            Outcome::Failure => Self::Error,
        }
    }
}

/// Sinks handed to `StreamSession::init`. The log sink is mandatory.
#[derive(Clone, Default)]
pub struct SessionSinks {
    pub log: Option<Arc<dyn LogSink>>,
    pub progress: Option<Arc<dyn ProgressSink>>,
    pub status: Option<Arc<dyn StatusSink>>,
}

impl SessionSinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log = Some(sink);
        self
    }

    pub fn progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn status(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status = Some(sink);
        self
    }

    /// Uses one value for all three targets.
    pub fn all<S>(sink: Arc<S>) -> Self
    where
        S: LogSink + ProgressSink + StatusSink + 'static,
    {
        Self {
            log: Some(sink.clone()),
            progress: Some(sink.clone()),
            status: Some(sink),
        }
    }
}

/// In-memory sink recording everything a session renders.
///
/// Useful for embedding the session behind another UI layer that polls.
#[derive(Default)]
pub struct MemorySink {
    inner: Mutex<MemorySinkState>,
}

#[derive(Default)]
struct MemorySinkState {
    lines: Vec<LogEvent>,
    progress: Vec<DisplayedProgress>,
    statuses: Vec<StatusKind>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemorySinkState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Events currently shown in the log panel.
    pub fn lines(&self) -> Vec<LogEvent> {
        self.state().lines.clone()
    }

    /// Text of the events currently shown, in order.
    pub fn texts(&self) -> Vec<String> {
        self.state().lines.iter().map(|e| e.text.clone()).collect()
    }

    /// Every progress state rendered, in order.
    pub fn progress_history(&self) -> Vec<DisplayedProgress> {
        self.state().progress.clone()
    }

    /// Every percentage rendered, in order.
    pub fn percentages(&self) -> Vec<u8> {
        self.state().progress.iter().map(|p| p.percent).collect()
    }

    /// Every status set, in order.
    pub fn statuses(&self) -> Vec<StatusKind> {
        self.state().statuses.clone()
    }

    pub fn last_status(&self) -> Option<StatusKind> {
        self.state().statuses.last().copied()
    }
}

impl LogSink for MemorySink {
    fn append(&self, event: &LogEvent) {
        self.state().lines.push(event.clone());
    }

    fn clear(&self) {
        self.state().lines.clear();
    }
}

impl ProgressSink for MemorySink {
    fn render(&self, progress: DisplayedProgress) {
        self.state().progress.push(progress);
    }
}

impl StatusSink for MemorySink {
    fn set_status(&self, status: StatusKind) {
        self.state().statuses.push(status);
    }
}
