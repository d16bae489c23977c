use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::classify;
use crate::errors::SessionError;
use crate::event::{LogEvent, LogLevel, parse_event};
use crate::outcome::{Evaluation, Outcome};
use crate::progress::ProgressGate;
use crate::sink::{LogSink, ProgressSink, SessionSinks, StatusKind, StatusSink};

use super::{CompletionCallback, SessionCompletion, SessionSnapshot, SessionState};

/// Synchronous state of one session: history, progress gate, state and sinks.
///
/// Owned by the session task, which feeds it commands and channel signals one
/// at a time.
pub(crate) struct SessionMachine {
    session_id: Uuid,
    operation_id: String,
    log_sink: Arc<dyn LogSink>,
    progress_sink: Option<Arc<dyn ProgressSink>>,
    status_sink: Option<Arc<dyn StatusSink>>,
    state: SessionState,
    log: Vec<LogEvent>,
    gate: ProgressGate,
    on_complete: Option<CompletionCallback>,
    finalized: bool,
}

impl SessionMachine {
    pub(crate) fn new(
        session_id: Uuid,
        operation_id: String,
        sinks: SessionSinks,
    ) -> Result<Self, SessionError> {
        let Some(log_sink) = sinks.log else {
            return Err(SessionError::Configuration(
                "a log sink is required to stream installation logs".into(),
            ));
        };
        Ok(Self {
            session_id,
            operation_id,
            log_sink,
            progress_sink: sinks.progress,
            status_sink: sinks.status,
            state: SessionState::Idle,
            log: Vec::new(),
            gate: ProgressGate::new(),
            on_complete: None,
            finalized: false,
        })
    }

    pub(crate) fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            operation_id: self.operation_id.clone(),
            state: self.state,
            progress: self.gate.current(),
            history_len: self.remote_history().count(),
            log_len: self.log.len(),
            finalized: self.finalized,
        }
    }

    pub(crate) fn set_completion(&mut self, callback: CompletionCallback) {
        self.on_complete = Some(callback);
    }

    pub(crate) fn retarget(&mut self, operation_id: String) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState {
                operation: "retarget",
                state: self.state,
            });
        }
        debug!(session_id = %self.session_id, from = %self.operation_id, to = %operation_id, "retargeting session");
        self.operation_id = operation_id;
        Ok(())
    }

    /// `attempt` is `(n, max)` when reopening after a drop.
    pub(crate) fn begin_connect(&mut self, attempt: Option<(u32, u32)>) {
        self.state = SessionState::Connecting;
        let text = match attempt {
            None => format!("Connexion au flux d'installation {}...", self.operation_id),
            Some((n, max)) => format!("Reconnexion au flux d'installation (tentative {n}/{max})..."),
        };
        self.push_local(LogLevel::Info, text);
    }

    pub(crate) fn mark_open(&mut self) {
        info!(session_id = %self.session_id, operation_id = %self.operation_id, "event channel open");
        self.state = SessionState::Connected;
        self.push_local(LogLevel::Success, "Connecté au flux d'installation");
        self.set_status(StatusKind::Connected);
    }

    /// Handles one raw payload. Returns the outcome if it finalised the session.
    pub(crate) fn receive(&mut self, raw: &str) -> Option<Outcome> {
        match parse_event(raw) {
            Ok(event) => self.ingest(event),
            Err(err) => {
                debug!(session_id = %self.session_id, error = %err, "dropping event");
                None
            }
        }
    }

    /// Appends, renders and classifies one event, then checks for a terminal
    /// condition. Returns the outcome if this event finalised the session.
    pub(crate) fn ingest(&mut self, event: LogEvent) -> Option<Outcome> {
        if event.is_blank() {
            debug!(session_id = %self.session_id, "dropping blank event");
            return None;
        }
        let remote = event.is_remote();
        let hint = if remote { classify(&event.text) } else { None };
        let is_error = event.level == LogLevel::Error;
        self.append(event);

        if self.finalized || !remote {
            return None;
        }
        if let Some(percent) = hint
            && self.gate.update(percent, is_error)
        {
            self.render_progress();
        }
        if Evaluation::scan(self.remote_history()).is_terminal() {
            return self.finalize();
        }
        None
    }

    /// Records a channel fault. The channel is not closed here.
    pub(crate) fn transport_fault(&mut self, message: &str) {
        if self.finalized || self.state == SessionState::Disconnected {
            debug!(session_id = %self.session_id, %message, "ignoring transport fault on settled session");
            return;
        }
        warn!(session_id = %self.session_id, operation_id = %self.operation_id, %message, "event channel fault");
        self.push_local(
            LogLevel::Error,
            format!("Erreur de connexion au flux d'installation : {message}"),
        );
        self.state = SessionState::Error;
        if self.gate.flag_error() {
            self.render_progress();
        }
        self.set_status(StatusKind::Error);
    }

    /// Evaluates the history and hands the outcome to the completion callback.
    ///
    /// Runs once; later calls return `None`. A disconnected session never
    /// produces an outcome.
    pub(crate) fn finalize(&mut self) -> Option<Outcome> {
        if self.finalized || self.state == SessionState::Disconnected {
            return None;
        }
        let outcome = Evaluation::scan(self.remote_history()).outcome();
        self.finalized = true;
        if self.gate.update(100, outcome == Outcome::Failure) {
            self.render_progress();
        }
        self.state = SessionState::Complete;
        self.set_status(outcome.into());
        info!(session_id = %self.session_id, operation_id = %self.operation_id, ?outcome, "operation finished");

        if let Some(callback) = self.on_complete.take() {
            callback(SessionCompletion {
                operation_id: self.operation_id.clone(),
                outcome,
                history: self.remote_history().cloned().collect(),
            });
        }
        Some(outcome)
    }

    pub(crate) fn idle_timeout(&mut self, idle: Duration) {
        warn!(session_id = %self.session_id, idle_secs = idle.as_secs(), "event channel idle, abandoning session");
        self.push_local(
            LogLevel::Error,
            format!(
                "Aucun événement reçu depuis {}s, suivi de l'installation abandonné",
                idle.as_secs()
            ),
        );
        self.disconnect();
    }

    /// Marks the session disconnected. A completed session keeps its state
    /// and status; an unfinished one loses its completion callback.
    pub(crate) fn disconnect(&mut self) {
        match self.state {
            SessionState::Disconnected => {}
            SessionState::Complete => {
                debug!(session_id = %self.session_id, "channel released after completion");
            }
            _ => {
                if self.on_complete.take().is_some() {
                    debug!(session_id = %self.session_id, "session abandoned before completion");
                }
                self.state = SessionState::Disconnected;
                self.set_status(StatusKind::Disconnected);
            }
        }
    }

    /// Back to a fresh, idle session on the same operation id.
    pub(crate) fn reset(&mut self) {
        self.on_complete = None;
        self.finalized = false;
        self.clear_logs();
        self.gate.reset();
        self.render_progress();
        self.state = SessionState::Idle;
        self.set_status(StatusKind::Disconnected);
    }

    pub(crate) fn clear_logs(&mut self) {
        self.log.clear();
        self.log_sink.clear();
    }

    fn remote_history(&self) -> impl Iterator<Item = &LogEvent> {
        self.log.iter().filter(|event| event.is_remote())
    }

    fn push_local(&mut self, level: LogLevel, text: impl Into<String>) {
        self.append(LogEvent::local(level, text));
    }

    fn append(&mut self, event: LogEvent) {
        self.log_sink.append(&event);
        self.log.push(event);
    }

    fn render_progress(&self) {
        if let Some(sink) = &self.progress_sink {
            sink.render(self.gate.current());
        }
    }

    fn set_status(&self, status: StatusKind) {
        if let Some(sink) = &self.status_sink {
            sink.set_status(status);
        }
    }
}
