use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::channel::{ChannelSignal, ChannelStream, EventChannel};
use crate::config::StreamConfig;
use crate::errors::SessionError;
use crate::outcome::Outcome;

use super::machine::SessionMachine;
use super::{CompletionCallback, SessionSnapshot, SessionState};

const STREAM_CLOSED_MESSAGE: &str = "le serveur a fermé le flux";

pub(super) enum Command {
    Connect {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Finalize {
        reply: oneshot::Sender<Option<Outcome>>,
    },
    ClearLogs {
        reply: oneshot::Sender<()>,
    },
    Retarget {
        operation_id: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    OnComplete {
        callback: CompletionCallback,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Task-side half of a session. Every mutation happens here, one command or
/// channel signal at a time.
pub(super) struct SessionActor {
    machine: SessionMachine,
    channel: Arc<dyn EventChannel>,
    config: StreamConfig,
    stream: Option<ChannelStream>,
    /// Set once a fault was reported for the current stream, so its end does
    /// not report a second one.
    fault_reported: bool,
    reconnect_attempts: u32,
    reconnect_at: Option<Instant>,
    teardown_at: Option<Instant>,
    idle_deadline: Option<Instant>,
}

impl SessionActor {
    pub(super) fn new(
        machine: SessionMachine,
        channel: Arc<dyn EventChannel>,
        config: StreamConfig,
    ) -> Self {
        Self {
            machine,
            channel,
            config,
            stream: None,
            fault_reported: false,
            reconnect_attempts: 0,
            reconnect_at: None,
            teardown_at: None,
            idle_deadline: None,
        }
    }

    pub(super) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                signal = next_signal(&mut self.stream) => self.handle_signal(signal),
                () = wait_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    let attempt = (self.reconnect_attempts, self.config.reconnect.max_reconnects);
                    if let Err(err) = self.open_channel(Some(attempt)).await {
                        warn!(error = %err, "reconnect refused by installer");
                    }
                }
                () = wait_until(self.teardown_at) => {
                    self.teardown_at = None;
                    debug!(operation_id = self.machine.operation_id(), "closing channel after completion");
                    self.close_channel();
                    self.machine.disconnect();
                }
                () = wait_until(self.idle_deadline) => {
                    self.close_channel();
                    self.machine.idle_timeout(self.config.idle_timeout);
                }
            }
        }
        debug!(operation_id = self.machine.operation_id(), "session task stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => {
                let result = match self.machine.state() {
                    state @ (SessionState::Complete | SessionState::Disconnected) => {
                        Err(SessionError::InvalidState {
                            operation: "connect",
                            state,
                        })
                    }
                    _ => {
                        self.reconnect_attempts = 0;
                        self.open_channel(None).await
                    }
                };
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                self.teardown_at = None;
                self.close_channel();
                self.machine.disconnect();
                let _ = reply.send(());
            }
            Command::Reset { reply } => {
                self.teardown_at = None;
                self.close_channel();
                self.reconnect_attempts = 0;
                self.machine.reset();
                let _ = reply.send(());
            }
            Command::Finalize { reply } => {
                let outcome = self.machine.finalize();
                if outcome.is_some() {
                    self.schedule_teardown();
                }
                let _ = reply.send(outcome);
            }
            Command::ClearLogs { reply } => {
                self.machine.clear_logs();
                let _ = reply.send(());
            }
            Command::Retarget {
                operation_id,
                reply,
            } => {
                let _ = reply.send(self.machine.retarget(operation_id));
            }
            Command::OnComplete { callback, reply } => {
                self.machine.set_completion(callback);
                let _ = reply.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.machine.snapshot());
            }
        }
    }

    fn handle_signal(&mut self, signal: Option<ChannelSignal>) {
        match signal {
            Some(ChannelSignal::Message(raw)) => {
                self.reconnect_attempts = 0;
                self.fault_reported = false;
                self.touch();
                if self.machine.receive(&raw).is_some() {
                    self.schedule_teardown();
                }
            }
            Some(ChannelSignal::Error(message)) => {
                self.fault_reported = true;
                self.touch();
                self.machine.transport_fault(&message);
            }
            None => {
                self.stream = None;
                if self.machine.is_finalized() {
                    debug!(operation_id = self.machine.operation_id(), "channel closed after completion");
                    return;
                }
                if !std::mem::take(&mut self.fault_reported) {
                    self.machine.transport_fault(STREAM_CLOSED_MESSAGE);
                }
                self.schedule_reconnect();
            }
        }
    }

    /// Opens a fresh channel, replacing any open one. `attempt` is `(n, max)`
    /// for reconnects.
    async fn open_channel(&mut self, attempt: Option<(u32, u32)>) -> Result<(), SessionError> {
        self.close_channel();
        self.machine.begin_connect(attempt);
        let operation_id = self.machine.operation_id().to_string();
        match self.channel.open(&operation_id).await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.fault_reported = false;
                self.machine.mark_open();
                self.touch();
                Ok(())
            }
            Err(err) => {
                // The idle deadline is the only timer left once a refusal
                // ends the reconnect chain.
                self.machine.transport_fault(&err.to_string());
                self.touch();
                if err.is_transient() {
                    self.schedule_reconnect();
                    Ok(())
                } else {
                    Err(SessionError::Channel(err))
                }
            }
        }
    }

    fn close_channel(&mut self) {
        if self.stream.take().is_some() {
            debug!(operation_id = self.machine.operation_id(), "event channel closed");
        }
        self.reconnect_at = None;
        self.idle_deadline = None;
    }

    fn schedule_reconnect(&mut self) {
        let policy = &self.config.reconnect;
        if !policy.allows(self.reconnect_attempts) {
            warn!(
                operation_id = self.machine.operation_id(),
                attempts = self.reconnect_attempts,
                "reconnect budget exhausted"
            );
            return;
        }
        let delay = policy.delay_for(self.reconnect_attempts);
        self.reconnect_attempts += 1;
        debug!(
            operation_id = self.machine.operation_id(),
            attempt = self.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        self.reconnect_at = Some(Instant::now() + delay);
    }

    fn schedule_teardown(&mut self) {
        self.reconnect_at = None;
        self.idle_deadline = None;
        self.teardown_at = Some(Instant::now() + self.config.finalize_delay);
    }

    fn touch(&mut self) {
        if !self.machine.is_finalized() {
            self.idle_deadline = Some(Instant::now() + self.config.idle_timeout);
        }
    }
}

async fn next_signal(stream: &mut Option<ChannelStream>) -> Option<ChannelSignal> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
