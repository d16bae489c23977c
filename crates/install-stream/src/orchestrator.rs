use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::HttpInstallerApi;
use crate::channel::{EventChannel, SseEventChannel};
use crate::config::StreamConfig;
use crate::errors::OrchestratorError;
use crate::event::LogEvent;
use crate::outcome::Outcome;
use crate::session::StreamSession;
use crate::sink::SessionSinks;

/// Which server-side operation to start.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Install,
    Uninstall,
}

impl OperationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub component_id: String,
    pub version: String,
    pub mode: OperationMode,
}

impl OperationRequest {
    pub fn new(
        component_id: impl Into<String>,
        version: impl Into<String>,
        mode: OperationMode,
    ) -> Self {
        Self {
            component_id: component_id.into(),
            version: version.into(),
            mode,
        }
    }

    pub fn install(component_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(component_id, version, OperationMode::Install)
    }

    pub fn uninstall(component_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(component_id, version, OperationMode::Uninstall)
    }

    fn validate(&self) -> Result<(), OrchestratorError> {
        if self.component_id.trim().is_empty() {
            return Err(OrchestratorError::Validation(
                "component id must not be empty".into(),
            ));
        }
        if self.version.trim().is_empty() {
            return Err(OrchestratorError::Validation(
                "version must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Accepted start request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationTicket {
    pub operation_id: String,
}

/// The installer API that starts operations.
#[async_trait::async_trait]
pub trait InstallerApi: Send + Sync {
    /// Starts the operation and returns its id.
    ///
    /// Must fail with `RequestRejected` on an HTTP-level refusal and with
    /// `Transport` on network failure or timeout.
    async fn start(&self, request: &OperationRequest) -> Result<OperationTicket, OrchestratorError>;
}

/// Everything known about one finished operation.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationReport {
    pub operation_id: String,
    pub request: OperationRequest,
    pub outcome: Outcome,
    /// Remote events in arrival order.
    pub history: Vec<LogEvent>,
}

/// Receives one report per completed operation.
pub trait OutcomeSink: Send + Sync {
    fn report(&self, report: &OperationReport);
}

/// Starts install/uninstall operations and follows them to an outcome.
#[derive(Clone)]
pub struct Orchestrator {
    api: Arc<dyn InstallerApi>,
    channel: Arc<dyn EventChannel>,
    config: StreamConfig,
    outcome_sink: Option<Arc<dyn OutcomeSink>>,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn InstallerApi>,
        channel: Arc<dyn EventChannel>,
        config: StreamConfig,
    ) -> Self {
        Self {
            api,
            channel,
            config,
            outcome_sink: None,
        }
    }

    /// Wires the HTTP installer API and SSE channel from `config`.
    pub fn http(config: StreamConfig) -> Result<Self, OrchestratorError> {
        let api = HttpInstallerApi::new(config.clone())?;
        let channel = SseEventChannel::new(config.clone())
            .map_err(|e| OrchestratorError::transport(e.to_string()))?;
        Ok(Self::new(Arc::new(api), Arc::new(channel), config))
    }

    pub fn with_outcome_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.outcome_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Starts the operation, streams it into `sinks` and waits for the outcome.
    ///
    /// A rejected or failed start request returns before any session exists.
    pub async fn run(
        &self,
        request: OperationRequest,
        sinks: SessionSinks,
    ) -> Result<OperationReport, OrchestratorError> {
        request.validate()?;
        let ticket = self.start(&request).await?;
        let session = StreamSession::init(
            ticket.operation_id.clone(),
            sinks,
            self.channel.clone(),
            &self.config,
        )?;
        self.follow(&session, request, ticket.operation_id).await
    }

    /// Like [`Orchestrator::run`], but reuses `session` after resetting it.
    pub async fn run_on(
        &self,
        session: &StreamSession,
        request: OperationRequest,
    ) -> Result<OperationReport, OrchestratorError> {
        request.validate()?;
        let ticket = self.start(&request).await?;
        session.reset().await?;
        session.retarget(ticket.operation_id.clone()).await?;
        self.follow(session, request, ticket.operation_id).await
    }

    async fn start(&self, request: &OperationRequest) -> Result<OperationTicket, OrchestratorError> {
        let ticket = self.api.start(request).await.inspect_err(|err| {
            warn!(component_id = %request.component_id, mode = %request.mode, error = %err, "start request failed");
        })?;
        info!(
            component_id = %request.component_id,
            version = %request.version,
            mode = %request.mode,
            operation_id = %ticket.operation_id,
            "operation started"
        );
        Ok(ticket)
    }

    async fn follow(
        &self,
        session: &StreamSession,
        request: OperationRequest,
        operation_id: String,
    ) -> Result<OperationReport, OrchestratorError> {
        let completion = session.completion().await?;
        if let Err(err) = session.connect().await {
            disconnect_quietly(session).await;
            return Err(err.into());
        }

        let completion = completion
            .await
            .map_err(|_| OrchestratorError::Abandoned {
                operation_id: operation_id.clone(),
            })?;
        let report = OperationReport {
            operation_id,
            request,
            outcome: completion.outcome,
            history: completion.history,
        };
        if let Some(sink) = &self.outcome_sink {
            sink.report(&report);
        }
        Ok(report)
    }
}

async fn disconnect_quietly(session: &StreamSession) {
    if let Err(err) = session.disconnect().await {
        warn!(session_id = %session.session_id(), error = %err, "failed to disconnect session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelSignal, ChannelStream};
    use crate::errors::{ChannelError, SessionError};
    use crate::sink::MemorySink;
    use futures::{StreamExt as _, stream};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeApi {
        result: Result<OperationTicket, OrchestratorError>,
        calls: AtomicUsize,
    }

    impl FakeApi {
        fn accepting(operation_id: &str) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(OperationTicket {
                    operation_id: operation_id.into(),
                }),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(err: OrchestratorError) -> Arc<Self> {
            Arc::new(Self {
                result: Err(err),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl InstallerApi for FakeApi {
        async fn start(&self, _request: &OperationRequest) -> Result<OperationTicket, OrchestratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    /// Replays a fixed list of payloads per open, recording the operation ids.
    struct ReplayChannel {
        payloads: Vec<&'static str>,
        opened: Mutex<Vec<String>>,
    }

    impl ReplayChannel {
        fn new(payloads: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                payloads,
                opened: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl EventChannel for ReplayChannel {
        async fn open(&self, operation_id: &str) -> Result<ChannelStream, ChannelError> {
            self.opened.lock().unwrap().push(operation_id.to_string());
            let signals: Vec<_> = self
                .payloads
                .iter()
                .map(|p| ChannelSignal::Message((*p).to_string()))
                .collect();
            Ok(Box::pin(stream::iter(signals).chain(stream::pending())))
        }
    }

    #[derive(Default)]
    struct RecordingOutcomes {
        reports: Mutex<Vec<OperationReport>>,
    }

    impl OutcomeSink for RecordingOutcomes {
        fn report(&self, report: &OperationReport) {
            self.reports.lock().unwrap().push(report.clone());
        }
    }

    const SUCCESSFUL_INSTALL: [&str; 4] = [
        r#"{"Text":"Téléchargement en cours","Level":"info"}"#,
        r#"{"Text":"Extraction réussie","Level":"info"}"#,
        r#"{"Text":"Installation des fichiers en cours","Level":"info"}"#,
        r#"{"Text":"Installation terminée avec succès","Level":"success"}"#,
    ];

    #[tokio::test]
    async fn run_returns_success_report_and_notifies_sink() {
        let api = FakeApi::accepting("install-1");
        let channel = ReplayChannel::new(SUCCESSFUL_INSTALL.to_vec());
        let outcomes = Arc::new(RecordingOutcomes::default());
        let orchestrator = Orchestrator::new(api.clone(), channel.clone(), StreamConfig::default())
            .with_outcome_sink(outcomes.clone());
        let sink = Arc::new(MemorySink::new());

        let report = orchestrator
            .run(
                OperationRequest::install("erp.crm", "2.1.0"),
                SessionSinks::all(sink.clone()),
            )
            .await
            .expect("run");

        assert_eq!(report.outcome, Outcome::Success);
        assert_eq!(report.operation_id, "install-1");
        assert_eq!(report.history.len(), 4);
        assert_eq!(sink.percentages(), vec![20, 30, 50, 100]);
        assert_eq!(*channel.opened.lock().unwrap(), vec!["install-1".to_string()]);
        assert_eq!(outcomes.reports.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejection_never_creates_a_session() {
        let api = FakeApi::failing(OrchestratorError::rejected(409, "already installing"));
        let channel = ReplayChannel::new(Vec::new());
        let orchestrator = Orchestrator::new(api, channel.clone(), StreamConfig::default());

        let err = orchestrator
            .run(
                OperationRequest::uninstall("erp.crm", "2.1.0"),
                SessionSinks::all(Arc::new(MemorySink::new())),
            )
            .await
            .expect_err("rejected");

        assert_eq!(err, OrchestratorError::rejected(409, "already installing"));
        assert!(channel.opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_component_is_rejected_before_any_request() {
        let api = FakeApi::accepting("install-1");
        let orchestrator = Orchestrator::new(
            api.clone(),
            ReplayChannel::new(Vec::new()),
            StreamConfig::default(),
        );
        let err = orchestrator
            .run(
                OperationRequest::install("  ", "1.0.0"),
                SessionSinks::all(Arc::new(MemorySink::new())),
            )
            .await
            .expect_err("validation");
        assert!(matches!(err, OrchestratorError::Validation(_)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_log_sink_surfaces_as_session_error() {
        let orchestrator = Orchestrator::new(
            FakeApi::accepting("install-1"),
            ReplayChannel::new(Vec::new()),
            StreamConfig::default(),
        );
        let err = orchestrator
            .run(OperationRequest::install("erp.crm", "1.0.0"), SessionSinks::new())
            .await
            .expect_err("no log sink");
        assert!(matches!(
            err,
            OrchestratorError::Session(SessionError::Configuration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_is_reported_as_abandoned() {
        let orchestrator = Orchestrator::new(
            FakeApi::accepting("install-9"),
            ReplayChannel::new(vec![r#"{"Text":"Téléchargement en cours"}"#]),
            StreamConfig::default().idle_timeout(std::time::Duration::from_secs(5)),
        );
        let err = orchestrator
            .run(
                OperationRequest::install("erp.crm", "1.0.0"),
                SessionSinks::all(Arc::new(MemorySink::new())),
            )
            .await
            .expect_err("abandoned");
        assert_eq!(
            err,
            OrchestratorError::Abandoned {
                operation_id: "install-9".into()
            }
        );
    }

    #[tokio::test]
    async fn run_on_reuses_session_for_next_operation() {
        let channel = ReplayChannel::new(SUCCESSFUL_INSTALL.to_vec());
        let orchestrator = Orchestrator::new(
            FakeApi::accepting("install-2"),
            channel.clone(),
            StreamConfig::default(),
        );
        let sink = Arc::new(MemorySink::new());
        let session = StreamSession::init(
            "install-1",
            SessionSinks::all(sink.clone()),
            channel.clone(),
            orchestrator.config(),
        )
        .expect("session");
        session.connect().await.expect("connect");

        let report = orchestrator
            .run_on(&session, OperationRequest::install("erp.crm", "2.2.0"))
            .await
            .expect("run_on");

        assert_eq!(report.operation_id, "install-2");
        assert_eq!(report.history.len(), 4);
        assert_eq!(
            *channel.opened.lock().unwrap(),
            vec!["install-1".to_string(), "install-2".to_string()]
        );
        let snapshot = session.snapshot().await.expect("snapshot");
        assert_eq!(snapshot.operation_id, "install-2");
        assert!(snapshot.finalized);
    }
}
