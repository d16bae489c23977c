mod terminal;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use install_stream::{
    OperationRequest, Orchestrator, OrchestratorError, Outcome, SessionSinks, StreamConfig,
    init_observability,
};
use tracing::debug;

use crate::terminal::TerminalSink;

/// Start a component install or uninstall and follow its progress live.
#[derive(Parser, Debug)]
#[command(name = "install-stream")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Installer server root URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// API key sent as X-Api-Key
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Timeout for the start request, in milliseconds
    #[arg(long, global = true)]
    request_timeout_ms: Option<u64>,

    /// Abandon the operation after this many seconds without events
    #[arg(long, global = true)]
    idle_timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install a component version
    Install(Target),
    /// Uninstall a component version
    Uninstall(Target),
}

#[derive(Args, Debug)]
struct Target {
    /// Component identifier
    #[arg(long)]
    component: String,

    /// Component version
    #[arg(long)]
    version: String,
}

impl Cli {
    /// Environment-derived config with flags applied on top.
    fn config(&self, mut config: StreamConfig) -> StreamConfig {
        if let Some(base_url) = &self.base_url {
            config = config.base_url(base_url.clone());
        }
        if let Some(api_key) = &self.api_key {
            config = config.api_key(api_key.clone());
        }
        if let Some(ms) = self.request_timeout_ms {
            config = config.request_timeout(Duration::from_millis(ms));
        }
        if let Some(secs) = self.idle_timeout_secs {
            config = config.idle_timeout(Duration::from_secs(secs));
        }
        config
    }

    fn request(&self) -> OperationRequest {
        match &self.command {
            Command::Install(target) => {
                OperationRequest::install(target.component.clone(), target.version.clone())
            }
            Command::Uninstall(target) => {
                OperationRequest::uninstall(target.component.clone(), target.version.clone())
            }
        }
    }
}

fn exit_code(outcome: Outcome) -> ExitCode {
    match outcome {
        Outcome::Success => ExitCode::SUCCESS,
        Outcome::PartialSuccess => ExitCode::from(2),
        Outcome::Failure => ExitCode::FAILURE,
    }
}

async fn run(cli: Cli) -> Result<Outcome, OrchestratorError> {
    let config = cli.config(StreamConfig::from_env());
    debug!(base_url = %config.base_url, "using installer");
    let orchestrator = Orchestrator::http(config)?;
    let sink = Arc::new(TerminalSink::new());
    let report = orchestrator
        .run(cli.request(), SessionSinks::all(sink))
        .await?;
    println!(
        "{} {} {}: {:?} ({} events)",
        report.request.mode,
        report.request.component_id,
        report.request.version,
        report.outcome,
        report.history.len()
    );
    Ok(report.outcome)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_observability();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(outcome) => exit_code(outcome),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
