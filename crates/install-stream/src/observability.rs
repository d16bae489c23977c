use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_FILTER: &str = "info";
const DEFAULT_JSON_FILE: &str = "install-stream.logs.jsonl";

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn tracing_enabled() -> bool {
    ["INSTALL_STREAM_OBSERVABILITY_ENABLED", "INSTALL_STREAM_OBSERVABILITY"]
        .into_iter()
        .find_map(|key| std::env::var(key).ok())
        .map(|value| parse_switch(&value).unwrap_or(true))
        .unwrap_or(true)
}

/// First directive that parses, in override order.
fn filter_directive(log_level: Option<String>, rust_log: Option<String>) -> String {
    [log_level, rust_log]
        .into_iter()
        .flatten()
        .find(|directive| tracing_subscriber::EnvFilter::try_new(directive).is_ok())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    let directive = filter_directive(
        std::env::var("INSTALL_STREAM_LOG_LEVEL").ok(),
        std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV).ok(),
    );
    tracing_subscriber::EnvFilter::new(directive)
}

fn json_target(raw: &str) -> (PathBuf, String) {
    let path = Path::new(raw);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_JSON_FILE)
        .to_string();
    (dir, file_name)
}

/// Installs the process-wide tracing subscriber. Later calls do nothing.
///
/// Environment variables:
/// - `INSTALL_STREAM_OBSERVABILITY_ENABLED` / `INSTALL_STREAM_OBSERVABILITY`: on/off switch (default on).
/// - `INSTALL_STREAM_LOG_LEVEL`: filter override (`info`, `install_stream=debug`, ...).
/// - `RUST_LOG`: used when the above is unset. Falls back to `info`.
/// - `INSTALL_STREAM_JSON_LOG_PATH`: write JSONL to this file instead of the
///   compact console format on stderr. Stdout stays free for operation output.
pub fn init_observability() {
    INIT.get_or_init(|| {
        if !tracing_enabled() {
            return;
        }

        let filter = env_filter();
        if let Ok(raw) = std::env::var("INSTALL_STREAM_JSON_LOG_PATH") {
            let (dir, file_name) = json_target(&raw);
            let _ = std::fs::create_dir_all(&dir);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .try_init();
        }
    });
}
