use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::orchestrator::OperationMode;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
const OPERATION_ID_PLACEHOLDER: &str = "{operationId}";

/// How a session reopens its event channel after the server drops it before
/// the operation reached a terminal condition.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Reopen attempts allowed after the first connection.
    pub max_reconnects: u32,
    pub first_delay: Duration,
    /// Each further attempt waits `growth` times longer than the previous one.
    pub growth: f64,
    pub delay_cap: Duration,
}

const FIRST_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const RECONNECT_GROWTH: f64 = 2.0;
const RECONNECT_DELAY_CAP: Duration = Duration::from_secs(30);

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::exponential(3, FIRST_RECONNECT_DELAY, RECONNECT_GROWTH)
    }
}

impl ReconnectPolicy {
    /// Never reopens; a dropped channel leaves the session in error.
    pub const fn none() -> Self {
        Self {
            max_reconnects: 0,
            first_delay: FIRST_RECONNECT_DELAY,
            growth: RECONNECT_GROWTH,
            delay_cap: RECONNECT_DELAY_CAP,
        }
    }

    /// A zero `first_delay` or non-positive `growth` falls back to 1 s and 2.0.
    pub fn exponential(max_reconnects: u32, first_delay: Duration, growth: f64) -> Self {
        Self {
            max_reconnects,
            first_delay: if first_delay.is_zero() {
                FIRST_RECONNECT_DELAY
            } else {
                first_delay
            },
            growth: if growth > 0.0 { growth } else { RECONNECT_GROWTH },
            delay_cap: RECONNECT_DELAY_CAP,
        }
    }

    pub fn capped_at(mut self, delay_cap: Duration) -> Self {
        self.delay_cap = delay_cap;
        self
    }

    pub fn allows(&self, reconnects_done: u32) -> bool {
        reconnects_done < self.max_reconnects
    }

    /// Wait before reopen number `reconnects_done + 1`.
    pub fn delay_for(&self, reconnects_done: u32) -> Duration {
        if self.max_reconnects == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(reconnects_done).unwrap_or(i32::MAX);
        let secs = self.first_delay.as_secs_f64() * self.growth.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.delay_cap)
            .min(self.delay_cap)
    }
}

/// Installer API paths, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub install: String,
    pub uninstall: String,
    /// Stream path; `{operationId}` is replaced with the operation id.
    pub stream: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            install: "/api/installer/install".into(),
            uninstall: "/api/installer/uninstall".into(),
            stream: format!("/api/installer/stream/{OPERATION_ID_PLACEHOLDER}"),
        }
    }
}

/// Settings shared by the orchestrator, its HTTP adapters and every session.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Installer server root, e.g. `http://erp.local:8080`.
    pub base_url: String,
    /// Sent as `X-Api-Key` when present.
    pub api_key: Option<String>,
    /// Timeout for the operation-start request (and for opening the stream).
    pub request_timeout: Duration,
    /// A connected session with no signal for this long is abandoned.
    pub idle_timeout: Duration,
    /// Delay between finalisation and closing the channel.
    pub finalize_delay: Duration,
    pub reconnect: ReconnectPolicy,
    /// Mailbox size of each session task.
    pub event_buffer_capacity: usize,
    pub endpoints: Endpoints,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(5 * 60),
            finalize_delay: Duration::from_millis(2_000),
            reconnect: ReconnectPolicy::default(),
            event_buffer_capacity: 128,
            endpoints: Endpoints::default(),
        }
    }
}

impl StreamConfig {
    /// Creates a config with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Builds a config from defaults plus the `INSTALL_STREAM_*` variables.
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(base_url) = env_string("INSTALL_STREAM_BASE_URL") {
            config.base_url = base_url;
        }
        config.api_key = env_string("INSTALL_STREAM_API_KEY");
        if let Some(ms) = env_parse::<u64>("INSTALL_STREAM_REQUEST_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("INSTALL_STREAM_IDLE_TIMEOUT_SECS") {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("INSTALL_STREAM_FINALIZE_DELAY_MS") {
            config.finalize_delay = Duration::from_millis(ms);
        }
        if let Some(max) = env_parse::<u32>("INSTALL_STREAM_MAX_RECONNECTS") {
            config.reconnect.max_reconnects = max;
        }
        config
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into()).filter(|k: &String| !k.trim().is_empty());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn finalize_delay(mut self, delay: Duration) -> Self {
        self.finalize_delay = delay;
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn event_buffer_capacity(mut self, capacity: usize) -> Self {
        self.event_buffer_capacity = capacity;
        self
    }

    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub(crate) fn start_url(&self, mode: OperationMode) -> String {
        let path = match mode {
            OperationMode::Install => &self.endpoints.install,
            OperationMode::Uninstall => &self.endpoints.uninstall,
        };
        self.join(path)
    }

    pub(crate) fn stream_url(&self, operation_id: &str) -> String {
        self.join(
            &self
                .endpoints
                .stream
                .replace(OPERATION_ID_PLACEHOLDER, operation_id),
        )
    }

    fn join(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}
