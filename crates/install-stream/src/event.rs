//! Canonical log event shape and the tolerant normalisation applied to
//! producer payloads at the channel boundary.

use std::fmt;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone as _};
use serde::{Deserialize, Serialize};

use crate::errors::EventError;

const TEXT_KEYS: [&str; 4] = ["Text", "text", "Message", "message"];
const LEVEL_KEYS: [&str; 2] = ["Level", "level"];
const TIMESTAMP_KEYS: [&str; 2] = ["Timestamp", "timestamp"];

/// Severity attached to each log event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    #[default]
    Info,
    Warning,
    Error,
    Success,
    Script,
    ScriptSection,
}

impl LogLevel {
    /// Parses a producer level string. Unknown values fall back to `Info`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        [
            Self::Info,
            Self::Warning,
            Self::Error,
            Self::Success,
            Self::Script,
            Self::ScriptSection,
        ]
        .into_iter()
        .find(|level| level.as_str().eq_ignore_ascii_case(raw))
        .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Success => "SUCCESS",
            Self::Script => "SCRIPT",
            Self::ScriptSection => "SCRIPT_SECTION",
        }
    }

    /// CSS-like class used by log panels.
    pub fn css_class(&self) -> &'static str {
        match self {
            Self::Info => "log-info",
            Self::Warning => "log-warning",
            Self::Error => "log-error",
            Self::Success => "log-success",
            Self::Script => "log-script",
            Self::ScriptSection => "log-script-section",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an event came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOrigin {
    /// Produced by the remote install/uninstall operation.
    Remote,
    /// Synthesised by the session (connection notices and the like).
    Local,
}

/// One immutable observation from an operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub text: String,
    pub level: LogLevel,
    pub timestamp: DateTime<Local>,
    pub origin: EventOrigin,
}

impl LogEvent {
    /// Creates a remote event stamped with the local receipt time.
    pub fn remote(level: LogLevel, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level,
            timestamp: Local::now(),
            origin: EventOrigin::Remote,
        }
    }

    /// Creates a locally-originated notice.
    pub fn local(level: LogLevel, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level,
            timestamp: Local::now(),
            origin: EventOrigin::Local,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_remote(&self) -> bool {
        self.origin == EventOrigin::Remote
    }

    /// Empty and whitespace-only events are never rendered or classified.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// `[HH:MM:SS] [LEVEL] text`, the line shown in log panels.
    pub fn render_line(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.level,
            self.text
        )
    }
}

/// Parses one raw channel payload into a remote `LogEvent`.
pub fn parse_event(raw: &str) -> Result<LogEvent, EventError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| EventError::Malformed(e.to_string()))?;
    normalize_event(&value)
}

/// Normalises a decoded payload, accepting the field spellings producers use.
///
/// The first key present with a string value wins for each field.
pub fn normalize_event(value: &serde_json::Value) -> Result<LogEvent, EventError> {
    let Some(object) = value.as_object() else {
        return Err(EventError::Malformed("event payload is not an object".into()));
    };
    let text = first_str(object, &TEXT_KEYS).unwrap_or_default();
    if text.trim().is_empty() {
        return Err(EventError::Empty);
    }
    let level = first_str(object, &LEVEL_KEYS)
        .map(LogLevel::parse)
        .unwrap_or_default();
    let event = LogEvent::remote(level, text);
    Ok(match first_str(object, &TIMESTAMP_KEYS).and_then(parse_timestamp) {
        Some(timestamp) => event.with_timestamp(timestamp),
        None => event,
    })
}

fn first_str<'a>(
    object: &'a serde_json::Map<String, serde_json::Value>,
    keys: &[&str],
) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(|v| v.as_str()))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Local));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
}
