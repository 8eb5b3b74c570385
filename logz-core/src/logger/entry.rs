use std::collections::BTreeMap;
use std::panic::Location;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::LogLevel;

/// Structured key/value data attached to an entry. Keys are unique and ordered.
pub type Metadata = BTreeMap<String, Value>;

/// One log event. Fields are fixed once the entry leaves its builder methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    severity: u8,
    message: String,
    caller: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<String>,
    #[serde(default)]
    metadata: Metadata,
}

impl Entry {
    /// Stamps the entry with the current UTC time and the level's severity.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            severity: level.severity(),
            message: message.into(),
            caller: String::new(),
            context: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = caller.into();
        self
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn severity(&self) -> u8 {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// Merges call-site fields over the logger's global metadata into a new map.
/// Local keys win on collision; neither input is touched.
pub fn merge_metadata(global: &Metadata, local: &Metadata) -> Metadata {
    let mut merged = global.clone();
    merged.extend(local.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Renders a call-site location as `dir/file.rs:line`.
pub fn caller_location(location: &Location<'_>) -> String {
    caller_from(location.file(), location.line())
}

/// Renders a source position reported by someone else, e.g. a `log` record.
pub fn caller_from(file: &str, line: u32) -> String {
    format!("{}:{line}", trim_file_path(file))
}

/// Keeps the last two components of a source path.
fn trim_file_path(path: &str) -> &str {
    let mut separators = path.rmatch_indices(['/', '\\']);
    match (separators.next(), separators.next()) {
        (Some(_), Some((idx, _))) => &path[idx + 1..],
        _ => path,
    }
}
