//! Structured logging engine: severity filtering, pluggable formatting and
//! output, notifier fan-out, counters, size-based rotation, archival and
//! live tailing.

pub mod logger;

pub use logger::{
    Entry, LogConfig, LogError, LogFormat, LogLevel, LogOutput, LogResult, Logger, LoggerBuilder,
    Metadata,
};

#[doc(hidden)]
pub use serde_json;
