//! Error taxonomy of the logging engine.
//!
//! Each operation family owns one error enum; [`LogError`] unifies them for
//! callers that do not care which stage failed.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type LogResult<T> = Result<T, LogError>;

/// The configuration cannot be used as given.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("unknown log level `{0}`")]
    UnknownLevel(String),

    #[error("unknown log format `{0}`")]
    UnknownFormat(String),
}

/// An entry could not be rendered.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("entry is not serializable: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to render entry: {0}")]
    Render(#[from] std::fmt::Error),
}

/// Appending a rendered record failed.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("failed to append log record: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum RotationError {
    #[error("failed to query size of {}: {source}", .path.display())]
    Size { path: PathBuf, source: io::Error },

    #[error("rotation target {} already exists", .0.display())]
    Collision(PathBuf),

    #[error("failed to flush active log file: {0}")]
    Flush(#[source] io::Error),

    #[error("failed to rename {} to {}: {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("failed to open fresh log file {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to prepare archive directory {}: {source}", .path.display())]
    Prepare { path: PathBuf, source: io::Error },

    #[error("failed to scan {}: {source}", .path.display())]
    Scan { path: PathBuf, source: io::Error },

    #[error("archive target {} already exists", .0.display())]
    Collision(PathBuf),

    #[error("failed to archive {}: {source}", .path.display())]
    Move { path: PathBuf, source: io::Error },
}

#[derive(Debug, Error)]
pub enum TailError {
    #[error("log file {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("failed to open {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
}

/// Delivery to a notifier target failed. Never surfaced to logging callers;
/// only counted and traced by the notifier worker.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http delivery failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("queue delivery failed: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode entry: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("delivery to {0} timed out")]
    Timeout(String),

    #[error("invalid endpoint `{0}`")]
    InvalidEndpoint(String),
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Rotation(#[from] RotationError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Tail(#[from] TailError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}
