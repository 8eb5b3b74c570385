use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::error::ConfigError;
use super::notifier::NotifierConfig;

/// Size at which the active log file is retired, unless configured otherwise.
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Name of the archive store created next to the active log file.
pub const DEFAULT_ARCHIVE_DIR: &str = "archive";

/// Fully resolved configuration handed to the engine by its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Unknown names fall back to INFO instead of rejecting the file.
    #[serde(deserialize_with = "level_or_info")]
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Rotation ceiling for the active file, in bytes.
    pub max_size_bytes: u64,
    /// Archive store; defaults to `<log dir>/archive`.
    pub archive_dir: Option<PathBuf>,
    pub compress_archives: bool,
    pub metrics_enabled: bool,
    pub notifiers: NotifierConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
            output: LogOutput::Stdout,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            archive_dir: None,
            compress_archives: true,
            metrics_enabled: false,
            notifiers: NotifierConfig::default(),
        }
    }
}

impl LogConfig {
    /// Path of the active log file, if the output is file-backed.
    pub fn log_path(&self) -> Option<&Path> {
        self.output.path()
    }

    pub fn resolved_archive_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.archive_dir {
            return Some(dir.clone());
        }
        self.log_path().map(default_archive_dir)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_size_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let LogOutput::File(path) = &self.output {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "output",
                    reason: "file path is empty".to_string(),
                });
            }
        }
        self.notifiers.validate()
    }
}

fn level_or_info<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    Ok(name.parse().unwrap_or_else(|error: ConfigError| {
        tracing::warn!(%error, "using INFO instead");
        LogLevel::Info
    }))
}

pub(crate) fn default_archive_dir(log_path: &Path) -> PathBuf {
    log_path
        .parent()
        .unwrap_or(Path::new("."))
        .join(DEFAULT_ARCHIVE_DIR)
}

/// Severity levels, ordered by [`LogLevel::rank`].
///
/// Filtering compares ranks, never declaration order. The coarse
/// [`LogLevel::severity`] is what records carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum LogLevel {
    Trace,
    Debug,
    Notice,
    Info,
    Success,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub const ALL: [LogLevel; 8] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Notice,
        LogLevel::Info,
        LogLevel::Success,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    /// Fine-grained integer used for threshold comparison.
    pub const fn rank(self) -> u8 {
        match self {
            Self::Trace => 5,
            Self::Debug => 10,
            Self::Notice => 15,
            Self::Info => 20,
            Self::Success => 25,
            Self::Warn => 30,
            Self::Error => 40,
            Self::Fatal => 50,
        }
    }

    /// Published severity: DEBUG=1, INFO=2, WARN=3, ERROR=4, FATAL=5.
    pub const fn severity(self) -> u8 {
        self.rank() / 10
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Fatal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Notice => "NOTICE",
            Self::Info => "INFO",
            Self::Success => "SUCCESS",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    pub fn as_lowercase(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Notice => "notice",
            Self::Info => "info",
            Self::Success => "success",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "notice" => Ok(Self::Notice),
            "info" => Ok(Self::Info),
            "success" => Ok(Self::Success),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            _ => Err(ConfigError::UnknownLevel(s.to_string())),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, ConfigError> {
        value.parse()
    }
}

impl From<LogLevel> for &'static str {
    fn from(level: LogLevel) -> Self {
        level.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "" | "text" | "pretty" => Ok(Self::Text),
            _ => Err(ConfigError::UnknownFormat(s.to_string())),
        }
    }
}

/// Where records go. Serialized as `"stdout"`, `"stderr"` or a file path.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File(PathBuf),
}

impl LogOutput {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Stdout | Self::Stderr => None,
        }
    }
}

impl From<&str> for LogOutput {
    fn from(value: &str) -> Self {
        match value.trim() {
            "" | "stdout" | "-" => Self::Stdout,
            "stderr" => Self::Stderr,
            path => Self::File(PathBuf::from(path)),
        }
    }
}

impl From<String> for LogOutput {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<LogOutput> for String {
    fn from(output: LogOutput) -> Self {
        match output {
            LogOutput::Stdout => "stdout".to_string(),
            LogOutput::Stderr => "stderr".to_string(),
            LogOutput::File(path) => path.to_string_lossy().into_owned(),
        }
    }
}
