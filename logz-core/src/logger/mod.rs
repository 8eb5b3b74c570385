mod config;
mod entry;
mod macros;
pub mod archive;
pub mod bridge;
pub mod error;
pub mod formatter;
pub mod metrics;
pub mod notifier;
pub mod reader;
pub mod rotation;
pub mod tail;
pub mod writer;

pub use archive::{ArchiveReport, ArchiveSelector, Archiver};
pub use bridge::{init_log_bridge, LogBridge};
pub use config::{LogConfig, LogFormat, LogLevel, LogOutput, DEFAULT_MAX_SIZE_BYTES};
pub use entry::{caller_from, caller_location, merge_metadata, Entry, Metadata};
pub use error::{
    ArchiveError, ConfigError, FormatError, LogError, LogResult, NotifyError, RotationError,
    TailError, WriteError,
};
pub use formatter::{JsonFormatter, LogFormatter, TextFormatter};
pub use metrics::{CounterRegistry, MetricsSink, NoopMetrics, LOGS_TOTAL};
pub use notifier::{Notifier, NotifierConfig, NotifierStats, QueuedNotifier};
pub use reader::LogReader;
pub use rotation::{check_and_rotate, LogFile, LogFileState, Rotation};
pub use tail::{tail, LineObserver, TailOptions, TailSummary};
pub use writer::{DefaultWriter, LogWriter};

use std::io;
use std::panic::Location;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;

/// How long a fatal entry waits for notifiers before the process exits.
const FATAL_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Invoked after a terminal-severity entry has been written, notified and counted.
pub trait ExitHandler: Send + Sync {
    fn exit(&self, code: i32);
}

/// Terminates the process.
#[derive(Debug, Default)]
pub struct ProcessExit;

impl ExitHandler for ProcessExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

struct LoggerState {
    level: LogLevel,
    metadata: Metadata,
    context: Option<String>,
    writer: Box<dyn LogWriter>,
}

/// Orchestrates filtering, entry construction, writing, notification and
/// counting.
///
/// One mutex guards global metadata and the writer, so merge+write,
/// `set_metadata` and rotation are serialized. The threshold is mirrored in
/// an atomic so filtered-out calls never touch the lock.
pub struct Logger {
    state: Mutex<LoggerState>,
    threshold: AtomicU8,
    notifiers: Vec<Box<dyn Notifier>>,
    metrics: Arc<dyn MetricsSink>,
    exit: Box<dyn ExitHandler>,
    max_size_bytes: u64,
}

impl Logger {
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    /// Builds a logger from a resolved configuration. Notifiers that fail to
    /// start are skipped with a warning.
    pub fn from_config(config: &LogConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        let mut builder = Logger::builder()
            .level(config.level)
            .writer(DefaultWriter::open(&config.output, config.format))
            .max_size_bytes(config.max_size_bytes)
            .metrics(metrics);

        match config.notifiers.build() {
            Ok(notifiers) => {
                for notifier in notifiers {
                    builder = builder.notifier(notifier);
                }
            }
            Err(error) => tracing::warn!(%error, "notifiers disabled"),
        }
        builder.build()
    }

    fn lock_state(&self) -> MutexGuard<'_, LoggerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level.rank() >= self.threshold.load(Ordering::Relaxed)
    }

    pub fn level(&self) -> LogLevel {
        self.lock_state().level
    }

    pub fn set_level(&self, level: LogLevel) {
        let mut state = self.lock_state();
        state.level = level;
        self.threshold.store(level.rank(), Ordering::Relaxed);
    }

    /// Adds or replaces a global metadata key merged into every entry.
    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.lock_state().metadata.insert(key.into(), value.into());
    }

    pub fn metadata(&self) -> Metadata {
        self.lock_state().metadata.clone()
    }

    /// Sets the correlation tag attached to subsequent entries.
    pub fn set_context(&self, context: Option<String>) {
        self.lock_state().context = context;
    }

    /// Logs `message` at `level` with call-site `fields`.
    ///
    /// Disabled levels return after a single comparison. Write failures are
    /// reported through `tracing` and do not stop notification or counting.
    /// A terminal level exits the process once everything has been attempted.
    #[track_caller]
    pub fn emit(&self, level: LogLevel, message: impl Into<String>, fields: Metadata) {
        if !self.enabled(level) {
            return;
        }
        let caller = caller_location(Location::caller());
        self.dispatch(level, message.into(), fields, caller);
    }

    /// Everything after filtering, for callers that bring their own location.
    pub(crate) fn dispatch(&self, level: LogLevel, message: String, fields: Metadata, caller: String) {
        let entry = {
            let mut state = self.lock_state();
            let metadata = merge_metadata(&state.metadata, &fields);
            let entry = Entry::new(level, message)
                .with_caller(caller)
                .with_context(state.context.clone())
                .with_metadata(metadata);
            if let Err(error) = state.writer.write(&entry) {
                tracing::error!(%error, level = %level, "failed to write log entry");
            }
            entry
        };

        for notifier in &self.notifiers {
            notifier.notify(&entry);
        }

        if self.metrics.is_enabled() {
            self.metrics.increment(LOGS_TOTAL, 1);
            self.metrics.increment(&metrics::level_counter(level), 1);
        }

        if level.is_terminal() {
            self.flush_notifiers(FATAL_FLUSH_TIMEOUT);
            self.exit.exit(1);
        }
    }

    #[track_caller]
    pub fn trace(&self, message: impl Into<String>, fields: Metadata) {
        self.emit(LogLevel::Trace, message, fields);
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<String>, fields: Metadata) {
        self.emit(LogLevel::Debug, message, fields);
    }

    #[track_caller]
    pub fn notice(&self, message: impl Into<String>, fields: Metadata) {
        self.emit(LogLevel::Notice, message, fields);
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>, fields: Metadata) {
        self.emit(LogLevel::Info, message, fields);
    }

    #[track_caller]
    pub fn success(&self, message: impl Into<String>, fields: Metadata) {
        self.emit(LogLevel::Success, message, fields);
    }

    #[track_caller]
    pub fn warn(&self, message: impl Into<String>, fields: Metadata) {
        self.emit(LogLevel::Warn, message, fields);
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<String>, fields: Metadata) {
        self.emit(LogLevel::Error, message, fields);
    }

    /// Logs at FATAL and terminates through the exit handler.
    #[track_caller]
    pub fn fatal(&self, message: impl Into<String>, fields: Metadata) {
        self.emit(LogLevel::Fatal, message, fields);
    }

    /// Rotates the active file if it has reached the configured size. Holds
    /// the state lock throughout, so no entry straddles the rename.
    pub fn check_and_rotate(&self) -> Result<Rotation, RotationError> {
        let mut state = self.lock_state();
        let Some(path) = state.writer.path().map(|p| p.to_path_buf()) else {
            return Ok(Rotation::Skipped { size: 0 });
        };

        let size = rotation::current_size(&path)?;
        if size < self.max_size_bytes {
            return Ok(Rotation::Skipped { size });
        }

        state.writer.flush().map_err(RotationError::Flush)?;
        state.writer.release();
        let outcome = rotation::retire(&path, size);
        // Reopen even if retiring failed; the writer must not stay released.
        state
            .writer
            .reopen()
            .map_err(|source| RotationError::Open { path, source })?;
        outcome
    }

    /// Replaces the destination for subsequent entries and hands back the
    /// previous writer, flushed.
    pub fn set_writer(&self, writer: impl LogWriter + 'static) -> Box<dyn LogWriter> {
        let mut previous = std::mem::replace(&mut self.lock_state().writer, Box::new(writer));
        if let Err(error) = previous.flush() {
            tracing::warn!(%error, "failed to flush replaced writer");
        }
        previous
    }

    pub fn flush(&self) -> io::Result<()> {
        self.lock_state().writer.flush()
    }

    /// Waits for queued notifications, up to `timeout` per notifier.
    pub fn flush_notifiers(&self, timeout: Duration) {
        for notifier in &self.notifiers {
            notifier.flush(timeout);
        }
    }
}

pub struct LoggerBuilder {
    level: LogLevel,
    writer: Option<Box<dyn LogWriter>>,
    notifiers: Vec<Box<dyn Notifier>>,
    metrics: Arc<dyn MetricsSink>,
    exit: Box<dyn ExitHandler>,
    metadata: Metadata,
    context: Option<String>,
    max_size_bytes: u64,
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            writer: None,
            notifiers: Vec::new(),
            metrics: Arc::new(NoopMetrics),
            exit: Box::new(ProcessExit),
            metadata: Metadata::new(),
            context: None,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
        }
    }
}

impl LoggerBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn writer(mut self, writer: impl LogWriter + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Registers a notifier; registration order is dispatch order.
    pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifiers.push(Box::new(notifier));
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn exit_handler(mut self, exit: impl ExitHandler + 'static) -> Self {
        self.exit = Box::new(exit);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn max_size_bytes(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    pub fn build(self) -> Logger {
        let writer = self.writer.unwrap_or_else(|| {
            Box::new(DefaultWriter::open(&LogOutput::Stdout, LogFormat::Text))
        });
        Logger {
            threshold: AtomicU8::new(self.level.rank()),
            state: Mutex::new(LoggerState {
                level: self.level,
                metadata: self.metadata,
                context: self.context,
                writer,
            }),
            notifiers: self.notifiers,
            metrics: self.metrics,
            exit: self.exit,
            max_size_bytes: self.max_size_bytes,
        }
    }
}

#[cfg(test)]
mod tests;
