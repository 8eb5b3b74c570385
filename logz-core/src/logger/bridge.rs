//! Bridge from the `log` facade into a [`Logger`].
//!
//! Libraries that only speak `log` (`info!`, `warn!`, ...) end up in the same
//! file, notifiers and counters as direct calls. Filtering stays with the
//! logger, so [`Logger::set_level`] applies to bridged records too.

use std::sync::Arc;

use serde_json::Value;

use super::config::LogLevel;
use super::entry::{caller_from, Metadata};
use super::Logger;

pub struct LogBridge {
    logger: Arc<Logger>,
}

impl LogBridge {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }
}

impl log::Log for LogBridge {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        self.logger.enabled(map_level(metadata.level()))
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut fields = Metadata::new();
        fields.insert("target".to_string(), Value::from(record.target()));
        let caller = match (record.file(), record.line()) {
            (Some(file), Some(line)) => caller_from(file, line),
            _ => record.target().to_string(),
        };

        self.logger.dispatch(
            map_level(record.level()),
            record.args().to_string(),
            fields,
            caller,
        );
    }

    fn flush(&self) {
        if let Err(error) = self.logger.flush() {
            tracing::warn!(%error, "failed to flush log writer");
        }
    }
}

fn map_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

/// Installs `logger` as the process-wide `log` backend.
///
/// Fails if another `log` backend is already installed.
pub fn init_log_bridge(logger: Arc<Logger>) -> Result<(), log::SetLoggerError> {
    log::set_boxed_logger(Box::new(LogBridge::new(logger)))?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}
