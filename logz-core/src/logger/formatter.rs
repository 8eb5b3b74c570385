//! Rendering strategies for log entries.
//!
//! Both variants implement [`LogFormatter`]; writers and notifiers only see
//! the trait, so new layouts are added by implementing it.

use std::ffi::OsString;
use std::fmt::Write as _;

use chrono::SecondsFormat;
use console::Style;

use super::config::{LogFormat, LogLevel};
use super::entry::Entry;
use super::error::FormatError;

/// Environment variable that turns colors and icons off.
pub const NO_COLOR_ENV: &str = "LOGZ_NO_COLOR";

pub trait LogFormatter: Send + Sync {
    fn format(&self, entry: &Entry) -> Result<String, FormatError>;
}

/// Single-line JSON, one object per record.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl LogFormatter for JsonFormatter {
    fn format(&self, entry: &Entry) -> Result<String, FormatError> {
        Ok(serde_json::to_string(entry)?)
    }
}

/// Human-readable layout:
/// `[<timestamp>] <icon> <LEVEL> - <message> (Context: <tag>)`,
/// followed by an indented metadata line when metadata is present.
#[derive(Debug, Clone, Copy)]
pub struct TextFormatter {
    color: bool,
}

impl TextFormatter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    pub fn plain() -> Self {
        Self::new(false)
    }

    /// Colors only when writing to a terminal and no opt-out is set.
    pub fn detect(is_terminal: bool) -> Self {
        Self::new(color_enabled(is_terminal))
    }

    pub fn is_colored(&self) -> bool {
        self.color
    }
}

impl LogFormatter for TextFormatter {
    fn format(&self, entry: &Entry) -> Result<String, FormatError> {
        let level = entry.level();
        let timestamp = entry
            .timestamp()
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let (icon, label) = if self.color {
            let (style, glyph) = palette(level);
            let style = style.force_styling(true);
            (
                style.apply_to(glyph).to_string(),
                style.apply_to(level.as_str()).to_string(),
            )
        } else {
            (String::new(), level.as_str().to_string())
        };

        let mut out = String::new();
        write!(out, "[{timestamp}] {icon} {label} - {}", entry.message())?;
        if let Some(context) = entry.context() {
            write!(out, " (Context: {context})")?;
        }
        if !entry.metadata().is_empty() {
            let metadata = serde_json::to_string(entry.metadata())?;
            let indent = " ".repeat(timestamp.len() + 3);
            write!(out, "\n{indent} {metadata}")?;
        }
        Ok(out)
    }
}

pub fn icon(level: LogLevel) -> &'static str {
    palette(level).1
}

fn palette(level: LogLevel) -> (Style, &'static str) {
    match level {
        LogLevel::Trace => (Style::new().cyan(), "🔍"),
        LogLevel::Debug => (Style::new().blue(), "🐛"),
        LogLevel::Notice => (Style::new().cyan(), "📝"),
        LogLevel::Info => (Style::new().green(), "ℹ️"),
        LogLevel::Success => (Style::new().green(), "✅"),
        LogLevel::Warn => (Style::new().yellow(), "⚠️"),
        LogLevel::Error => (Style::new().red(), "❌"),
        LogLevel::Fatal => (Style::new().magenta(), "💀"),
    }
}

pub fn color_enabled(is_terminal: bool) -> bool {
    color_allowed(is_terminal, |name| std::env::var_os(name))
}

fn color_allowed(is_terminal: bool, var: impl Fn(&str) -> Option<OsString>) -> bool {
    let opted_out = |name: &str| var(name).is_some_and(|v| !v.is_empty());
    is_terminal && !opted_out(NO_COLOR_ENV) && !opted_out("NO_COLOR")
}

pub fn formatter_for(format: LogFormat, is_terminal: bool) -> Box<dyn LogFormatter> {
    match format {
        LogFormat::Json => Box::new(JsonFormatter),
        LogFormat::Text => Box::new(TextFormatter::detect(is_terminal)),
    }
}
