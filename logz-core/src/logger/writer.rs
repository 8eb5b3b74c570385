use std::fs::{self, File, OpenOptions};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use super::config::{LogFormat, LogOutput};
use super::entry::Entry;
use super::error::WriteError;
use super::formatter::{formatter_for, LogFormatter};

/// Renders entries and appends them to one destination.
pub trait LogWriter: Send {
    fn write(&mut self, entry: &Entry) -> Result<(), WriteError>;

    fn formatter(&self) -> &dyn LogFormatter;

    /// File backing this writer, if any. Rotation only applies to file writers.
    fn path(&self) -> Option<&Path> {
        None
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Closes the underlying file ahead of a rename.
    fn release(&mut self) {}

    /// Opens the configured path again after [`LogWriter::release`].
    fn reopen(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum Sink {
    Stdout,
    Stderr,
    File { path: PathBuf, file: Option<File> },
    Custom(Box<dyn Write + Send>),
}

impl Sink {
    fn append(&mut self, record: &[u8]) -> io::Result<()> {
        match self {
            Sink::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(record)?;
                out.flush()
            }
            Sink::Stderr => {
                let mut out = io::stderr().lock();
                out.write_all(record)?;
                out.flush()
            }
            Sink::File { file: Some(file), .. } => {
                file.write_all(record)?;
                file.flush()
            }
            Sink::File { path, file: None } => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("{} is closed for rotation", path.display()),
            )),
            Sink::Custom(out) => {
                out.write_all(record)?;
                out.flush()
            }
        }
    }
}

/// The stock writer: one formatter, one sink, one flushed line per entry.
pub struct DefaultWriter {
    sink: Sink,
    formatter: Box<dyn LogFormatter>,
}

impl DefaultWriter {
    /// Writes into an arbitrary sink, e.g. an in-memory buffer.
    pub fn new(out: Box<dyn Write + Send>, formatter: Box<dyn LogFormatter>) -> Self {
        Self {
            sink: Sink::Custom(out),
            formatter,
        }
    }

    pub fn stdout(formatter: Box<dyn LogFormatter>) -> Self {
        Self {
            sink: Sink::Stdout,
            formatter,
        }
    }

    /// Opens `output` for appending. A file that cannot be opened degrades to
    /// stdout with a warning instead of failing.
    pub fn open(output: &LogOutput, format: LogFormat) -> Self {
        match output {
            LogOutput::Stdout => Self {
                sink: Sink::Stdout,
                formatter: formatter_for(format, io::stdout().is_terminal()),
            },
            LogOutput::Stderr => Self {
                sink: Sink::Stderr,
                formatter: formatter_for(format, io::stderr().is_terminal()),
            },
            LogOutput::File(path) => match open_append(path) {
                Ok(file) => Self {
                    sink: Sink::File {
                        path: path.clone(),
                        file: Some(file),
                    },
                    formatter: formatter_for(format, false),
                },
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        %error,
                        "cannot open log file, redirecting to stdout"
                    );
                    Self {
                        sink: Sink::Stdout,
                        formatter: formatter_for(format, io::stdout().is_terminal()),
                    }
                }
            },
        }
    }
}

impl LogWriter for DefaultWriter {
    fn write(&mut self, entry: &Entry) -> Result<(), WriteError> {
        let mut record = self.formatter.format(entry)?.into_bytes();
        record.push(b'\n');
        self.sink.append(&record)?;
        Ok(())
    }

    fn formatter(&self) -> &dyn LogFormatter {
        self.formatter.as_ref()
    }

    fn path(&self) -> Option<&Path> {
        match &self.sink {
            Sink::File { path, .. } => Some(path),
            _ => None,
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::File { file: Some(file), .. } => file.flush(),
            Sink::Custom(out) => out.flush(),
            _ => Ok(()),
        }
    }

    fn release(&mut self) {
        if let Sink::File { file, .. } = &mut self.sink {
            file.take();
        }
    }

    fn reopen(&mut self) -> io::Result<()> {
        if let Sink::File { path, file } = &mut self.sink {
            *file = Some(open_append(path)?);
        }
        Ok(())
    }
}

pub(crate) fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::logger::config::LogLevel;
    use crate::logger::formatter::{JsonFormatter, TextFormatter};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    /// In-memory sink shared between a writer and the test inspecting it.
    #[derive(Clone, Default)]
    pub(crate) struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn each_write_appends_one_terminated_record() {
        let buffer = SharedBuffer::default();
        let mut writer = DefaultWriter::new(Box::new(buffer.clone()), Box::new(JsonFormatter));

        writer.write(&Entry::new(LogLevel::Info, "one")).expect("write");
        writer.write(&Entry::new(LogLevel::Error, "two")).expect("write");

        let contents = buffer.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(contents.ends_with('\n'));
        assert!(lines[0].contains(r#""message":"one""#));
        assert!(lines[1].contains(r#""level":"ERROR""#));
    }

    #[test]
    fn file_output_appends_and_creates_parents() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested/dir/app.log");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "existing\n").unwrap();

        let mut writer = DefaultWriter::open(&LogOutput::File(path.clone()), LogFormat::Text);
        assert_eq!(writer.path(), Some(path.as_path()));
        writer.write(&Entry::new(LogLevel::Info, "appended")).expect("write");

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("existing\n"));
        assert!(contents.contains("INFO - appended"));
        assert!(!contents.contains('\u{1b}'));
    }

    #[test]
    fn unopenable_file_falls_back_to_stdout() {
        let tmp = tempdir().unwrap();
        // A directory cannot be opened for appending.
        let writer = DefaultWriter::open(
            &LogOutput::File(tmp.path().to_path_buf()),
            LogFormat::Json,
        );
        assert!(writer.path().is_none());
    }

    #[test]
    fn released_file_rejects_writes_until_reopened() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("app.log");
        let mut writer = DefaultWriter::open(&LogOutput::File(path.clone()), LogFormat::Json);

        writer.release();
        let err = writer
            .write(&Entry::new(LogLevel::Info, "lost"))
            .expect_err("closed sink");
        assert!(matches!(err, WriteError::Io(_)));

        writer.reopen().expect("reopen");
        writer.write(&Entry::new(LogLevel::Info, "kept")).expect("write");
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("kept"));
        assert!(!contents.contains("lost"));
    }

    #[test]
    fn formatter_is_exposed() {
        let writer = DefaultWriter::stdout(Box::new(TextFormatter::plain()));
        let line = writer
            .formatter()
            .format(&Entry::new(LogLevel::Notice, "n"))
            .expect("format");
        assert!(line.contains("NOTICE - n"));
    }
}
