//! Live following of a log file.

use std::fs::Metadata;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

use super::error::TailError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct TailOptions {
    pub poll_interval: Duration,
    /// Wait for a missing file to appear instead of failing with `NotFound`.
    pub wait_for_creation: bool,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            wait_for_creation: false,
        }
    }
}

/// Receives each completed line, without its terminator.
pub trait LineObserver {
    fn on_line(&mut self, line: String);
}

impl<F: FnMut(String)> LineObserver for F {
    fn on_line(&mut self, line: String) {
        self(line)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TailSummary {
    pub lines: u64,
    pub reopens: u64,
    pub truncations: u64,
}

/// Streams lines appended to `path` after the call until `cancel` fires.
///
/// Starts at the current end of the file. Truncation restarts from offset 0;
/// a replaced file (rotation) is drained and the new one followed from its
/// start. Returns within one poll interval of cancellation.
pub async fn tail<O: LineObserver>(
    path: &Path,
    options: TailOptions,
    cancel: CancellationToken,
    mut observer: O,
) -> Result<TailSummary, TailError> {
    let mut summary = TailSummary::default();
    let mut follower = match Follower::open(path, true).await {
        Ok(follower) => Some(follower),
        Err(e) if e.kind() == io::ErrorKind::NotFound && options.wait_for_creation => None,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(TailError::NotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(TailError::Open {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    loop {
        poll_once(path, &mut follower, &mut observer, &mut summary).await?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(options.poll_interval) => {}
        }
    }

    // Pick up whatever landed between the last poll and cancellation.
    poll_once(path, &mut follower, &mut observer, &mut summary).await?;
    Ok(summary)
}

async fn poll_once<O: LineObserver>(
    path: &Path,
    follower: &mut Option<Follower>,
    observer: &mut O,
    summary: &mut TailSummary,
) -> Result<(), TailError> {
    match follower {
        Some(current) => {
            current.read_new(observer, summary).await?;
            if current.replaced(path).await {
                current.finish(observer, summary);
                match Follower::open(path, false).await {
                    Ok(next) => {
                        *current = next;
                        summary.reopens += 1;
                        current.read_new(observer, summary).await?;
                    }
                    // Renamed away with nothing new yet: keep the old handle.
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(source) => {
                        return Err(TailError::Open {
                            path: path.to_path_buf(),
                            source,
                        });
                    }
                }
            }
        }
        None => match Follower::open(path, false).await {
            Ok(mut created) => {
                created.read_new(observer, summary).await?;
                *follower = Some(created);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(TailError::Open {
                    path: path.to_path_buf(),
                    source,
                });
            }
        },
    }
    Ok(())
}

struct Follower {
    path: PathBuf,
    file: File,
    offset: u64,
    pending: Vec<u8>,
    identity: Option<(u64, u64)>,
}

impl Follower {
    async fn open(path: &Path, at_end: bool) -> io::Result<Self> {
        let mut file = File::open(path).await?;
        let meta = file.metadata().await?;
        let offset = if at_end {
            file.seek(SeekFrom::End(0)).await?
        } else {
            0
        };
        Ok(Self {
            path: path.to_path_buf(),
            file,
            offset,
            pending: Vec::new(),
            identity: identity(&meta),
        })
    }

    async fn read_new<O: LineObserver>(
        &mut self,
        observer: &mut O,
        summary: &mut TailSummary,
    ) -> Result<(), TailError> {
        let len = match self.file.metadata().await {
            Ok(meta) => meta.len(),
            Err(e) => return Err(self.read_error(e)),
        };
        if len < self.offset {
            if let Err(e) = self.file.seek(SeekFrom::Start(0)).await {
                return Err(self.read_error(e));
            }
            self.offset = 0;
            self.pending.clear();
            summary.truncations += 1;
        }

        let mut chunk = Vec::new();
        let read = match self.file.read_to_end(&mut chunk).await {
            Ok(read) => read,
            Err(e) => return Err(self.read_error(e)),
        };
        self.offset += read as u64;
        self.pending.extend_from_slice(&chunk);

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            observer.on_line(String::from_utf8_lossy(&line).into_owned());
            summary.lines += 1;
        }
        Ok(())
    }

    /// True when the path now names a different file than the one held.
    async fn replaced(&self, path: &Path) -> bool {
        match fs::metadata(path).await {
            Ok(meta) => match (self.identity, identity(&meta)) {
                (Some(held), Some(current)) => held != current,
                _ => false,
            },
            Err(_) => false,
        }
    }

    /// Emits a trailing unterminated line before the handle is abandoned.
    fn finish<O: LineObserver>(&mut self, observer: &mut O, summary: &mut TailSummary) {
        if !self.pending.is_empty() {
            let line = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            observer.on_line(line);
            summary.lines += 1;
        }
    }

    fn read_error(&self, source: io::Error) -> TailError {
        TailError::Read {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(unix)]
fn identity(meta: &Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn identity(_meta: &Metadata) -> Option<(u64, u64)> {
    None
}
