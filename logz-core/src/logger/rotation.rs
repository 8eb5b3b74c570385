use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::RotationError;
use super::Logger;

const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Outcome of a size check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rotation {
    Skipped { size: u64 },
    Rotated { retired: PathBuf, size: u64 },
}

impl Rotation {
    pub fn is_rotated(&self) -> bool {
        matches!(self, Rotation::Rotated { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFileState {
    Active,
    Retired,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub path: PathBuf,
    pub size: u64,
    pub state: LogFileState,
}

/// Rotates `path` if it has reached `max_bytes`. For use when no live
/// [`Logger`] holds the file; otherwise call [`Logger::check_and_rotate`].
pub fn check_and_rotate(path: &Path, max_bytes: u64) -> Result<Rotation, RotationError> {
    let size = current_size(path)?;
    if size < max_bytes {
        return Ok(Rotation::Skipped { size });
    }
    retire(path, size)
}

/// Size of the active file; a missing file counts as empty.
pub fn current_size(path: &Path) -> Result<u64, RotationError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(source) => Err(RotationError::Size {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Renames the active file to its timestamped name and creates an empty
/// file in its place. Refuses to overwrite an existing retired file.
pub(crate) fn retire(path: &Path, size: u64) -> Result<Rotation, RotationError> {
    retire_at(path, size, Utc::now())
}

fn retire_at(path: &Path, size: u64, at: DateTime<Utc>) -> Result<Rotation, RotationError> {
    let retired = retired_path(path, at);
    // A hard link fails on an existing name where rename would replace it.
    fs::hard_link(path, &retired).map_err(|source| {
        if source.kind() == io::ErrorKind::AlreadyExists {
            RotationError::Collision(retired.clone())
        } else {
            RotationError::Rename {
                from: path.to_path_buf(),
                to: retired.clone(),
                source,
            }
        }
    })?;
    fs::remove_file(path).map_err(|source| RotationError::Rename {
        from: path.to_path_buf(),
        to: retired.clone(),
        source,
    })?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| RotationError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::info!(active = %path.display(), retired = %retired.display(), size, "log file rotated");
    Ok(Rotation::Rotated { retired, size })
}

/// `app.log` retired at `at` becomes `app-20240102T030405.678Z.log`.
pub fn retired_path(path: &Path, at: DateTime<Utc>) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stamp = at.format(STAMP_FORMAT);
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{stamp}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{stamp}"),
    };
    path.with_file_name(name)
}

/// Whether `candidate` is a retired sibling of the active file `active`.
pub fn is_retired_name(active: &Path, candidate: &Path) -> bool {
    let (Some(stem), Some(name)) = (
        active.file_stem().and_then(|s| s.to_str()),
        candidate.file_name().and_then(|s| s.to_str()),
    ) else {
        return false;
    };
    let Some(rest) = name.strip_prefix(stem).and_then(|r| r.strip_prefix('-')) else {
        return false;
    };
    let stamp = match active.extension().and_then(|e| e.to_str()) {
        Some(ext) => match rest.strip_suffix(ext).and_then(|r| r.strip_suffix('.')) {
            Some(stamp) => stamp,
            None => return false,
        },
        None => rest,
    };
    stamp
        .strip_suffix('Z')
        .is_some_and(|s| NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S%.3f").is_ok())
}

/// Whether `candidate` is an archived copy of a file retired from `active`,
/// compressed or not. In-flight `.partial` files never match.
pub fn is_archived_name(active: &Path, candidate: &Path) -> bool {
    let Some(name) = candidate.file_name().and_then(|s| s.to_str()) else {
        return false;
    };
    if name.ends_with(".partial") {
        return false;
    }
    let name = name.strip_suffix(".gz").unwrap_or(name);
    is_retired_name(active, Path::new(name))
}

/// Retired siblings of `active`, oldest first.
pub fn retired_files(active: &Path) -> io::Result<Vec<PathBuf>> {
    let dir = parent_dir(active);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_retired_name(active, &path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Active, retired and archived files for one configured output path.
pub fn list_log_files(active: &Path, archive_dir: &Path) -> io::Result<Vec<LogFile>> {
    let mut files = Vec::new();

    if let Ok(meta) = fs::metadata(active) {
        files.push(LogFile {
            path: active.to_path_buf(),
            size: meta.len(),
            state: LogFileState::Active,
        });
    }

    for path in retired_files(active)? {
        let size = fs::metadata(&path)?.len();
        files.push(LogFile {
            path,
            size,
            state: LogFileState::Retired,
        });
    }

    if archive_dir.exists() {
        let mut archived = Vec::new();
        for entry in fs::read_dir(archive_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() && is_archived_name(active, &entry.path()) {
                archived.push(LogFile {
                    path: entry.path(),
                    size: entry.metadata()?.len(),
                    state: LogFileState::Archived,
                });
            }
        }
        archived.sort_by(|a, b| a.path.cmp(&b.path));
        files.extend(archived);
    }

    Ok(files)
}

/// Total size of the regular files directly inside `dir`.
pub fn log_directory_size(dir: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_file() {
            total += meta.len();
        }
    }
    Ok(total)
}

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Runs [`Logger::check_and_rotate`] every `every` until `cancel` fires.
pub fn schedule_rotation(
    logger: Arc<Logger>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let logger = Arc::clone(&logger);
                    match tokio::task::spawn_blocking(move || logger.check_and_rotate()).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(error)) => tracing::warn!(%error, "scheduled rotation failed"),
                        Err(error) => tracing::warn!(%error, "scheduled rotation task panicked"),
                    }
                }
            }
        }
    })
}
