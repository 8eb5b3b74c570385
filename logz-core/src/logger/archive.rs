use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::config::{default_archive_dir, LogConfig};
use super::error::ArchiveError;
use super::rotation::retired_files;

/// Which retired files an archive run picks up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSelector {
    All,
    /// Retired files last modified longer ago than this.
    OlderThan(Duration),
    /// Only these files, if they are retired siblings of the active log.
    Named(Vec<PathBuf>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    /// Destinations written by this run.
    pub archived: Vec<PathBuf>,
}

/// Moves retired log files into the archive store, one file at a time.
#[derive(Debug, Clone)]
pub struct Archiver {
    log_path: PathBuf,
    archive_dir: PathBuf,
    compress: bool,
}

impl Archiver {
    pub fn new(log_path: impl Into<PathBuf>, archive_dir: Option<PathBuf>, compress: bool) -> Self {
        let log_path = log_path.into();
        let archive_dir = archive_dir.unwrap_or_else(|| default_archive_dir(&log_path));
        Self {
            log_path,
            archive_dir,
            compress,
        }
    }

    /// `None` when the configured output is not a file.
    pub fn from_config(config: &LogConfig) -> Option<Self> {
        let log_path = config.log_path()?;
        Some(Self::new(
            log_path,
            config.archive_dir.clone(),
            config.compress_archives,
        ))
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Archives every selected retired file. Stops at the first failure;
    /// files archived before it stay archived.
    pub fn archive(&self, selector: &ArchiveSelector) -> Result<ArchiveReport, ArchiveError> {
        let candidates = retired_files(&self.log_path).map_err(|source| ArchiveError::Scan {
            path: self.log_path.clone(),
            source,
        })?;
        let selected = self.select(candidates, selector)?;

        let mut report = ArchiveReport::default();
        if selected.is_empty() {
            return Ok(report);
        }

        fs::create_dir_all(&self.archive_dir).map_err(|source| ArchiveError::Prepare {
            path: self.archive_dir.clone(),
            source,
        })?;

        for source in selected {
            let destination = self.archive_file(&source)?;
            tracing::info!(from = %source.display(), to = %destination.display(), "log file archived");
            report.archived.push(destination);
        }
        Ok(report)
    }

    fn select(
        &self,
        candidates: Vec<PathBuf>,
        selector: &ArchiveSelector,
    ) -> Result<Vec<PathBuf>, ArchiveError> {
        match selector {
            ArchiveSelector::All => Ok(candidates),
            ArchiveSelector::Named(names) => Ok(candidates
                .into_iter()
                .filter(|c| names.iter().any(|n| n == c))
                .collect()),
            ArchiveSelector::OlderThan(age) => {
                let cutoff = SystemTime::now()
                    .checked_sub(*age)
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                let mut selected = Vec::new();
                for path in candidates {
                    let modified = fs::metadata(&path)
                        .and_then(|m| m.modified())
                        .map_err(|source| ArchiveError::Scan {
                            path: path.clone(),
                            source,
                        })?;
                    if modified < cutoff {
                        selected.push(path);
                    }
                }
                Ok(selected)
            }
        }
    }

    fn archive_file(&self, source: &Path) -> Result<PathBuf, ArchiveError> {
        let Some(name) = source.file_name() else {
            return Err(ArchiveError::Move {
                path: source.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            });
        };
        let mut file_name = name.to_os_string();
        if self.compress {
            file_name.push(".gz");
        }
        let destination = self.archive_dir.join(file_name);
        if destination.exists() {
            // A previous run may have stored the file but failed to remove it.
            let stored = self
                .holds_copy(source, &destination)
                .map_err(|e| ArchiveError::Move {
                    path: source.to_path_buf(),
                    source: e,
                })?;
            if !stored {
                return Err(ArchiveError::Collision(destination));
            }
            fs::remove_file(source).map_err(|e| ArchiveError::Move {
                path: source.to_path_buf(),
                source: e,
            })?;
            tracing::info!(from = %source.display(), "removed already archived source");
            return Ok(destination);
        }

        let moved = if self.compress {
            compress_into(source, &destination)
        } else {
            move_into(source, &destination)
        };
        moved.map_err(|e| ArchiveError::Move {
            path: source.to_path_buf(),
            source: e,
        })?;
        Ok(destination)
    }

    fn holds_copy(&self, source: &Path, destination: &Path) -> io::Result<bool> {
        let original = BufReader::new(File::open(source)?);
        let stored = File::open(destination)?;
        if self.compress {
            // Something that does not decode is not our copy.
            same_content(original, GzDecoder::new(BufReader::new(stored))).or_else(|e| {
                match e.kind() {
                    io::ErrorKind::InvalidInput
                    | io::ErrorKind::InvalidData
                    | io::ErrorKind::UnexpectedEof => Ok(false),
                    _ => Err(e),
                }
            })
        } else {
            if fs::metadata(source)?.len() != stored.metadata()?.len() {
                return Ok(false);
            }
            same_content(original, BufReader::new(stored))
        }
    }
}

fn same_content(mut left: impl Read, mut right: impl Read) -> io::Result<bool> {
    let mut a = [0u8; 8192];
    let mut b = [0u8; 8192];
    loop {
        let n = read_full(&mut left, &mut a)?;
        let m = read_full(&mut right, &mut b)?;
        if a[..n] != b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Gzips `src` into a temporary sibling of `dst`, renames it into place,
/// then removes `src`.
fn compress_into(src: &Path, dst: &Path) -> io::Result<()> {
    let partial = partial_path(dst);
    let result = (|| {
        let mut input = BufReader::new(File::open(src)?);
        let output = File::create(&partial)?;
        let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
        io::copy(&mut input, &mut encoder)?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        fs::rename(&partial, dst)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&partial);
        return result;
    }
    fs::remove_file(src)
}

/// Renames `src` to `dst`, copying through a temporary file when a plain
/// rename is not possible (e.g. across file systems).
fn move_into(src: &Path, dst: &Path) -> io::Result<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    let partial = partial_path(dst);
    if let Err(e) = fs::copy(src, &partial).and_then(|_| fs::rename(&partial, dst)) {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }
    fs::remove_file(src)
}

fn partial_path(dst: &Path) -> PathBuf {
    let mut name = dst.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::reader::read_file_lines;
    use crate::logger::rotation::retired_path;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn retired(active: &Path, minute: u32, body: &str) -> PathBuf {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap();
        let path = retired_path(active, at);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn compresses_retired_files_and_leaves_active_alone() {
        let tmp = tempdir().unwrap();
        let active = tmp.path().join("app.log");
        fs::write(&active, "live\n").unwrap();
        let old = retired(&active, 1, "a\nb\n");

        let archiver = Archiver::new(&active, None, true);
        let report = archiver.archive(&ArchiveSelector::All).expect("archive");

        let expected = tmp
            .path()
            .join("archive")
            .join("app-20240501T120100.000Z.log.gz");
        assert_eq!(report.archived, vec![expected.clone()]);
        assert!(!old.exists());
        assert!(active.exists());
        assert_eq!(read_file_lines(&expected).unwrap(), vec!["a", "b"]);
        assert!(!partial_path(&expected).exists());
    }

    #[test]
    fn archiving_twice_is_a_no_op() {
        let tmp = tempdir().unwrap();
        let active = tmp.path().join("app.log");
        retired(&active, 2, "x\n");

        let archiver = Archiver::new(&active, Some(tmp.path().join("store")), false);
        let first = archiver.archive(&ArchiveSelector::All).expect("first");
        assert_eq!(first.archived.len(), 1);

        let second = archiver.archive(&ArchiveSelector::All).expect("second");
        assert!(second.archived.is_empty());
        assert_eq!(
            fs::read_to_string(&first.archived[0]).unwrap(),
            "x\n"
        );
    }

    #[test]
    fn failure_keeps_earlier_files_archived() {
        let tmp = tempdir().unwrap();
        let active = tmp.path().join("app.log");
        let first = retired(&active, 1, "one\n");
        let second = retired(&active, 2, "two\n");

        let archive = tmp.path().join("archive");
        fs::create_dir_all(&archive).unwrap();
        let blocking = archive.join(second.file_name().unwrap());
        fs::write(&blocking, "already there").unwrap();

        let archiver = Archiver::new(&active, None, false);
        let err = archiver
            .archive(&ArchiveSelector::All)
            .expect_err("collision");
        assert!(matches!(err, ArchiveError::Collision(p) if p == blocking));

        assert!(!first.exists());
        assert!(archive.join(first.file_name().unwrap()).exists());
        assert!(second.exists());
    }

    #[test]
    fn leftover_source_of_a_stored_archive_is_removed() {
        let tmp = tempdir().unwrap();
        let active = tmp.path().join("app.log");
        let left_behind = retired(&active, 4, "kept\nlines\n");

        let archive = tmp.path().join("archive");
        fs::create_dir_all(&archive).unwrap();
        let mut name = left_behind.file_name().unwrap().to_os_string();
        name.push(".gz");
        let stored = archive.join(name);
        compress_into(&left_behind, &stored).expect("compress");
        fs::write(&left_behind, "kept\nlines\n").unwrap();

        let archiver = Archiver::new(&active, None, true);
        let report = archiver.archive(&ArchiveSelector::All).expect("archive");

        assert_eq!(report.archived, vec![stored.clone()]);
        assert!(!left_behind.exists());
        assert_eq!(read_file_lines(&stored).unwrap(), vec!["kept", "lines"]);
    }

    #[test]
    fn named_selector_only_takes_listed_retired_files() {
        let tmp = tempdir().unwrap();
        let active = tmp.path().join("app.log");
        fs::write(&active, "live\n").unwrap();
        let keep = retired(&active, 1, "keep\n");
        let take = retired(&active, 2, "take\n");

        let archiver = Archiver::new(&active, None, false);
        let report = archiver
            .archive(&ArchiveSelector::Named(vec![take.clone(), active.clone()]))
            .expect("archive");

        assert_eq!(report.archived.len(), 1);
        assert!(keep.exists());
        assert!(!take.exists());
        assert!(active.exists());
    }

    #[test]
    fn older_than_skips_recent_files() {
        let tmp = tempdir().unwrap();
        let active = tmp.path().join("app.log");
        let recent = retired(&active, 3, "recent\n");

        let archiver = Archiver::new(&active, None, true);
        let report = archiver
            .archive(&ArchiveSelector::OlderThan(Duration::from_secs(3600)))
            .expect("archive");
        assert!(report.archived.is_empty());
        assert!(recent.exists());
    }
}
