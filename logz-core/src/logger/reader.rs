use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use super::entry::Entry;
use super::rotation::{list_log_files, LogFileState};

/// Reads the full history of one log: archived files, then retired files,
/// then the active file.
pub struct LogReader {
    files: Vec<PathBuf>,
}

impl LogReader {
    pub fn new(active: &Path, archive_dir: &Path) -> io::Result<Self> {
        let listed = list_log_files(active, archive_dir)?;
        let ordered = [
            LogFileState::Archived,
            LogFileState::Retired,
            LogFileState::Active,
        ];
        let files = ordered
            .iter()
            .flat_map(|state| {
                listed
                    .iter()
                    .filter(move |f| f.state == *state)
                    .map(|f| f.path.clone())
            })
            .collect();
        Ok(Self { files })
    }

    pub fn list_files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn read_all_lines(&self) -> io::Result<Vec<String>> {
        let mut all_lines = Vec::new();
        for path in &self.files {
            all_lines.extend(read_file_lines(path)?);
        }
        Ok(all_lines)
    }

    /// JSON records across the history; lines that are not entries are skipped.
    pub fn read_entries(&self) -> io::Result<Vec<Entry>> {
        Ok(self
            .read_all_lines()?
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    pub fn count_lines(&self) -> io::Result<usize> {
        let mut count = 0;
        for path in &self.files {
            count += read_file_lines(path)?.len();
        }
        Ok(count)
    }
}

/// Lines of a plain or gzip-compressed log file.
pub fn read_file_lines(path: &Path) -> io::Result<Vec<String>> {
    let file = File::open(path)?;
    let source: Box<dyn Read> = if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    BufReader::new(source).lines().collect()
}
