use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use logz_core::LogConfig;
use logz_core::logger::rotation::{self, Rotation};
use logz_core::logger::{ArchiveSelector, Archiver, LogReader};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

fn log_path(config: &LogConfig) -> Result<&Path> {
    config
        .log_path()
        .context("the configured output is not a file")
}

#[derive(Args, Debug)]
pub struct RotateCli {}

impl RotateCli {
    pub fn handle(&self, config: &LogConfig) -> Result<()> {
        let path = log_path(config)?;
        match rotation::check_and_rotate(path, config.max_size_bytes)
            .context("error rotating logs")?
        {
            Rotation::Rotated { retired, size } => println!(
                "{} {} ({size} bytes)",
                style("Logs rotated to").green(),
                retired.display()
            ),
            Rotation::Skipped { size } => println!(
                "{} ({size} of {} bytes)",
                style("Below rotation threshold").yellow(),
                config.max_size_bytes
            ),
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct CheckSizeCli {}

impl CheckSizeCli {
    pub fn handle(&self, config: &LogConfig) -> Result<()> {
        let path = log_path(config)?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let size = rotation::log_directory_size(dir)
            .with_context(|| format!("error calculating log size of {}", dir.display()))?;

        println!(
            "The total log size in directory '{}' is: {} MB ({size} bytes)",
            dir.display(),
            size / (1024 * 1024)
        );
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct ArchiveCli {
    /// Only archive files last modified more than this many days ago
    #[arg(long)]
    pub older_than_days: Option<u64>,
}

impl ArchiveCli {
    pub fn handle(&self, config: &LogConfig) -> Result<()> {
        let archiver =
            Archiver::from_config(config).context("the configured output is not a file")?;
        let selector = match self.older_than_days {
            Some(days) => ArchiveSelector::OlderThan(Duration::from_secs(days * SECONDS_PER_DAY)),
            None => ArchiveSelector::All,
        };

        let report = archiver.archive(&selector).context("error archiving logs")?;
        if report.archived.is_empty() {
            println!("{}", style("Nothing to archive").yellow());
            return Ok(());
        }
        for path in &report.archived {
            println!("  {} {}", style("✓").green(), path.display());
        }
        println!(
            "{}",
            style(format!("Archived {} file(s) successfully!", report.archived.len())).green()
        );
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct HistoryCli {
    /// List the files that make up the history instead of their lines
    #[arg(long)]
    pub files: bool,

    /// Print only the number of lines
    #[arg(long, conflicts_with = "files")]
    pub count: bool,
}

impl HistoryCli {
    pub fn handle(&self, config: &LogConfig) -> Result<()> {
        let path = log_path(config)?;
        let archive_dir = config
            .resolved_archive_dir()
            .context("the configured output is not a file")?;
        let reader = LogReader::new(path, &archive_dir).context("error listing log files")?;

        if self.files {
            for file in reader.list_files() {
                println!("{}", file.display());
            }
        } else if self.count {
            println!("{}", reader.count_lines().context("error reading logs")?);
        } else {
            for line in reader.read_all_lines().context("error reading logs")? {
                println!("{line}");
            }
        }
        Ok(())
    }
}
