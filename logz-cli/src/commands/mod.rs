mod emit;
mod maintain;
mod watch;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use logz_core::LogLevel;

use crate::settings;

#[derive(Parser)]
#[command(name = "logz")]
#[command(about = "Structured logging from the command line", long_about = None)]
pub struct Cli {
    /// Configuration file; defaults to the per-user logz config
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub async fn handle(&self) -> Result<()> {
        let config = settings::load(self.config.as_deref())?;
        match &self.command {
            Commands::Trace(args) => args.handle(LogLevel::Trace, config),
            Commands::Debug(args) => args.handle(LogLevel::Debug, config),
            Commands::Notice(args) => args.handle(LogLevel::Notice, config),
            Commands::Info(args) => args.handle(LogLevel::Info, config),
            Commands::Success(args) => args.handle(LogLevel::Success, config),
            Commands::Warn(args) => args.handle(LogLevel::Warn, config),
            Commands::Error(args) => args.handle(LogLevel::Error, config),
            Commands::Fatal(args) => args.handle(LogLevel::Fatal, config),
            Commands::Watch(watch_cli) => watch_cli.handle(&config).await,
            Commands::Rotate(rotate_cli) => rotate_cli.handle(&config),
            Commands::CheckSize(check_cli) => check_cli.handle(&config),
            Commands::Archive(archive_cli) => archive_cli.handle(&config),
            Commands::History(history_cli) => history_cli.handle(&config),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Logs a trace level message
    #[command(visible_alias = "trc")]
    Trace(emit::LogArgs),
    /// Logs a debug level message
    #[command(visible_alias = "dbg")]
    Debug(emit::LogArgs),
    /// Logs a notice level message
    #[command(visible_alias = "not")]
    Notice(emit::LogArgs),
    /// Logs an info level message
    #[command(visible_alias = "inf")]
    Info(emit::LogArgs),
    /// Logs a success level message
    #[command(visible_alias = "suc")]
    Success(emit::LogArgs),
    /// Logs a warn level message
    #[command(visible_alias = "wrn")]
    Warn(emit::LogArgs),
    /// Logs an error level message
    #[command(visible_alias = "err")]
    Error(emit::LogArgs),
    /// Logs a fatal level message and exits with status 1
    #[command(visible_alias = "ftl")]
    Fatal(emit::LogArgs),
    /// Follows the log file in real time
    #[command(visible_alias = "w")]
    Watch(watch::WatchCli),
    /// Rotates the log file if it exceeds the configured size
    Rotate(maintain::RotateCli),
    /// Reports the total size of the log directory
    #[command(name = "check-size")]
    CheckSize(maintain::CheckSizeCli),
    /// Moves retired log files into the archive store
    Archive(maintain::ArchiveCli),
    /// Prints the full history of the log: archived, retired and active
    History(maintain::HistoryCli),
}
