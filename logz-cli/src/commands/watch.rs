use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use logz_core::LogConfig;
use logz_core::logger::{TailOptions, tail};
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct WatchCli {
    /// File to follow; defaults to the configured output file
    pub path: Option<PathBuf>,

    /// Wait for the file to be created instead of failing
    #[arg(long)]
    pub wait: bool,

    /// Polling interval in milliseconds
    #[arg(long, default_value_t = 100)]
    pub interval_ms: u64,
}

impl WatchCli {
    pub async fn handle(&self, config: &LogConfig) -> Result<()> {
        let path = self
            .path
            .clone()
            .or_else(|| config.log_path().map(Path::to_path_buf))
            .context("no file to watch: output is not a file and no path was given")?;

        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_signal.cancel();
            }
        });

        let options = TailOptions {
            poll_interval: Duration::from_millis(self.interval_ms.max(1)),
            wait_for_creation: self.wait,
        };

        println!(
            "{}",
            style(format!("Monitoring {} (Ctrl+C to exit):", path.display())).cyan()
        );
        let summary = tail(&path, options, cancel, |line: String| println!("{line}"))
            .await
            .with_context(|| format!("failed to watch {}", path.display()))?;

        tracing::debug!(
            lines = summary.lines,
            reopens = summary.reopens,
            truncations = summary.truncations,
            "watch finished"
        );
        Ok(())
    }
}
