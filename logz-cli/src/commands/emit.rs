use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use logz_core::logger::{CounterRegistry, MetricsSink, NoopMetrics};
use logz_core::{LogConfig, LogFormat, LogLevel, LogOutput, Logger, Metadata};
use serde_json::Value;

/// Upper bound on waiting for notifier delivery before the command returns.
const NOTIFY_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Log message
    #[arg(short = 'M', long, default_value = "")]
    pub msg: String,

    /// Output file, `stdout` or `stderr`
    #[arg(short, long)]
    pub output: Option<String>,

    /// Output format: `json` or `text`
    #[arg(short, long)]
    pub format: Option<LogFormat>,

    /// Global metadata attached to the record, as key=value
    #[arg(short = 'm', long = "metadata", value_parser = parse_key_val)]
    pub metadata: Vec<(String, String)>,

    /// Call-site fields for this record, as key=value
    #[arg(short = 'c', long = "context", value_parser = parse_key_val)]
    pub context: Vec<(String, String)>,

    /// Correlation tag for the record
    #[arg(long)]
    pub tag: Option<String>,
}

impl LogArgs {
    pub fn handle(&self, level: LogLevel, mut config: LogConfig) -> Result<()> {
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(output) = &self.output {
            config.output = LogOutput::from(output.as_str());
        }

        let registry = Arc::new(CounterRegistry::new());
        let metrics: Arc<dyn MetricsSink> = if config.metrics_enabled {
            registry.clone()
        } else {
            Arc::new(NoopMetrics)
        };

        let logger = Logger::from_config(&config, metrics);
        for (key, value) in &self.metadata {
            logger.set_metadata(key.clone(), value.clone());
        }
        logger.set_context(self.tag.clone());

        let fields: Metadata = self
            .context
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        logger.emit(level, self.msg.clone(), fields);
        logger.flush_notifiers(NOTIFY_FLUSH_TIMEOUT);

        if config.metrics_enabled {
            tracing::debug!(counters = %registry.render(), "metrics");
        }
        Ok(())
    }
}

fn parse_key_val(s: &str) -> Result<(String, String)> {
    let Some((key, value)) = s.split_once('=') else {
        bail!("invalid key=value: no `=` found in `{s}`");
    };
    if key.is_empty() {
        bail!("invalid key=value: empty key in `{s}`");
    }
    Ok((key.to_string(), value.to_string()))
}
