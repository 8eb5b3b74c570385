use std::path::Path;

use anyhow::{Context, Result};
use logz_core::LogConfig;

pub const CONFY_APP_NAME: &str = "logz";
pub const CONFY_CONFIG_NAME: &str = "config";

/// Loads and validates the engine configuration, from `path` when given or
/// from the per-user confy location otherwise. A missing file is created with
/// defaults.
pub fn load(path: Option<&Path>) -> Result<LogConfig> {
    let config: LogConfig = match path {
        Some(path) => confy::load_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => confy::load(CONFY_APP_NAME, CONFY_CONFIG_NAME)
            .context("failed to load logz config")?,
    };
    config.validate().context("invalid logz config")?;
    Ok(config)
}
