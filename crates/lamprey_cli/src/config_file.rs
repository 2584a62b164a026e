//! Loading and printing JSON run configurations.

use anyhow::{Context, Result};
use lamprey_core::ModelConfig;
use std::path::Path;
use tracing::debug;

pub fn parse_config(text: &str) -> Result<ModelConfig> {
    let config: ModelConfig =
        serde_json::from_str(text).context("configuration is not a valid run description")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<ModelConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config = parse_config(&text).with_context(|| format!("in {}", path.display()))?;
    debug!(path = %path.display(), "loaded configuration");
    Ok(config)
}

/// Uses the file at `path` when given, the reference run otherwise.
pub fn load_or_reference(path: Option<&Path>) -> Result<ModelConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(ModelConfig::reference()),
    }
}

pub fn to_pretty_json(config: &ModelConfig) -> Result<String> {
    serde_json::to_string_pretty(config).context("failed to serialize configuration")
}
