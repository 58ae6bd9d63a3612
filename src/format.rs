//! Output formatting for configuration trees.

use crate::config::LoadedConfig;
use serde_json::Value;

/// Output format for printed configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

/// Render a value in the given format.
pub fn format_value(value: &Value, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    })
}

/// Render snapshot metadata (contributing files, generation, load time).
pub fn format_snapshot_files(snapshot: &LoadedConfig, format: OutputFormat) -> anyhow::Result<String> {
    format_value(&serde_json::to_value(snapshot)?, format)
}
