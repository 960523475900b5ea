// Marshalling configuration loading
//
// Loads marshaller settings from a TOML file or uses the built-in defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::codec::WireFormat;

/// Built-in default configuration (embedded in binary)
const DEFAULT_MARSHAL_CONFIG: &str = include_str!("../config/marshal.toml");

/// Marshaller settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MarshalConfig {
    /// Wire format used when the caller does not pick one
    pub format: WireFormat,
    /// Deepest container nesting accepted when decoding
    pub max_nesting_depth: usize,
    /// Embed definitions flagged `dynamic` in the stream
    pub embed_dynamic_definitions: bool,
    /// Re-arm restored timers on read
    pub rearm_timers: bool,
}

impl Default for MarshalConfig {
    fn default() -> Self {
        Self {
            format: WireFormat::Structured,
            max_nesting_depth: 64,
            embed_dynamic_definitions: true,
            rearm_timers: true,
        }
    }
}

/// Load marshaller configuration
///
/// Reads `config_path` when it exists, otherwise falls back to the built-in defaults.
pub fn load_config(config_path: Option<&Path>) -> Result<MarshalConfig> {
    let config_str = if let Some(path) = config_path {
        if path.exists() {
            tracing::info!("Loading marshal config from: {}", path.display());
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?
        } else {
            tracing::info!("Config file not found, using built-in defaults");
            DEFAULT_MARSHAL_CONFIG.to_string()
        }
    } else {
        tracing::info!("No config path specified, using built-in defaults");
        DEFAULT_MARSHAL_CONFIG.to_string()
    };

    parse_config(&config_str)
}

fn parse_config(config_str: &str) -> Result<MarshalConfig> {
    let config: MarshalConfig =
        toml::from_str(config_str).context("Failed to parse marshal config TOML")?;
    if config.max_nesting_depth == 0 {
        anyhow::bail!("max_nesting_depth must be at least 1");
    }
    Ok(config)
}
