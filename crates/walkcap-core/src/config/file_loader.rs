//! File-based configuration loading

use crate::config::model::CaptureConfig;
use crate::error::{CaptureError, CaptureResult};
use std::fs;
use std::path::Path;

/// Load configuration from a file
///
/// Supports JSON, TOML, and YAML formats based on file extension.
/// Returns default config if file doesn't exist.
pub fn load_from_file(path: &Path) -> CaptureResult<CaptureConfig> {
    if !path.exists() {
        return Ok(CaptureConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        CaptureError::config_with_context(
            format!("Failed to read config file: {}", e),
            format!("Reading configuration from '{}'", path.display()),
        )
    })?;

    let parse_error = |format: &str, e: &dyn std::fmt::Display| {
        CaptureError::config_with_context(
            format!("Failed to parse {} config: {}", format, e),
            format!("Deserializing configuration from '{}'", path.display()),
        )
    };
    let config: CaptureConfig = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|e| parse_error("TOML", &e))?,
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content).map_err(|e| parse_error("YAML", &e))?
        }
        _ => serde_json::from_str(&content).map_err(|e| parse_error("JSON", &e))?,
    };

    config.validate()?;
    Ok(config)
}

/// Write configuration, picking the format from the extension (TOML unless yaml/json)
pub fn save_to_file(config: &CaptureConfig, path: &Path) -> CaptureResult<()> {
    let content = match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::to_string(config)?,
        Some("json") => serde_json::to_string_pretty(config)?,
        _ => toml::to_string_pretty(config)?,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CaptureError::io_at(&e, parent))?;
    }
    fs::write(path, content).map_err(|e| CaptureError::io_at(&e, path))?;
    Ok(())
}
