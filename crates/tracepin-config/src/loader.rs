//! Configuration file loading and validation
//!
//! - [`load_config`] - Strict loader, errors if the file is missing
//! - [`load_config_from_str`] - Parse and validate TOML content
//!
//! # Usage
//!
//! ```rust,ignore
//! use tracepin_config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("tracepin.toml"))?;
//! ```

use crate::constants::ENV_TRACEPIN_CONFIG;
use crate::Config;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Commented default configuration
pub const DEFAULT_CONFIG: &str = include_str!("../tracepin.toml");

/// Errors that can occur during config loading
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Resolve the config path.
///
/// `TRACEPIN_CONFIG` takes precedence over the given path when set.
pub fn resolve_config_path(path: &Path) -> PathBuf {
    match std::env::var_os(ENV_TRACEPIN_CONFIG) {
        Some(overridden) if !overridden.is_empty() => {
            let overridden = PathBuf::from(overridden);
            debug!(path = %overridden.display(), "Using config path from environment");
            overridden
        }
        _ => path.to_path_buf(),
    }
}

/// Load configuration from a TOML file (strict - no side effects)
///
/// # Returns
/// * `Ok(Config)` - Successfully loaded configuration
/// * `Err(ConfigError::NotFound)` - Config file does not exist
/// * `Err(ConfigError)` - Failed to read, parse or validate configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let resolved_path = resolve_config_path(path);

    if !resolved_path.exists() {
        return Err(ConfigError::NotFound(resolved_path));
    }

    debug!(path = %resolved_path.display(), "Loading config file");
    let content = std::fs::read_to_string(&resolved_path)?;
    load_config_from_str(&content)
}

/// Load configuration from a TOML string
pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    config.validate().map_err(ConfigError::ValidationError)?;
    Ok(config)
}
