//! Configuration management for VStation

mod daemon;

pub use daemon::{DaemonConfig, FxfConfig, GatewayConfig, ListingPolicy, ProxyConfig};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vstation")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Load the daemon configuration, falling back to defaults
///
/// An explicit path must exist and parse. Without one, the default path is
/// used when present and defaults are used otherwise.
pub fn load_daemon_config(path: Option<&Path>) -> Result<DaemonConfig, ConfigError> {
    if let Some(path) = path {
        return load_config(path);
    }

    let default_path = default_config_path();
    if default_path.exists() {
        load_config(&default_path)
    } else {
        tracing::info!("No config at {:?}, using defaults", default_path);
        Ok(DaemonConfig::default())
    }
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}
