pub mod schema;

pub use schema::BridgeConfig;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default toolbridge home directory (~/.toolbridge).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".toolbridge"))
        .unwrap_or_else(|| PathBuf::from(".toolbridge"))
}

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    default_home_dir().join("toolbridge.toml")
}

/// Load config from the given path, or return defaults.
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    if path.exists() {
        let contents =
            std::fs::read_to_string(path).context("Failed to read toolbridge config file")?;
        let config: BridgeConfig =
            toml::from_str(&contents).context("Failed to parse toolbridge config (TOML)")?;
        Ok(config)
    } else {
        Ok(BridgeConfig::default())
    }
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &BridgeConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}
