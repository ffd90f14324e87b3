pub mod model;
pub mod nickname;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub use model::{BridgeConfig, ConnectDefaults, ConnectionPreset, LoggingConfig};

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("crabbridge")
        .join("config.toml")
}

pub fn load_config() -> Result<BridgeConfig> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<BridgeConfig> {
    if !path.exists() {
        return Ok(BridgeConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: BridgeConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

pub fn save_config_to(path: &Path, config: &BridgeConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }
    let contents = toml::to_string_pretty(config).with_context(|| "Failed to serialize config")?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("crabbridge-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = scratch_dir("missing");
        let config = load_config_from(&dir.join("config.toml")).unwrap();
        assert!(config.connections.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = scratch_dir("save");
        let path = dir.join("nested").join("config.toml");
        let mut config = BridgeConfig::default();
        config.defaults.run_sync = true;
        save_config_to(&path, &config).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert!(loaded.defaults.run_sync);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let dir = scratch_dir("broken");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "connections = 5").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("config.toml"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
