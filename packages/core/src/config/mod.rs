//! Configuration management for kicup
//!
//! Handles loading, saving, and validating the JSONC configuration file.
//! Creates default config if missing, validates against schema.

pub mod paths;
pub mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jsonc_parser::parse_to_serde_value;

pub use paths::{docker_config_dir, get_config_dir, get_config_path};
pub use schema::{Config, RunnerConfig, TunnelConfig};

/// Ensure the config directory exists
///
/// Creates `~/.config/kicup/` if it doesn't exist.
pub fn ensure_config_dir() -> Result<PathBuf> {
    let config_dir =
        get_config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;
        tracing::info!("Created config directory: {}", config_dir.display());
    }

    Ok(config_dir)
}

/// Load configuration from the default config file
///
/// If the config file doesn't exist, creates a new one with default values.
pub fn load_config() -> Result<Config> {
    let config_path =
        get_config_path().ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if !config_path.exists() {
        tracing::info!(
            "Config file not found, creating default at: {}",
            config_path.display()
        );
        let config = Config::default();
        ensure_config_dir()?;
        save_config_to(&config, &config_path)?;
        return Ok(config);
    }

    load_config_from(&config_path)
}

/// Load configuration from an explicit path
///
/// Supports JSONC (JSON with comments). Rejects unknown fields.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let parsed_value = parse_to_serde_value(&contents, &Default::default())
        .map_err(|e| anyhow::anyhow!("Invalid JSONC in config file: {}", e))?
        .ok_or_else(|| anyhow::anyhow!("Config file is empty"))?;

    let config: Config = serde_json::from_value(parsed_value).with_context(|| {
        format!(
            "Invalid configuration in {}. Check for unknown fields or invalid values.",
            path.display()
        )
    })?;

    Ok(config)
}

/// Save configuration to the default config file
pub fn save_config(config: &Config) -> Result<()> {
    ensure_config_dir()?;
    let config_path =
        get_config_path().ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;
    save_config_to(config, &config_path)
}

/// Save configuration to an explicit path
///
/// Creates a backup of the existing file (config.json.bak) before overwriting.
pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    if path.exists() {
        let backup_path = path.with_extension("json.bak");
        fs::copy(path, &backup_path)
            .with_context(|| format!("Failed to create backup at: {}", backup_path.display()))?;
        tracing::debug!("Created config backup: {}", backup_path.display());
    }

    let json = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    tracing::debug!("Saved config to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_jsonc_with_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                // keep podman rootless on this box
                "version": 1,
                "rootless": true,
                "tunnel": { "health_check_interval_secs": 10 }
            }"#,
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert!(config.rootless);
        assert_eq!(config.tunnel.health_check_interval_secs, 10);
    }

    #[test]
    fn test_load_rejects_unknown_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"version": 1, "colour": "blue"}"#).unwrap();
        assert!(load_config_from(&path).is_err());
    }

    #[test]
    fn test_load_empty_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "").unwrap();
        assert!(load_config_from(&path).is_err());
    }

    #[test]
    fn test_save_creates_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        save_config_to(&Config::default(), &path).unwrap();
        assert!(!path.with_extension("json.bak").exists());

        let mut config = Config::default();
        config.ssh_program = "/usr/local/bin/ssh".to_string();
        save_config_to(&config, &path).unwrap();
        assert!(path.with_extension("json.bak").exists());
        assert_eq!(load_config_from(&path).unwrap(), config);
    }
}
