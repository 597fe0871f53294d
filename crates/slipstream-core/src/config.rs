//! Configuration management for Slipstream

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Sync settings
    #[serde(default)]
    pub sync: SyncConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Database file path (defaults to the platform data dir)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            database_path: default_database_path(),
        }
    }
}

/// Sync engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How many of the most recent threads a full sync lists
    #[serde(default = "default_full_sync_thread_limit")]
    pub full_sync_thread_limit: u32,

    /// Thread listing filter applied during full sync
    #[serde(default = "default_full_sync_query")]
    pub full_sync_query: String,

    /// How many threads are fetched concurrently per batch
    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,

    /// How many recent messages the sync response includes for UI refresh
    #[serde(default = "default_recent_messages_limit")]
    pub recent_messages_limit: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            full_sync_thread_limit: default_full_sync_thread_limit(),
            full_sync_query: default_full_sync_query(),
            fetch_batch_size: default_fetch_batch_size(),
            recent_messages_limit: default_recent_messages_limit(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_path() -> PathBuf {
    Config::data_dir().join("slipstream.db")
}

fn default_full_sync_thread_limit() -> u32 {
    50
}

fn default_full_sync_query() -> String {
    "-in:spam -in:trash".to_string()
}

fn default_fetch_batch_size() -> usize {
    10
}

fn default_recent_messages_limit() -> u32 {
    20
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::APP_NAME)
            .join("config.toml")
    }

    /// Get the data directory
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::APP_NAME)
    }

    /// Load config from disk, falling back to defaults if absent
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(&path, contents)?;
        info!("Saved config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.sync.full_sync_thread_limit, 50);
        assert_eq!(config.sync.fetch_batch_size, 10);
        assert_eq!(config.sync.full_sync_query, "-in:spam -in:trash");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [sync]
            fetch_batch_size = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.sync.fetch_batch_size, 4);
        assert_eq!(config.sync.full_sync_thread_limit, 50);
        assert_eq!(config.general.log_level, "info");
    }
}
