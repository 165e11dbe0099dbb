// LinkVault - In-memory index and consistency layer for download queues
// Copyright (C) 2025 LinkVault contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Configuration system for LinkVault - TOML-based with XDG compliance.

use crate::core::error::{LinkVaultError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Main configuration structure for LinkVault
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Persistent store settings
    pub store: StoreConfig,
    /// Cache settings
    pub cache: CacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,
    /// Enable debug mode
    pub debug: bool,
    /// Log file location (relative to XDG data dir)
    pub log_file: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            debug: false,
            log_file: Some("linkvault.log".to_string()),
        }
    }
}

/// Persistent store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Queue database, absolute or relative to the XDG data dir
    pub database: String,
    /// Busy timeout for the SQLite connection in milliseconds
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: "queue.db".to_string(),
            busy_timeout_ms: 5000,
        }
    }
}

/// Cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Distinct users whose stats are memoized
    pub stats_capacity: usize,
    /// Distinct occupied-plugin sets whose job lists are memoized
    pub jobs_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stats_capacity: 64,
            jobs_capacity: 16,
        }
    }
}

impl Config {
    /// Get the configuration directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("linkvault")
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Get the data directory path
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join("linkvault")
    }

    /// Resolved location of the queue database
    pub fn database_path(&self) -> PathBuf {
        let configured = Path::new(&self.store.database);
        if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            Self::data_dir().join(configured)
        }
    }

    /// Resolved location of the log file, if file logging is enabled
    pub fn log_path(&self) -> Option<PathBuf> {
        self.general.log_file.as_ref().map(|file| Self::data_dir().join(file))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from file, or create default if not exists
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!("Loading config from {:?}", path);
            let content = std::fs::read_to_string(path)
                .map_err(|e| LinkVaultError::Config(format!("Failed to read config: {}", e)))?;

            let config: Config = toml::from_str(&content)
                .map_err(|e| LinkVaultError::Config(format!("Failed to parse config: {}", e)))?;

            info!("Configuration loaded successfully");
            Ok(config)
        } else {
            debug!("Config file not found, using defaults");
            let config = Config::default();

            if let Err(e) = config.save_to(path) {
                warn!("Failed to save default config: {}", e);
            }

            Ok(config)
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| LinkVaultError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| LinkVaultError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| LinkVaultError::Config(format!("Failed to write config: {}", e)))?;

        info!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Initialize global configuration
    pub fn init(config: Config) -> &'static Config {
        CONFIG.get_or_init(|| config)
    }

    /// Try to get global configuration
    pub fn try_get() -> Option<&'static Config> {
        CONFIG.get()
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(mut self) -> Self {
        // LINKVAULT_VERBOSE
        if std::env::var("LINKVAULT_VERBOSE").is_ok() {
            self.general.verbose = true;
        }

        // LINKVAULT_DEBUG
        if std::env::var("LINKVAULT_DEBUG").is_ok() {
            self.general.debug = true;
        }

        // LINKVAULT_DATABASE
        if let Ok(database) = std::env::var("LINKVAULT_DATABASE") {
            if !database.is_empty() {
                self.store.database = database;
            }
        }

        self
    }
}

/// Generate default configuration file content
pub fn generate_default_config() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| String::from("# Failed to generate config"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.general.verbose);
        assert_eq!(config.store.database, "queue.db");
        assert_eq!(config.cache.stats_capacity, 64);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.cache.jobs_capacity, config.cache.jobs_capacity);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str("[store]\ndatabase = \"/tmp/q.db\"\n").unwrap();
        assert_eq!(parsed.database_path(), PathBuf::from("/tmp/q.db"));
        assert_eq!(parsed.store.busy_timeout_ms, 5000);
        assert_eq!(parsed.cache.jobs_capacity, 16);
    }

    #[test]
    fn test_relative_database_lives_in_data_dir() {
        let config = Config::default();
        assert!(config.database_path().starts_with(Config::data_dir()));
        assert!(Config::config_dir().to_string_lossy().contains("linkvault"));
    }

    #[test]
    fn test_load_creates_default_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.store.database, "queue.db");

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.cache.stats_capacity, config.cache.stats_capacity);
    }

    #[test]
    fn test_generate_default_config() {
        let content = generate_default_config();
        assert!(content.contains("[general]"));
        assert!(content.contains("[store]"));
        assert!(content.contains("[cache]"));
    }
}
