//! Configuration management for micro-rs
//!
//! The configuration covers where filter and asset text is persisted, the
//! host policy for blocked documents, and logging. Filter rules themselves
//! are not part of it; they live in [`crate::storage`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ErrorContext, MicroError, Result};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "micro-rs.toml";

/// Default data directory for persisted filter and asset text
pub const DEFAULT_DATA_DIR: &str = "./micro-rs";

/// Asset served in place of a document on hosts that cannot cancel one
pub const DEFAULT_FRAME_BLOCKED_ASSET: &str = "libmicro-frame-blocked";

/// Main configuration structure for micro-rs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MicroConfig {
    /// General instance configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Persisted text location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Host policy for document requests
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// General instance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Instance name, also used to key persisted text
    pub name: String,

    /// Disabled instances allow every request
    pub enabled: bool,

    /// Log every decision at info level
    pub debug_mode: bool,
}

/// Persisted text location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `filters_<name>.txt` and `assets_<name>.txt`
    pub data_dir: PathBuf,
}

/// Host policy for document requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Redirect blocked documents to `frame_blocked_asset` instead of
    /// cancelling them
    pub redirect_blocked_documents: bool,

    /// Asset served for blocked documents
    pub frame_blocked_asset: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,

    /// Write timestamps in log lines
    pub timestamps: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: true,
            debug_mode: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            redirect_blocked_documents: false,
            frame_blocked_asset: DEFAULT_FRAME_BLOCKED_ASSET.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            timestamps: true,
        }
    }
}

impl MicroConfig {
    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(MicroError::Config(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }));
        }

        let content = fs::read_to_string(path)?;
        let config: MicroConfig = toml::from_str(&content)?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.general.name.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\') {
            return Err(MicroError::Config(ConfigError::InvalidValue {
                key: "general.name".to_string(),
                value: self.general.name.clone(),
            }));
        }

        if self.policy.redirect_blocked_documents && self.policy.frame_blocked_asset.trim().is_empty() {
            return Err(MicroError::Config(ConfigError::InvalidValue {
                key: "policy.frame_blocked_asset".to_string(),
                value: self.policy.frame_blocked_asset.clone(),
            }));
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(MicroError::Config(ConfigError::InvalidValue {
                    key: "logging.level".to_string(),
                    value: self.logging.level.clone(),
                }));
            }
        }

        Ok(())
    }

    /// Create default configuration file
    pub fn create_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
        Self::default().save_to_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_creation() {
        let config = MicroConfig::default();

        assert!(config.general.enabled);
        assert_eq!(config.general.name, "");
        assert_eq!(config.storage.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert!(!config.policy.redirect_blocked_documents);
        assert_eq!(config.policy.frame_blocked_asset, DEFAULT_FRAME_BLOCKED_ASSET);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = MicroConfig::default();

        config.general.name = "bad name".to_string();
        assert!(config.validate().is_err());

        config.general.name = "main".to_string();
        config.policy.redirect_blocked_documents = true;
        config.policy.frame_blocked_asset = " ".to_string();
        assert!(config.validate().is_err());

        config.policy.frame_blocked_asset = DEFAULT_FRAME_BLOCKED_ASSET.to_string();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_operations() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join(DEFAULT_CONFIG_FILE);

        let mut original = MicroConfig::default();
        original.general.name = "main".to_string();
        original.policy.redirect_blocked_documents = true;
        original.save_to_file(&config_path).unwrap();

        let loaded = MicroConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.general.name, "main");
        assert!(loaded.policy.redirect_blocked_documents);
        assert_eq!(loaded.logging.level, original.logging.level);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("partial.toml");
        fs::write(&config_path, "[general]\nname = \"side\"\n").unwrap();

        let config = MicroConfig::load_from_file(&config_path).unwrap();
        assert_eq!(config.general.name, "side");
        assert!(config.general.enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_file_not_found() {
        let result = MicroConfig::load_from_file("/nonexistent/path/config.toml");

        if let Err(MicroError::Config(ConfigError::FileNotFound { path })) = result {
            assert!(path.contains("nonexistent"));
        } else {
            panic!("Expected FileNotFound error");
        }
    }

    #[test]
    fn test_invalid_config_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid_config.toml");
        fs::write(&config_path, "invalid toml content [[[").unwrap();

        let result = MicroConfig::load_from_file(&config_path);
        assert!(matches!(result, Err(MicroError::Toml(_))));
    }

    #[test]
    fn test_unreadable_config_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        // A directory exists but cannot be read as a file
        let result = MicroConfig::load_from_file(temp_dir.path());
        assert!(matches!(result, Err(MicroError::Io(_))));
    }

    #[test]
    fn test_create_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(DEFAULT_CONFIG_FILE);
        MicroConfig::create_default_config(&config_path).unwrap();
        assert!(MicroConfig::load_from_file(&config_path).is_ok());
    }
}
