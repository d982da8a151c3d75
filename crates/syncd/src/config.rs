//! Configuration file support for syncd
//!
//! Loads the daemon configuration from TOML. Every field has a default, so an
//! empty or missing file yields a cold-booting daemon with bulk support off.
//! Default location: /etc/sonic/syncd.toml

use crate::error::{Result, SyncdError};
use crate::lifecycle::{BootMode, CommunicationMode};
use crate::notification::DEFAULT_QUEUE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/syncd.toml";

/// Complete syncd configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncdConfig {
    /// Boot mode used when switch create carries no boot type
    #[serde(default)]
    pub start_type: BootMode,

    /// Communication mode until a client changes it
    #[serde(default)]
    pub communication_mode: CommunicationMode,

    /// Use the SDK's native bulk calls when it has them
    #[serde(default)]
    pub enable_bulk: bool,

    /// `key=value` profile handed to the SDK
    #[serde(default)]
    pub profile_map_file: Option<PathBuf>,

    /// Identity table state file for warm restart
    #[serde(default = "default_warm_restart_file")]
    pub warm_restart_file: PathBuf,

    /// SDK warm-boot image, used when the profile does not name one
    #[serde(default = "default_sdk_warm_boot_file")]
    pub sdk_warm_boot_file: PathBuf,

    /// Events buffered between the SDK and the channel
    #[serde(default = "default_notification_queue_capacity")]
    pub notification_queue_capacity: usize,

    /// Frames buffered towards the client
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Unix socket the daemon listens on
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
}

fn default_warm_restart_file() -> PathBuf {
    PathBuf::from("/var/warmboot/syncd/identity_table.json")
}

fn default_sdk_warm_boot_file() -> PathBuf {
    PathBuf::from("/var/warmboot/sai-warmboot.bin")
}

fn default_notification_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_channel_capacity() -> usize {
    256
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/var/run/sswsyncd/syncd.sock")
}

impl Default for SyncdConfig {
    fn default() -> Self {
        Self {
            start_type: BootMode::default(),
            communication_mode: CommunicationMode::default(),
            enable_bulk: false,
            profile_map_file: None,
            warm_restart_file: default_warm_restart_file(),
            sdk_warm_boot_file: default_sdk_warm_boot_file(),
            notification_queue_capacity: default_notification_queue_capacity(),
            channel_capacity: default_channel_capacity(),
            socket_path: default_socket_path(),
        }
    }
}

impl SyncdConfig {
    /// Parses configuration text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SyncdConfig = toml::from_str(content)
            .map_err(|e| SyncdError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|e| match e {
                SyncdError::Configuration(msg) => {
                    SyncdError::Configuration(format!("{}: {}", path.display(), msg))
                }
                other => other,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(SyncdError::Io(e)),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SyncdError::Configuration(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(SyncdError::Configuration(
                "channel_capacity must be > 0".to_string(),
            ));
        }
        if self.warm_restart_file.as_os_str().is_empty() {
            return Err(SyncdError::Configuration(
                "warm_restart_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SyncdConfig::default();
        assert_eq!(config.start_type, BootMode::Cold);
        assert_eq!(config.communication_mode, CommunicationMode::Sync);
        assert!(!config.enable_bulk);
        assert_eq!(config.notification_queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = SyncdConfig::from_toml(
            r#"
start_type = "warm"
enable_bulk = true
communication_mode = "deferred_sync"
"#,
        )
        .unwrap();
        assert_eq!(config.start_type, BootMode::Warm);
        assert_eq!(config.communication_mode, CommunicationMode::DeferredSync);
        assert!(config.enable_bulk);
        assert_eq!(config.channel_capacity, 256);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(SyncdConfig::from_toml("start_type = \"lukewarm\"").is_err());
        assert!(SyncdConfig::from_toml("channel_capacity = 0").is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = SyncdConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, SyncdConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("syncd.toml");
        let config = SyncdConfig {
            enable_bulk: true,
            profile_map_file: Some(PathBuf::from("/etc/sai/profile.ini")),
            ..SyncdConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(SyncdConfig::load_or_default(&path).unwrap(), config);
    }
}
