//! msgpass configuration file handling
//!
//! Loads and saves the ~/.config/msgpass/config.yaml file.

use crate::mail::{DEFAULT_ADDRESSES, MAX_ADDRESSES};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Mailbox sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailConfig {
    /// Number of addresses, `1..=256`
    #[serde(default = "default_address_count")]
    pub address_count: u16,

    /// Maximum number of messages alive at once, `1..=u32::MAX`
    ///
    /// This is a hard cap, not a hint. Message slots are preallocated and the
    /// arena never grows, so creating a message while this many are live
    /// fails with `AllocationFailure` even if memory is available. Size it for
    /// the peak number of undeleted messages.
    #[serde(default = "default_message_capacity")]
    pub message_capacity: usize,
}

fn default_address_count() -> u16 {
    DEFAULT_ADDRESSES
}

fn default_message_capacity() -> usize {
    1024
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            address_count: default_address_count(),
            message_capacity: default_message_capacity(),
        }
    }
}

impl MailConfig {
    /// Check the sizing against its limits
    pub fn validate(&self) -> Result<()> {
        super::validation::validate_mail_config_result(self)
    }

    /// Largest address count accepted by [`validate`](Self::validate)
    pub fn max_address_count() -> u16 {
        MAX_ADDRESSES
    }
}

/// Workload for the `stress` demo command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressConfig {
    /// Producer threads
    #[serde(default = "default_producers")]
    pub producers: usize,

    /// Consumer threads
    #[serde(default = "default_consumers")]
    pub consumers: usize,

    /// Messages each producer creates
    #[serde(default = "default_messages_per_producer")]
    pub messages_per_producer: usize,
}

fn default_producers() -> usize {
    10
}

fn default_consumers() -> usize {
    8
}

fn default_messages_per_producer() -> usize {
    100
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            producers: default_producers(),
            consumers: default_consumers(),
            messages_per_producer: default_messages_per_producer(),
        }
    }
}

/// msgpass configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgPassConfig {
    /// Mailbox sizing
    #[serde(default)]
    pub mail: MailConfig,

    /// Demo workload
    #[serde(default)]
    pub stress: StressConfig,
}

impl MsgPassConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`, or from the default path if it exists, or fall back
    /// to built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    tracing::debug!(path = %path.display(), "No config file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::MsgPassError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading msgpass configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            address_count = config.mail.address_count,
            message_capacity = config.mail.message_capacity,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving msgpass configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/msgpass/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("msgpass");
        path.push("config.yaml");
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_config_creation() {
        let config = MsgPassConfig::new();
        assert_eq!(config.mail.address_count, 32);
        assert_eq!(config.mail.message_capacity, 1024);
        assert_eq!(config.stress.messages_per_producer, 100);
    }

    #[test]
    fn test_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = MsgPassConfig::new();
        config.mail.address_count = 200;
        config.stress.producers = 3;

        config.save(path).unwrap();

        let loaded = MsgPassConfig::load(path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "mail:\n  address_count: 8\n").unwrap();

        let loaded = MsgPassConfig::load(&path).unwrap();
        assert_eq!(loaded.mail.address_count, 8);
        assert_eq!(loaded.mail.message_capacity, 1024);
        assert_eq!(loaded.stress, StressConfig::default());
    }

    #[test]
    fn test_default_path() {
        let path = MsgPassConfig::default_path();
        assert!(path.ends_with("msgpass/config.yaml"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = MsgPassConfig::load("/nonexistent/config.yaml");
        assert!(matches!(result, Err(crate::MsgPassError::Config(_))));
    }

    #[test]
    fn test_load_or_default_with_explicit_path() {
        let result = MsgPassConfig::load_or_default(Some(Path::new("/nonexistent/config.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_serialization() {
        let yaml = serde_yaml::to_string(&MsgPassConfig::new()).unwrap();
        assert!(yaml.contains("mail:"));
        assert!(yaml.contains("address_count: 32"));
        assert!(yaml.contains("stress:"));
    }

    #[test]
    fn test_max_address_count() {
        assert_eq!(MailConfig::max_address_count(), 256);
    }
}
