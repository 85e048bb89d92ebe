//! Configuration management for the bridge.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use shaver_core::CoordinatorOptions;

/// Bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Timing overrides shared by every device.
    pub timing: TimingConfig,
    /// Shavers to keep connected.
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    /// Load configuration from the default path, or defaults when no file exists.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load and reject the result when validation finds anything.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check every section and return all problems found.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = self.timing.validate();

        for (i, device) in self.devices.iter().enumerate() {
            errors.extend(device.validate(&format!("devices[{}]", i)));
        }

        let mut seen: Vec<String> = Vec::new();
        for (i, device) in self.devices.iter().enumerate() {
            let normalized = device.address.to_uppercase();
            if seen.contains(&normalized) {
                errors.push(ValidationError {
                    field: format!("devices[{}].address", i),
                    message: format!("duplicate device address '{}'", device.address),
                });
            } else {
                seen.push(normalized);
            }
        }

        errors
    }

    /// Find a device by address (case-insensitive) or alias.
    pub fn device(&self, key: &str) -> Option<&DeviceConfig> {
        self.devices
            .iter()
            .find(|d| d.address.eq_ignore_ascii_case(key) || d.alias.as_deref() == Some(key))
    }
}

/// Timing shared by all coordinators, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub connect_timeout: u64,
    pub keep_alive_interval: u64,
    pub staleness_window: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let defaults = CoordinatorOptions::default();
        Self {
            connect_timeout: defaults.connect_timeout.as_secs(),
            keep_alive_interval: defaults.keep_alive_interval.as_secs(),
            staleness_window: defaults.staleness_window.as_secs(),
        }
    }
}

impl TimingConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        [
            ("timing.connect_timeout", self.connect_timeout),
            ("timing.keep_alive_interval", self.keep_alive_interval),
            ("timing.staleness_window", self.staleness_window),
        ]
        .into_iter()
        .filter(|(_, value)| *value == 0)
        .map(|(field, _)| ValidationError {
            field: field.to_string(),
            message: "must be greater than 0 seconds".to_string(),
        })
        .collect()
    }
}

/// Configuration for one shaver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Bluetooth address (or platform identifier) of the shaver.
    pub address: String,
    /// Friendly name shown instead of the generated one.
    #[serde(default)]
    pub alias: Option<String>,
    /// Poll interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Hold a notification session whenever possible.
    #[serde(default = "default_enable_live_updates")]
    pub enable_live_updates: bool,
    /// Capability bitmask from an earlier pairing; 0 reads it from the device.
    #[serde(default)]
    pub capabilities: u32,
}

/// Minimum poll interval in seconds.
pub const MIN_POLL_INTERVAL: u64 = shaver_core::MIN_POLL_INTERVAL.as_secs();
/// Maximum poll interval in seconds (5 minutes).
pub const MAX_POLL_INTERVAL: u64 = shaver_core::MAX_POLL_INTERVAL.as_secs();

fn default_poll_interval() -> u64 {
    shaver_core::DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_enable_live_updates() -> bool {
    true
}

impl DeviceConfig {
    /// A device entry with default settings.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            alias: None,
            poll_interval: default_poll_interval(),
            enable_live_updates: default_enable_live_updates(),
            capabilities: 0,
        }
    }

    /// Validate device configuration.
    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.address.trim().is_empty() {
            errors.push(ValidationError {
                field: format!("{}.address", prefix),
                message: "device address cannot be empty".to_string(),
            });
        } else if self.address.len() < 3 {
            errors.push(ValidationError {
                field: format!("{}.address", prefix),
                message: format!(
                    "device address '{}' is too short (minimum 3 characters)",
                    self.address
                ),
            });
        }

        if let Some(alias) = &self.alias
            && alias.is_empty()
        {
            errors.push(ValidationError {
                field: format!("{}.alias", prefix),
                message: "alias cannot be empty string (omit it instead)".to_string(),
            });
        }

        if self.poll_interval < MIN_POLL_INTERVAL {
            errors.push(ValidationError {
                field: format!("{}.poll_interval", prefix),
                message: format!(
                    "poll interval {} is too short (minimum {} seconds)",
                    self.poll_interval, MIN_POLL_INTERVAL
                ),
            });
        } else if self.poll_interval > MAX_POLL_INTERVAL {
            errors.push(ValidationError {
                field: format!("{}.poll_interval", prefix),
                message: format!(
                    "poll interval {} is too long (maximum {} seconds)",
                    self.poll_interval, MAX_POLL_INTERVAL
                ),
            });
        }

        if self.capabilities >> 7 != 0 {
            errors.push(ValidationError {
                field: format!("{}.capabilities", prefix),
                message: format!(
                    "capability bits {:#x} set outside the known range 0x00-0x7f",
                    self.capabilities
                ),
            });
        }

        errors
    }

    /// Coordinator options for this device.
    pub fn coordinator_options(&self, timing: &TimingConfig) -> CoordinatorOptions {
        CoordinatorOptions::new()
            .poll_interval(Duration::from_secs(self.poll_interval))
            .enable_live_updates(self.enable_live_updates)
            .connect_timeout(Duration::from_secs(timing.connect_timeout))
            .keep_alive_interval(Duration::from_secs(timing.keep_alive_interval))
            .staleness_window(Duration::from_secs(timing.staleness_window))
            .capabilities(self.capabilities)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path (e.g., `timing.staleness_window` or `devices[0].address`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shaver-bridge")
        .join("config.toml")
}
