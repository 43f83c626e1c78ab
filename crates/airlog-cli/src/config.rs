//! Configuration file management.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use airlog_core::FetchConfig;
use airlog_types::DeviceId;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Longest accepted chunk timeout.
const MAX_CHUNK_TIMEOUT_SECS: u64 = 3600;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default device id for import, export and listing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    /// Where records are persisted
    #[serde(default)]
    pub storage: StorageConfig,

    /// History backfill settings
    #[serde(default)]
    pub fetch: FetchSettings,
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Canonical CSV file. A leading `~` is expanded to the home directory.
    #[serde(default = "airlog_store::default_store_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: airlog_store::default_store_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "storage path cannot be empty".to_string(),
            });
        }
        errors
    }

    /// The store path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        expand_tilde(&self.path)
    }
}

/// Backfill settings, mapped onto [`FetchConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Seconds without a chunk before a backfill is abandoned
    #[serde(default = "default_chunk_timeout_secs")]
    pub chunk_timeout_secs: u64,

    /// Metric selector byte sent with the backfill command
    #[serde(default)]
    pub metric_selector: u8,

    /// Milliseconds between timeout checks
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_chunk_timeout_secs() -> u64 {
    30
}

fn default_tick_interval_ms() -> u64 {
    1000
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            chunk_timeout_secs: default_chunk_timeout_secs(),
            metric_selector: 0,
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl FetchSettings {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.chunk_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "fetch.chunk_timeout_secs".to_string(),
                message: "chunk timeout must be greater than 0".to_string(),
            });
        } else if self.chunk_timeout_secs > MAX_CHUNK_TIMEOUT_SECS {
            errors.push(ValidationError {
                field: "fetch.chunk_timeout_secs".to_string(),
                message: format!(
                    "chunk timeout {} is too long (maximum {} seconds)",
                    self.chunk_timeout_secs, MAX_CHUNK_TIMEOUT_SECS
                ),
            });
        }

        if self.tick_interval_ms == 0 {
            errors.push(ValidationError {
                field: "fetch.tick_interval_ms".to_string(),
                message: "tick interval must be greater than 0".to_string(),
            });
        } else if self.chunk_timeout_secs > 0
            && self.tick_interval_ms > self.chunk_timeout_secs * 1000
        {
            errors.push(ValidationError {
                field: "fetch.tick_interval_ms".to_string(),
                message: "tick interval cannot exceed the chunk timeout".to_string(),
            });
        }

        errors
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    pub fn to_fetch_config(&self) -> FetchConfig {
        FetchConfig::default()
            .metric(self.metric_selector)
            .chunk_timeout(self.chunk_timeout())
            .tick_interval(Duration::from_millis(self.tick_interval_ms))
    }
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path (e.g., `fetch.chunk_timeout_secs`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Config {
    /// Default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("airlog")
            .join("config.toml")
    }

    /// Load config from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Load config from a file, or return the default if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Collect every validation error.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.device.as_deref().is_some_and(|d| d.trim().is_empty()) {
            errors.push(ValidationError {
                field: "device".to_string(),
                message: "device id cannot be empty".to_string(),
            });
        }
        errors.extend(self.storage.validate());
        errors.extend(self.fetch.validate());
        errors
    }

    /// Fail with every validation error listed.
    pub fn ensure_valid(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            return Ok(());
        }
        let listed = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");
        anyhow::bail!("Configuration validation failed:\n{}", listed)
    }
}

/// Resolve device from arg (or env var, via clap) then config.
pub fn resolve_device(device: Option<String>, config: &Config) -> Option<DeviceId> {
    device
        .or_else(|| config.device.clone())
        .filter(|d| !d.trim().is_empty())
        .map(DeviceId::from)
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.storage.path, airlog_store::default_store_path());
        assert_eq!(config.fetch.chunk_timeout_secs, 30);
        assert_eq!(config.fetch.metric_selector, 0);
        assert_eq!(config.fetch.tick_interval_ms, 1000);
    }

    #[test]
    fn test_config_parse_sample() {
        let toml = r#"
            device = "kitchen"

            [storage]
            path = "/var/lib/airlog/records.csv"

            [fetch]
            chunk_timeout_secs = 10
            metric_selector = 1
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.device.as_deref(), Some("kitchen"));
        assert_eq!(config.storage.path, PathBuf::from("/var/lib/airlog/records.csv"));
        assert_eq!(config.fetch.chunk_timeout_secs, 10);
        assert_eq!(config.fetch.metric_selector, 1);
        // Missing keys fall back to defaults
        assert_eq!(config.fetch.tick_interval_ms, 1000);
    }

    #[test]
    fn test_fetch_settings_map_to_fetch_config() {
        let settings = FetchSettings {
            chunk_timeout_secs: 5,
            metric_selector: 2,
            tick_interval_ms: 250,
        };
        let fetch = settings.to_fetch_config();
        assert_eq!(fetch.metric, 2);
        assert_eq!(fetch.chunk_timeout, Duration::from_secs(5));
        assert_eq!(fetch.tick_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let config = Config {
            device: Some("  ".to_string()),
            storage: StorageConfig {
                path: PathBuf::new(),
            },
            fetch: FetchSettings {
                chunk_timeout_secs: 0,
                metric_selector: 0,
                tick_interval_ms: 0,
            },
        };
        let fields: Vec<_> = config.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "device",
                "storage.path",
                "fetch.chunk_timeout_secs",
                "fetch.tick_interval_ms"
            ]
        );
        let err = config.ensure_valid().unwrap_err().to_string();
        assert!(err.contains("storage path cannot be empty"));
    }

    #[test]
    fn test_validate_tick_longer_than_timeout() {
        let settings = FetchSettings {
            chunk_timeout_secs: 1,
            metric_selector: 0,
            tick_interval_ms: 5000,
        };
        let errors = settings.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "fetch.tick_interval_ms");
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let config = Config {
            device: Some("office".to_string()),
            storage: StorageConfig {
                path: PathBuf::from("/tmp/records.csv"),
            },
            fetch: FetchSettings {
                chunk_timeout_secs: 45,
                metric_selector: 3,
                tick_interval_ms: 500,
            },
        };
        config.save(&config_path).unwrap();
        assert_eq!(Config::load(&config_path).unwrap(), config);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[fetch\nchunk_timeout_secs = ").unwrap();
        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config"));
    }

    #[test]
    fn test_resolve_device_prefers_arg() {
        let config = Config {
            device: Some("config-device".to_string()),
            ..Default::default()
        };
        let result = resolve_device(Some("arg-device".to_string()), &config);
        assert_eq!(result, Some(DeviceId::new("arg-device")));
        assert_eq!(resolve_device(None, &config), Some(DeviceId::new("config-device")));
        assert_eq!(resolve_device(None, &Config::default()), None);
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde(Path::new("~/data/records.csv"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("data/records.csv"));
        }
        assert_eq!(
            expand_tilde(Path::new("/abs/records.csv")),
            PathBuf::from("/abs/records.csv")
        );
    }
}
