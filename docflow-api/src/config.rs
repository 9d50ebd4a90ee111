//! Service configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via DOCFLOW_CONFIG or --config)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Request limits.
    pub limits: LimitsConfig,
    /// Timer hand-off configuration.
    pub timers: TimersConfig,
}

impl Config {
    /// Loads configuration from `path`, or from DOCFLOW_CONFIG when no path is
    /// given, then applies environment variable overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var("DOCFLOW_CONFIG") {
                Ok(path) => Self::from_file(&path)?,
                Err(_) => Self::default(),
            },
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        self.storage.apply_overrides(&var);
        self.limits.apply_overrides(&var);
        self.timers.apply_overrides(&var);
    }

    /// Checks values that deserialize fine but cannot be served.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_definition_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_definition_bytes must be greater than zero".to_string(),
            ));
        }
        if self.storage.backend == StorageBackend::File
            && self.storage.data_dir.as_os_str().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "file storage requires storage.data_dir".to_string(),
            ));
        }
        Ok(())
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local, lost on exit.
    #[default]
    Memory,
    /// JSON files under `data_dir`.
    File,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::File => "file",
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Data directory for the file backend.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl StorageConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(backend) = var("DOCFLOW_STORAGE") {
            match backend.to_lowercase().as_str() {
                "memory" => self.backend = StorageBackend::Memory,
                "file" => self.backend = StorageBackend::File,
                other => tracing::warn!("Ignoring unknown DOCFLOW_STORAGE '{}'", other),
            }
        }

        if let Some(dir) = var("DOCFLOW_DATA") {
            self.data_dir = PathBuf::from(dir);
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted workflow definition, in bytes of JSON.
    pub max_definition_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_definition_bytes: 1024 * 1024,
        }
    }
}

impl LimitsConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(max) = var("DOCFLOW_MAX_DEFINITION_BYTES") {
            if let Ok(n) = max.parse() {
                self.max_definition_bytes = n;
            }
        }
    }
}

/// Timer hand-off configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimersConfig {
    /// Keep an in-process timer queue that POLL_TIMERS drains.
    pub enabled: bool,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl TimersConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(enabled) = var("DOCFLOW_TIMERS_ENABLED") {
            self.enabled = enabled == "1" || enabled.to_lowercase() == "true";
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.limits.max_definition_bytes, 1024 * 1024);
        assert!(config.timers.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docflow.yaml");
        std::fs::write(
            &path,
            "storage:\n  backend: file\n  data_dir: /var/lib/docflow\nlimits:\n  max_definition_bytes: 4096\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/docflow"));
        assert_eq!(config.limits.max_definition_bytes, 4096);
        // Sections missing from the file keep their defaults.
        assert!(config.timers.enabled);
    }

    #[test]
    fn test_file_errors_carry_path() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.yaml");
        let err = Config::from_file(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(..)));
        assert!(err.to_string().contains("missing.yaml"));

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "limits: [1, 2").unwrap();
        let err = Config::from_file(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(..)));
        assert!(err.to_string().contains("bad.yaml"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DOCFLOW_STORAGE", "FILE"),
            ("DOCFLOW_DATA", "/tmp/docflow"),
            ("DOCFLOW_MAX_DEFINITION_BYTES", "2048"),
            ("DOCFLOW_TIMERS_ENABLED", "false"),
        ]
        .into();

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/docflow"));
        assert_eq!(config.limits.max_definition_bytes, 2048);
        assert!(!config.timers.enabled);
    }

    #[test]
    fn test_bad_overrides_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            "DOCFLOW_STORAGE" => Some("postgres".to_string()),
            "DOCFLOW_MAX_DEFINITION_BYTES" => Some("lots".to_string()),
            _ => None,
        });
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.limits.max_definition_bytes, 1024 * 1024);
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        config.limits.max_definition_bytes = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = Config::default();
        config.storage.backend = StorageBackend::File;
        config.storage.data_dir = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.storage.backend, config.storage.backend);
        assert_eq!(
            parsed.limits.max_definition_bytes,
            config.limits.max_definition_bytes
        );
    }
}
