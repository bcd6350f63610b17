use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub persister: PersisterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Filestore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersisterConfig {
    /// Job used by the CLI when none is given on the command line
    pub default_job_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Filestore,
            data_dir: PathBuf::from("./data/results"),
        }
    }
}

impl Default for PersisterConfig {
    fn default() -> Self {
        Self {
            default_job_id: "job-1".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load from a TOML file, falling back to defaults when the file is missing.
    /// Not validated here: command-line overrides may still fill in missing fields.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("Configuration file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.backend == StoreBackend::Filestore
            && self.store.data_dir.as_os_str().is_empty()
        {
            return Err(ConfigError::MissingField {
                field: "store.data_dir".to_string(),
            });
        }
        if self.persister.default_job_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "persister.default_job_id".to_string(),
                value: self.persister.default_job_id.clone(),
            });
        }
        Ok(())
    }
}
