//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Name of the data source, used in log lines (default: "sakila").
    #[serde(default = "default_name")]
    pub name: String,

    /// Schema file to load instead of the bundled movie-rental schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<PathBuf>,

    /// Fill the bundled schema with the generated sample rows (default: true).
    #[serde(default = "default_true")]
    pub sample_data: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            schema: None,
            sample_data: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive for `tracing_subscriber`, overridden by `RUST_LOG`.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_level() }
    }
}

fn default_name() -> String {
    "sakila".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.name.trim().is_empty() {
            return Err(Error::Config("database.name must not be empty".into()));
        }
        if self.database.sample_data && self.database.schema.is_some() {
            return Err(Error::Config(
                "database.sample_data only applies to the bundled schema, unset database.schema".into(),
            ));
        }
        EnvFilter::try_new(&self.logging.level)
            .map_err(|e| Error::Config(format!("logging.level {:?}: {e}", self.logging.level)))?;
        Ok(())
    }
}

impl LoggingConfig {
    /// `RUST_LOG` when set, the configured level otherwise.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}
