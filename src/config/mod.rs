//! Configuration loading and parsing.
//!
//! Scheduler settings are read from a small YAML file; every field has a
//! default so an absent or partial file still yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::job::DEFAULT_MAX_WORKING_TIME;
use crate::snapshot::DEFAULT_SNAPSHOT_PATH;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("failed to read config '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML from a configuration file.
    #[error("YAML parse error in '{path}': {source}")]
    YamlFileError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Scheduler configuration (rondo.yaml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Location of the queue snapshot file.
    pub snapshot_path: PathBuf,
    /// Working-time budget, in seconds, for jobs that do not set one.
    pub default_max_working_time_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            default_max_working_time_secs: DEFAULT_MAX_WORKING_TIME.as_secs(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::FileReadError {
                path: path.to_path_buf(),
                source,
            }
        })?;

        serde_yaml::from_str(&contents).map_err(|source| ConfigError::YamlFileError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The default working-time budget as a `Duration`.
    pub fn default_max_working_time(&self) -> Duration {
        Duration::from_secs(self.default_max_working_time_secs)
    }
}
