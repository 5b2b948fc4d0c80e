use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::consts::{
    DEFAULT_ANALYSIS_WORKERS, DEFAULT_BIND_ADDRESS, DEFAULT_JOB_RETENTION_SECONDS,
    DEFAULT_QUEUE_CAPACITY, MAX_INTERVAL_SECONDS,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file `{path}`: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub version: String,
    #[serde(default)]
    pub listener: Listener,
    pub tracing: Option<Tracing>,
    pub state_storage: Option<StateStorageConfig>,
    #[serde(default)]
    pub analysis: AnalysisSettings,
}

impl Configuration {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().display().to_string();
        let contents = fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Read {
            path: path_str.clone(),
            source,
        })?;
        Self::from_yaml(&contents).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path_str,
                source,
            },
            other => other,
        })
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Configuration =
            serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
                path: "<inline>".to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis.workers == 0 {
            return Err(ConfigError::Invalid(
                "analysis.workers must be at least 1".to_string(),
            ));
        }
        if self.analysis.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "analysis.queue_capacity must be at least 1".to_string(),
            ));
        }
        if let Some(seconds) = self.analysis.sweep_interval_seconds {
            if seconds > MAX_INTERVAL_SECONDS {
                return Err(ConfigError::Invalid(format!(
                    "analysis.sweep_interval_seconds must be at most {}",
                    MAX_INTERVAL_SECONDS
                )));
            }
        }
        if self.analysis.job_retention_seconds > MAX_INTERVAL_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "analysis.job_retention_seconds must be at most {}",
                MAX_INTERVAL_SECONDS
            )));
        }
        if let Some(storage) = &self.state_storage {
            if storage.storage_type == StateStorageType::Postgres
                && storage.connection_string.is_none()
            {
                return Err(ConfigError::Invalid(
                    "connection_string is required for postgres state_storage".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listener {
    pub address: String,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            address: DEFAULT_BIND_ADDRESS.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Tracing {
    pub random_sampling: Option<u32>,
    pub opentracing_grpc_endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateStorageConfig {
    #[serde(rename = "type")]
    pub storage_type: StateStorageType,
    pub connection_string: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StateStorageType {
    Memory,
    Postgres,
}

/// Worker pool and sweep scheduling for conversation analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Interval of the sweep over unanalyzed conversations. Disabled when unset.
    pub sweep_interval_seconds: Option<u64>,
    /// How long finished job outcomes stay queryable
    #[serde(default = "default_job_retention_seconds")]
    pub job_retention_seconds: u64,
}

fn default_workers() -> usize {
    DEFAULT_ANALYSIS_WORKERS
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_job_retention_seconds() -> u64 {
    DEFAULT_JOB_RETENTION_SECONDS
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_ANALYSIS_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sweep_interval_seconds: None,
            job_retention_seconds: DEFAULT_JOB_RETENTION_SECONDS,
        }
    }
}
