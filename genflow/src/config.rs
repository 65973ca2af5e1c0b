//! Configuration types for the pipeline and its host.

use crate::errors::GenflowError;
use crate::observability::LoggingConfig;
use crate::services::ConfigMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Configuration for pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of middlewares running at once within a level.
    /// `None` runs the whole level at once.
    #[serde(default)]
    pub max_level_concurrency: Option<usize>,
    /// Whether to shuffle the launch order within a level.
    #[serde(default = "default_randomize")]
    pub randomize_level_order: bool,
    /// Whether a missing channel fails the request.
    ///
    /// Defaults to `true`. Hosts that treat an unknown channel as
    /// "no channel" and run on global config alone should set it to `false`.
    #[serde(default = "default_require_channel")]
    pub require_channel: bool,
}

fn default_randomize() -> bool {
    true
}

fn default_require_channel() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_level_concurrency: None,
            randomize_level_order: default_randomize(),
            require_channel: default_require_channel(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new pipeline configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds concurrency within a level.
    #[must_use]
    pub const fn with_max_level_concurrency(mut self, max: usize) -> Self {
        self.max_level_concurrency = Some(max);
        self
    }

    /// Enables or disables launch-order shuffling.
    #[must_use]
    pub const fn with_randomized_order(mut self, randomize: bool) -> Self {
        self.randomize_level_order = randomize;
        self
    }

    /// Sets whether a missing channel fails the request.
    #[must_use]
    pub const fn with_require_channel(mut self, require: bool) -> Self {
        self.require_channel = require;
        self
    }

    /// Returns the semaphore size for a level of `level_size` members.
    #[must_use]
    pub fn permits_for(&self, level_size: usize) -> usize {
        self.max_level_concurrency
            .map_or(level_size, |max| max.min(level_size))
            .max(1)
    }
}

/// Global settings for one middleware or config group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiddlewareSettings {
    /// Whether the middleware runs by default.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Global configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigMap>,
}

fn default_enabled() -> bool {
    true
}

impl Default for MiddlewareSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            config: None,
        }
    }
}

/// Top-level host configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenflowConfig {
    /// Pipeline execution settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Per-middleware settings.
    #[serde(default)]
    pub middlewares: HashMap<String, MiddlewareSettings>,
}

impl GenflowConfig {
    /// Parses configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns `GenflowError::Config` if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self, GenflowError> {
        serde_json::from_str(json).map_err(|e| GenflowError::Config(format!("Invalid config: {e}")))
    }

    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `GenflowError::Io` if the file cannot be read, or
    /// `GenflowError::Config` if it is malformed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GenflowError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}
