//! Structured logging setup.
//!
//! Installs a `tracing-subscriber` registry that renders the pipeline's
//! `tracing` events either as JSON or as human-readable text.
//!
//! # Example
//!
//! ```rust,ignore
//! use genflow::observability::{init_logging, LoggingConfig};
//!
//! init_logging(&LoggingConfig::development())?;
//! tracing::info!(channel_id = 3, "Starting generation");
//! ```

use crate::errors::GenflowError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Whether logging is installed at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Filter directive (e.g. "info", "genflow=debug,warn").
    #[serde(default = "default_level")]
    pub level: String,

    /// Whether to output JSON.
    #[serde(default)]
    pub json_format: bool,

    /// Whether to include the target (module path).
    #[serde(default = "default_include_target")]
    pub include_target: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

fn default_include_target() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            level: default_level(),
            json_format: false,
            include_target: default_include_target(),
        }
    }
}

impl LoggingConfig {
    /// Human-readable debug output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            ..Self::default()
        }
    }

    /// JSON output at info level.
    #[must_use]
    pub fn production() -> Self {
        Self {
            json_format: true,
            ..Self::default()
        }
    }

    /// Sets the filter directive.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

/// Initializes the global tracing subscriber.
///
/// Does nothing when logging is disabled.
///
/// # Errors
///
/// Returns `GenflowError::Config` if the filter directive is invalid or a
/// global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), GenflowError> {
    if !config.enabled {
        return Ok(());
    }

    let filter = build_filter(&config.level)?;

    if config.json_format {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| GenflowError::Config(format!("Failed to install logger: {e}")))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| GenflowError::Config(format!("Failed to install logger: {e}")))
    }
}

fn build_filter(level: &str) -> Result<EnvFilter, GenflowError> {
    EnvFilter::try_new(level).map_err(|e| GenflowError::Config(format!("Invalid log level: {e}")))
}
