//! Error types for the genflow pipeline.
//!
//! Topology errors (cycles, duplicate or invalid registrations) are raised
//! eagerly at registration or plan-build time. Per-request failures never
//! cross the `execute()` boundary; they are folded into a
//! [`GenerationResult`](crate::core::GenerationResult).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for genflow operations.
#[derive(Debug, Error)]
pub enum GenflowError {
    /// A dependency cycle was detected while building the execution plan.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// A middleware with the same name is already registered.
    #[error("{0}")]
    AlreadyRegistered(#[from] AlreadyRegisteredError),

    /// A middleware definition failed validation.
    #[error("{0}")]
    InvalidDefinition(#[from] InvalidDefinitionError),

    /// A store entry already exists.
    #[error("{0}")]
    StoreConflict(#[from] StoreConflictError),

    /// The channel collaborator has no channel with this id.
    #[error("Channel {0} not found")]
    ChannelNotFound(u64),

    /// The channel collaborator has no channel with this name.
    #[error("Channel '{0}' not found")]
    ChannelNameNotFound(String),

    /// The request named its channel instead of giving an id.
    #[error("Channel name lookup is not supported by the pipeline: '{0}' must be resolved to an id first")]
    ChannelLookupUnsupported(String),

    /// An external collaborator failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// A service with the same name is already registered.
    #[error("Service '{0}' is already registered")]
    ServiceAlreadyRegistered(String),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GenflowError {
    /// Returns the structured diagnostics attached to topology errors.
    #[must_use]
    pub fn error_info(&self) -> Option<&ContractErrorInfo> {
        match self {
            Self::CycleDetected(err) => Some(&err.error_info),
            Self::AlreadyRegistered(err) => Some(&err.error_info),
            Self::InvalidDefinition(err) => Some(&err.error_info),
            _ => None,
        }
    }
}

/// Metadata about a topology error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when the dependency graph contains a cycle.
#[derive(Debug, Clone, Error)]
#[error("Circular dependency detected: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The node names forming the cycle; the first name is repeated at the end.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "GRAPH-CYCLE",
            format!("Middleware graph contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint(
            "Remove one of the before/after declarations in the cycle, or move a middleware to a phase that agrees with its declarations.",
        );

        Self {
            cycle_path,
            error_info: info,
        }
    }

    /// Returns true if the named node takes part in the reported cycle.
    #[must_use]
    pub fn involves(&self, name: &str) -> bool {
        self.cycle_path.iter().any(|n| n == name)
    }
}

/// Error raised when a middleware name is registered twice.
#[derive(Debug, Clone, Error)]
#[error("Middleware \"{name}\" is already registered")]
pub struct AlreadyRegisteredError {
    /// The duplicated middleware name.
    pub name: String,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl AlreadyRegisteredError {
    /// Creates a new duplicate registration error.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let info = ContractErrorInfo::new(
            "REGISTRY-DUPLICATE",
            format!("A middleware named '{name}' already exists"),
        )
        .with_fix_hint("Unregister the existing middleware first or choose a unique name.")
        .with_context_entry("middleware", name.clone());

        Self {
            name,
            error_info: info,
        }
    }
}

/// Error raised when a middleware definition is malformed.
#[derive(Debug, Clone, Error)]
#[error("Invalid middleware definition '{name}': {reason}")]
pub struct InvalidDefinitionError {
    /// The offending middleware name.
    pub name: String,
    /// Why the definition was rejected.
    pub reason: String,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl InvalidDefinitionError {
    /// Creates a new invalid definition error.
    #[must_use]
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let name = name.into();
        let reason = reason.into();
        let info = ContractErrorInfo::new("DEFINITION-INVALID", reason.clone())
            .with_context_entry("middleware", name.clone());

        Self {
            name,
            reason,
            error_info: info,
        }
    }
}

/// Error raised when inserting a store key that already exists.
#[derive(Debug, Clone, Error)]
#[error("Store conflict: key '{key}' already exists")]
pub struct StoreConflictError {
    /// The conflicting key.
    pub key: String,
}

impl StoreConflictError {
    /// Creates a new store conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("middleware", "billing");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.summary, "Test error");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("middleware"), Some(&"billing".to_string()));
    }

    #[test]
    fn test_cycle_detected_error() {
        let err = CycleDetectedError::new(vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "a".to_string(),
        ]);

        assert!(err.to_string().contains("a -> b -> c -> a"));
        assert_eq!(err.error_info.code, "GRAPH-CYCLE");
        assert!(err.involves("b"));
        assert!(!err.involves("d"));
    }

    #[test]
    fn test_already_registered_error() {
        let err = AlreadyRegisteredError::new("cache");
        assert_eq!(err.to_string(), "Middleware \"cache\" is already registered");

        let wrapped: GenflowError = err.into();
        assert_eq!(wrapped.error_info().map(|i| i.code.as_str()), Some("REGISTRY-DUPLICATE"));
    }

    #[test]
    fn test_channel_errors_have_no_contract_info() {
        let err = GenflowError::ChannelNotFound(7);
        assert_eq!(err.to_string(), "Channel 7 not found");
        assert!(err.error_info().is_none());
    }
}
