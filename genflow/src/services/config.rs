//! Middleware configuration and enablement collaborators.

use super::{Channel, ConfigMap};
use crate::config::MiddlewareSettings;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

/// Supplies the global configuration of a middleware or config group.
#[async_trait]
pub trait MiddlewareConfigSource: Send + Sync {
    /// Returns the global config for `name`, if any.
    async fn middleware_config(&self, name: &str) -> Option<ConfigMap>;
}

/// Decides whether a middleware runs for a channel.
#[async_trait]
pub trait EnablementPolicy: Send + Sync {
    /// Returns true if `name` should run for `channel`.
    async fn is_middleware_enabled(&self, name: &str, channel: Option<&Channel>) -> bool;
}

/// A policy that enables every middleware.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysEnabled;

#[async_trait]
impl EnablementPolicy for AlwaysEnabled {
    async fn is_middleware_enabled(&self, _name: &str, _channel: Option<&Channel>) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
struct Entry {
    enabled: bool,
    config: Option<ConfigMap>,
}

/// In-memory global middleware settings.
///
/// Serves as both config source and enablement policy. Unknown middlewares
/// are enabled. A boolean `enabled` key in the channel's override for a
/// middleware takes precedence over the global flag.
#[derive(Debug, Default)]
pub struct InMemoryMiddlewareConfig {
    entries: DashMap<String, Entry>,
}

impl InMemoryMiddlewareConfig {
    /// Creates an empty config store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &HashMap<String, MiddlewareSettings>) -> Self {
        let store = Self::new();
        for (name, s) in settings {
            store.entries.insert(
                name.clone(),
                Entry {
                    enabled: s.enabled,
                    config: s.config.clone(),
                },
            );
        }
        store
    }

    /// Sets the global config for a middleware or group.
    pub fn set_config(&self, name: impl Into<String>, config: ConfigMap) {
        self.entries
            .entry(name.into())
            .and_modify(|e| e.config = Some(config.clone()))
            .or_insert(Entry {
                enabled: true,
                config: Some(config),
            });
    }

    /// Enables or disables a middleware globally.
    pub fn set_enabled(&self, name: impl Into<String>, enabled: bool) {
        self.entries
            .entry(name.into())
            .and_modify(|e| e.enabled = enabled)
            .or_insert(Entry {
                enabled,
                config: None,
            });
    }
}

#[async_trait]
impl MiddlewareConfigSource for InMemoryMiddlewareConfig {
    async fn middleware_config(&self, name: &str) -> Option<ConfigMap> {
        self.entries.get(name).and_then(|e| e.config.clone())
    }
}

#[async_trait]
impl EnablementPolicy for InMemoryMiddlewareConfig {
    async fn is_middleware_enabled(&self, name: &str, channel: Option<&Channel>) -> bool {
        let channel_flag = channel
            .and_then(|c| c.override_for(name))
            .and_then(|o| o.get("enabled"))
            .and_then(serde_json::Value::as_bool);

        if let Some(enabled) = channel_flag {
            return enabled;
        }

        self.entries.get(name).map_or(true, |e| e.enabled)
    }
}
