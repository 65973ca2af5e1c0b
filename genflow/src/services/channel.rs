//! Channel collaborator.

use super::ConfigMap;
use crate::core::ChannelRef;
use crate::errors::GenflowError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A configured generation channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Numeric channel id.
    pub id: u64,
    /// Unique channel name.
    pub name: String,
    /// Whether the channel accepts requests.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// The connector that talks to the generation backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<String>,
    /// Connector settings.
    #[serde(default)]
    pub connector_config: ConfigMap,
    /// Per-middleware config overrides, keyed by middleware name.
    #[serde(default)]
    pub plugin_overrides: HashMap<String, ConfigMap>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl Channel {
    /// Creates an enabled channel with no overrides.
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            enabled: true,
            connector_id: None,
            connector_config: ConfigMap::new(),
            plugin_overrides: HashMap::new(),
            tags: Vec::new(),
        }
    }

    /// Sets the connector.
    #[must_use]
    pub fn with_connector(mut self, connector_id: impl Into<String>, config: ConfigMap) -> Self {
        self.connector_id = Some(connector_id.into());
        self.connector_config = config;
        self
    }

    /// Adds a config override for one middleware.
    #[must_use]
    pub fn with_override(mut self, middleware: impl Into<String>, config: ConfigMap) -> Self {
        self.plugin_overrides.insert(middleware.into(), config);
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Returns the override for a middleware, if any.
    #[must_use]
    pub fn override_for(&self, middleware: &str) -> Option<&ConfigMap> {
        self.plugin_overrides.get(middleware)
    }
}

/// Looks up channel configuration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Returns the channel with this id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn get_channel(&self, id: u64) -> anyhow::Result<Option<Channel>>;

    /// Returns the channel with this name.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn get_channel_by_name(&self, _name: &str) -> anyhow::Result<Option<Channel>> {
        Ok(None)
    }
}

/// An in-memory channel provider.
#[derive(Debug, Default)]
pub struct InMemoryChannelProvider {
    channels: DashMap<u64, Channel>,
}

impl InMemoryChannelProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider seeded with channels.
    #[must_use]
    pub fn with_channels(channels: impl IntoIterator<Item = Channel>) -> Self {
        let provider = Self::new();
        for channel in channels {
            provider.insert(channel);
        }
        provider
    }

    /// Inserts or replaces a channel.
    pub fn insert(&self, channel: Channel) {
        self.channels.insert(channel.id, channel);
    }

    /// Removes a channel.
    pub fn remove(&self, id: u64) -> Option<Channel> {
        self.channels.remove(&id).map(|(_, channel)| channel)
    }

    /// Returns the number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if there are no channels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[async_trait]
impl ChannelProvider for InMemoryChannelProvider {
    async fn get_channel(&self, id: u64) -> anyhow::Result<Option<Channel>> {
        Ok(self.channels.get(&id).map(|c| c.value().clone()))
    }

    async fn get_channel_by_name(&self, name: &str) -> anyhow::Result<Option<Channel>> {
        Ok(self
            .channels
            .iter()
            .find(|c| c.value().name == name)
            .map(|c| c.value().clone()))
    }
}

/// Resolves a channel reference to a channel id.
///
/// Hosts call this before handing a request to the pipeline, which only
/// accepts ids.
///
/// # Errors
///
/// Returns `ChannelNotFound` for an unknown id, `ChannelNameNotFound`
/// when no channel has the given name, or `Collaborator` if the provider fails.
pub async fn resolve_channel_ref(
    provider: &dyn ChannelProvider,
    channel: &ChannelRef,
) -> Result<u64, GenflowError> {
    match channel {
        ChannelRef::Id(id) => provider
            .get_channel(*id)
            .await
            .map_err(|e| GenflowError::Collaborator(e.to_string()))?
            .map(|c| c.id)
            .ok_or(GenflowError::ChannelNotFound(*id)),
        ChannelRef::Name(name) => provider
            .get_channel_by_name(name)
            .await
            .map_err(|e| GenflowError::Collaborator(e.to_string()))?
            .map(|c| c.id)
            .ok_or_else(|| GenflowError::ChannelNameNotFound(name.clone())),
    }
}
