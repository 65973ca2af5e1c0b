//! Collaborator contracts the pipeline consumes.
//!
//! This module provides:
//! - Channel lookup and name resolution
//! - Middleware configuration and enablement policies
//! - A typed service locator

mod channel;
mod config;
mod locator;

pub use channel::{resolve_channel_ref, Channel, ChannelProvider, InMemoryChannelProvider};
#[cfg(test)]
pub use channel::MockChannelProvider;
pub use config::{AlwaysEnabled, EnablementPolicy, InMemoryMiddlewareConfig, MiddlewareConfigSource};
pub use locator::{ServiceKey, ServiceLocator};

/// A JSON object holding middleware configuration.
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;
