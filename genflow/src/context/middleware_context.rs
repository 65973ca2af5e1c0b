//! Per-request middleware context.

use super::{ContextStore, MiddlewareLogs};
use crate::core::{Asset, ChannelRef, GenerationRequest, InputFile};
use crate::errors::GenflowError;
use crate::events::{EventSink, NoOpEventSink};
use crate::services::{
    Channel, ConfigMap, InMemoryMiddlewareConfig, MiddlewareConfigSource, ServiceKey,
    ServiceLocator,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// State and capabilities for one generation request.
///
/// One context is created per `execute()` call and shared by reference with
/// every middleware. Middlewares in the same level run concurrently, so all
/// mutable slots use interior mutability.
pub struct MiddlewareContext {
    request_id: Uuid,
    created_at: DateTime<Utc>,

    prompt: RwLock<String>,
    files: Vec<InputFile>,
    parameters: RwLock<HashMap<String, Value>>,
    uid: Option<i64>,
    session: Option<Value>,

    channel_id: u64,
    channel: Option<Channel>,

    output: RwLock<Option<Vec<Asset>>>,
    error: RwLock<Option<String>>,
    task_id: RwLock<Option<i64>>,

    store: ContextStore,
    logs: MiddlewareLogs,

    configs: Arc<dyn MiddlewareConfigSource>,
    services: Arc<ServiceLocator>,
    events: Arc<dyn EventSink>,
}

impl MiddlewareContext {
    /// Creates a context for a request targeting `channel_id`.
    ///
    /// Starts with no channel, an empty config source, an empty service
    /// locator and a no-op event sink.
    #[must_use]
    pub fn new(request: GenerationRequest, channel_id: u64) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            created_at: Utc::now(),
            prompt: RwLock::new(request.prompt),
            files: request.files,
            parameters: RwLock::new(request.parameters),
            uid: request.uid,
            session: request.session,
            channel_id,
            channel: None,
            output: RwLock::new(None),
            error: RwLock::new(None),
            task_id: RwLock::new(None),
            store: ContextStore::new(),
            logs: MiddlewareLogs::new(),
            configs: Arc::new(InMemoryMiddlewareConfig::new()),
            services: Arc::new(ServiceLocator::new()),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Creates a context from a request, taking the channel id from it.
    ///
    /// A request that names its channel gets channel id 0.
    #[must_use]
    pub fn for_request(request: GenerationRequest) -> Self {
        let channel_id = match request.channel {
            ChannelRef::Id(id) => id,
            ChannelRef::Name(_) => 0,
        };
        Self::new(request, channel_id)
    }

    /// Attaches the resolved channel.
    #[must_use]
    pub fn with_channel(mut self, channel: Option<Channel>) -> Self {
        self.channel = channel;
        self
    }

    /// Sets the global config source.
    #[must_use]
    pub fn with_config_source(mut self, configs: Arc<dyn MiddlewareConfigSource>) -> Self {
        self.configs = configs;
        self
    }

    /// Sets the service locator.
    #[must_use]
    pub fn with_services(mut self, services: Arc<ServiceLocator>) -> Self {
        self.services = services;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the request id.
    #[must_use]
    pub const fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Returns when the context was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the current prompt.
    #[must_use]
    pub fn prompt(&self) -> String {
        self.prompt.read().clone()
    }

    /// Replaces the prompt.
    pub fn set_prompt(&self, prompt: impl Into<String>) {
        *self.prompt.write() = prompt.into();
    }

    /// Returns the input files.
    #[must_use]
    pub fn files(&self) -> &[InputFile] {
        &self.files
    }

    /// Returns a copy of the generation parameters.
    #[must_use]
    pub fn parameters(&self) -> HashMap<String, Value> {
        self.parameters.read().clone()
    }

    /// Returns one generation parameter.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<Value> {
        self.parameters.read().get(key).cloned()
    }

    /// Sets a generation parameter.
    pub fn set_parameter(&self, key: impl Into<String>, value: Value) {
        self.parameters.write().insert(key.into(), value);
    }

    /// Returns the requesting user id.
    #[must_use]
    pub const fn uid(&self) -> Option<i64> {
        self.uid
    }

    /// Returns the originating session.
    #[must_use]
    pub const fn session(&self) -> Option<&Value> {
        self.session.as_ref()
    }

    /// Returns the target channel id.
    #[must_use]
    pub const fn channel_id(&self) -> u64 {
        self.channel_id
    }

    /// Returns the resolved channel.
    #[must_use]
    pub const fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    /// Returns a copy of the output, `None` until something is produced.
    #[must_use]
    pub fn output(&self) -> Option<Vec<Asset>> {
        self.output.read().clone()
    }

    /// Replaces the output.
    pub fn set_output(&self, assets: Vec<Asset>) {
        *self.output.write() = Some(assets);
    }

    /// Appends one asset to the output.
    pub fn push_output(&self, asset: Asset) {
        self.output.write().get_or_insert_with(Vec::new).push(asset);
    }

    /// Returns the first fatal error message, if any.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.error.read().clone()
    }

    /// Records a fatal error. Only the first one is kept.
    ///
    /// Returns true if this call set the error.
    pub fn set_error(&self, message: impl Into<String>) -> bool {
        let mut slot = self.error.write();
        if slot.is_some() {
            return false;
        }
        *slot = Some(message.into());
        true
    }

    /// Returns the task record id.
    #[must_use]
    pub fn task_id(&self) -> Option<i64> {
        *self.task_id.read()
    }

    /// Sets the task record id.
    pub fn set_task_id(&self, task_id: i64) {
        *self.task_id.write() = Some(task_id);
    }

    /// Returns the inter-middleware store.
    #[must_use]
    pub const fn store(&self) -> &ContextStore {
        &self.store
    }

    /// Returns the configuration for a middleware or config group.
    ///
    /// The global config is merged with the channel's override for `name`;
    /// override keys win. Returns `None` if neither exists.
    pub async fn middleware_config(&self, name: &str) -> Option<ConfigMap> {
        let global = self.configs.middleware_config(name).await;
        let channel_override = self.channel.as_ref().and_then(|c| c.override_for(name));

        if global.is_none() && channel_override.is_none() {
            return None;
        }

        let mut merged = global.unwrap_or_default();
        if let Some(overrides) = channel_override {
            for (key, value) in overrides {
                merged.insert(key.clone(), value.clone());
            }
        }
        Some(merged)
    }

    /// Returns the merged configuration deserialized into `T`.
    ///
    /// # Errors
    ///
    /// Returns `GenflowError::Serialization` if the config does not match `T`.
    pub async fn middleware_config_as<T: DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Option<T>, GenflowError> {
        match self.middleware_config(name).await {
            Some(config) => Ok(Some(serde_json::from_value(Value::Object(config))?)),
            None => Ok(None),
        }
    }

    /// Returns a typed service.
    #[must_use]
    pub fn service<T>(&self, key: &ServiceKey<T>) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.services.get(key)
    }

    /// Returns a service by name if it has type `T`.
    #[must_use]
    pub fn service_named<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.services.get_named(name)
    }

    /// Records diagnostic data for a middleware.
    pub fn set_middleware_log(&self, name: impl Into<String>, data: Value) {
        self.logs.set(name, data);
    }

    /// Returns every middleware's diagnostic data.
    #[must_use]
    pub fn middleware_logs(&self) -> HashMap<String, Value> {
        self.logs.snapshot()
    }

    /// Emits an event tagged with this request's id and channel.
    pub fn emit_event(&self, event_type: &str, data: Option<Value>) {
        let mut payload = match data {
            Some(Value::Object(map)) => map,
            Some(other) => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other);
                map
            }
            None => serde_json::Map::new(),
        };
        payload.insert("request_id".to_string(), Value::String(self.request_id.to_string()));
        payload.insert("channel_id".to_string(), Value::from(self.channel_id));

        self.events.try_emit(event_type, Some(Value::Object(payload)));
    }
}

impl std::fmt::Debug for MiddlewareContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareContext")
            .field("request_id", &self.request_id)
            .field("channel_id", &self.channel_id)
            .field("has_channel", &self.channel.is_some())
            .field("error", &self.error())
            .field("store_keys", &self.store.keys())
            .finish_non_exhaustive()
    }
}
