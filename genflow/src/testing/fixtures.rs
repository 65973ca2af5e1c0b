//! Test fixtures for pipeline testing.

use std::sync::Arc;

use super::ExecutionLog;
use crate::config::PipelineConfig;
use crate::core::{GenerationRequest, GenerationResult};
use crate::errors::GenflowError;
use crate::events::CollectingEventSink;
use crate::graph::DependencyGraph;
use crate::middleware::MiddlewareDefinition;
use crate::pipeline::GenerationPipeline;
use crate::services::{Channel, InMemoryChannelProvider, InMemoryMiddlewareConfig, ServiceLocator};

/// Channel id every harness starts with.
pub const TEST_CHANNEL_ID: u64 = 1;

/// Wires a graph, in-memory collaborators and a collecting event sink.
#[derive(Debug)]
pub struct PipelineHarness {
    /// The middleware graph.
    pub graph: Arc<DependencyGraph>,
    /// Known channels. Starts with [`TEST_CHANNEL_ID`].
    pub channels: Arc<InMemoryChannelProvider>,
    /// Global settings, used as config source and enablement policy.
    pub settings: Arc<InMemoryMiddlewareConfig>,
    /// Registered services.
    pub services: Arc<ServiceLocator>,
    /// Every emitted event.
    pub events: Arc<CollectingEventSink>,
    /// Shared log for mock middlewares.
    pub log: ExecutionLog,
    /// Execution config.
    pub config: PipelineConfig,
}

impl Default for PipelineHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineHarness {
    /// Creates a harness with one channel and no middlewares.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: Arc::new(DependencyGraph::new()),
            channels: Arc::new(InMemoryChannelProvider::with_channels([Channel::new(
                TEST_CHANNEL_ID,
                "test",
            )])),
            settings: Arc::new(InMemoryMiddlewareConfig::new()),
            services: Arc::new(ServiceLocator::new()),
            events: Arc::new(CollectingEventSink::new()),
            log: ExecutionLog::new(),
            config: PipelineConfig::default(),
        }
    }

    /// Sets the execution config.
    #[must_use]
    pub const fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a middleware.
    ///
    /// # Errors
    ///
    /// Propagates registration errors.
    pub fn register(&self, definition: MiddlewareDefinition) -> Result<(), GenflowError> {
        self.graph.register(definition)
    }

    /// Builds a pipeline over the harness collaborators.
    ///
    /// # Errors
    ///
    /// Propagates builder errors.
    pub fn pipeline(&self) -> Result<GenerationPipeline, GenflowError> {
        GenerationPipeline::builder(Arc::clone(&self.graph))
            .channels(self.channels.clone())
            .settings(Arc::clone(&self.settings))
            .services(Arc::clone(&self.services))
            .events(self.events.clone())
            .config(self.config.clone())
            .build()
    }

    /// Returns a request for the test channel.
    #[must_use]
    pub fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest::new(TEST_CHANNEL_ID, prompt)
    }

    /// Builds a pipeline and runs one request on the test channel.
    ///
    /// # Errors
    ///
    /// Propagates builder errors.
    pub async fn run(&self, prompt: &str) -> Result<GenerationResult, GenflowError> {
        Ok(self.pipeline()?.execute(Self::request(prompt)).await)
    }
}
