//! Per-request pipeline execution.

use super::level::{run_level, SiblingPolicy};
use crate::config::PipelineConfig;
use crate::context::MiddlewareContext;
use crate::core::{ChannelRef, GenerationRequest, GenerationResult, LevelVerdict};
use crate::errors::GenflowError;
use crate::events::{EventSink, NoOpEventSink};
use crate::graph::{DependencyGraph, ExecutionPlan};
use crate::middleware::MiddlewareDefinition;
use crate::observability::SpanTimer;
use crate::services::{
    AlwaysEnabled, ChannelProvider, EnablementPolicy, InMemoryMiddlewareConfig,
    MiddlewareConfigSource, ServiceLocator,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Runs generation requests through the middleware graph.
///
/// Non-finalize levels run in plan order until one stops or fails. The
/// finalize middlewares then always run. Every error ends up in the returned
/// [`GenerationResult`].
pub struct GenerationPipeline {
    graph: Arc<DependencyGraph>,
    channels: Arc<dyn ChannelProvider>,
    configs: Arc<dyn MiddlewareConfigSource>,
    enablement: Arc<dyn EnablementPolicy>,
    services: Arc<ServiceLocator>,
    events: Arc<dyn EventSink>,
    config: PipelineConfig,
}

impl GenerationPipeline {
    /// Starts building a pipeline over a graph.
    #[must_use]
    pub fn builder(graph: Arc<DependencyGraph>) -> GenerationPipelineBuilder {
        GenerationPipelineBuilder::new(graph)
    }

    /// Returns the graph.
    #[must_use]
    pub fn graph(&self) -> &Arc<DependencyGraph> {
        &self.graph
    }

    /// Returns the execution config.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Builds the execution plan now, so a bad topology fails at startup.
    ///
    /// # Errors
    ///
    /// Returns `CycleDetected` if the graph has a cycle.
    pub fn validate(&self) -> Result<Arc<ExecutionPlan>, GenflowError> {
        Ok(self.graph.build()?)
    }

    /// Executes one generation request.
    ///
    /// Never fails: errors are reported through the result.
    pub async fn execute(&self, request: GenerationRequest) -> GenerationResult {
        let timer = SpanTimer::start("pipeline");

        let channel_id = match &request.channel {
            ChannelRef::Id(id) => *id,
            ChannelRef::Name(name) => {
                let err = GenflowError::ChannelLookupUnsupported(name.clone());
                error!(channel = %name, error = %err, "Cannot resolve channel by name");
                return GenerationResult::failure(err.to_string(), timer.finish());
            }
        };

        let plan = match self.graph.build() {
            Ok(plan) => plan,
            Err(err) => {
                error!(channel_id, error = %err, "Failed to build execution plan");
                self.events.try_emit(
                    "pipeline.failed",
                    Some(json!({"channel_id": channel_id, "error": err.to_string()})),
                );
                return GenerationResult::failure(err.to_string(), timer.finish());
            }
        };

        if plan.is_empty() {
            warn!(channel_id, "No middlewares to execute");
            return GenerationResult::empty(timer.finish());
        }

        let ctx = match self.create_context(request, channel_id).await {
            Ok(ctx) => Arc::new(ctx),
            Err(err) => {
                error!(channel_id, error = %err, "Failed to create middleware context");
                return GenerationResult::failure(err.to_string(), timer.finish());
            }
        };

        info!(
            channel_id,
            request_id = %ctx.request_id(),
            levels = plan.len(),
            "Starting generation"
        );
        ctx.emit_event("pipeline.started", Some(json!({"levels": plan.len()})));

        let halted = self.run_main_levels(&plan, &ctx).await;
        self.run_finalize_levels(&plan, &ctx).await;

        let duration_ms = timer.finish();
        let output = ctx.output().unwrap_or_default();

        match halted {
            Some(LevelVerdict::Error { by, message }) => {
                ctx.emit_event(
                    "pipeline.failed",
                    Some(json!({"middleware": by, "error": message, "duration_ms": duration_ms})),
                );
                GenerationResult::failure(message, duration_ms).with_task_id(ctx.task_id())
            }
            Some(LevelVerdict::Stop { by }) => {
                info!(middleware = %by, duration_ms, "Pipeline stopped by middleware");
                ctx.emit_event(
                    "pipeline.stopped",
                    Some(json!({"middleware": by, "duration_ms": duration_ms})),
                );
                GenerationResult::success(output, duration_ms)
                    .with_task_id(ctx.task_id())
                    .with_stopped_by(Some(by))
            }
            Some(LevelVerdict::Continue) | None => {
                info!(duration_ms, assets = output.len(), "Pipeline completed");
                ctx.emit_event(
                    "pipeline.completed",
                    Some(json!({"duration_ms": duration_ms, "assets": output.len()})),
                );
                GenerationResult::success(output, duration_ms).with_task_id(ctx.task_id())
            }
        }
    }

    async fn create_context(
        &self,
        request: GenerationRequest,
        channel_id: u64,
    ) -> Result<MiddlewareContext, GenflowError> {
        let channel = self
            .channels
            .get_channel(channel_id)
            .await
            .map_err(|e| GenflowError::Collaborator(e.to_string()))?;

        if channel.is_none() {
            if self.config.require_channel {
                return Err(GenflowError::ChannelNotFound(channel_id));
            }
            warn!(channel_id, "Channel not found, running with global config only");
        }

        Ok(MiddlewareContext::new(request, channel_id)
            .with_channel(channel)
            .with_config_source(Arc::clone(&self.configs))
            .with_services(Arc::clone(&self.services))
            .with_events(Arc::clone(&self.events)))
    }

    /// Runs the non-finalize members of each level. Returns the verdict of
    /// the level that halted the pipeline, if any.
    async fn run_main_levels(
        &self,
        plan: &ExecutionPlan,
        ctx: &Arc<MiddlewareContext>,
    ) -> Option<LevelVerdict> {
        for (index, level) in plan.levels().iter().enumerate() {
            let members: Vec<_> = level.iter().filter(|d| !d.is_finalize()).cloned().collect();
            let enabled = self.filter_enabled(members, ctx).await;
            if enabled.is_empty() {
                continue;
            }

            let report =
                run_level(enabled, Arc::clone(ctx), &self.config, SiblingPolicy::AbortOnHalt).await;
            debug!(
                level = index,
                members = report.outcomes.len(),
                skipped = report.skipped_count(),
                "Level finished"
            );
            match report.verdict {
                LevelVerdict::Continue => {}
                LevelVerdict::Error { ref by, ref message } => {
                    error!(middleware = %by, error = %message, "Middleware error halted the pipeline");
                    ctx.set_error(message.clone());
                    return Some(report.verdict);
                }
                LevelVerdict::Stop { .. } => return Some(report.verdict),
            }
        }
        None
    }

    /// Runs the finalize members of each level. Members never skip each
    /// other, and failures are logged only.
    async fn run_finalize_levels(&self, plan: &ExecutionPlan, ctx: &Arc<MiddlewareContext>) {
        for level in plan.levels() {
            let members: Vec<_> = level.iter().filter(|d| d.is_finalize()).cloned().collect();
            let enabled = self.filter_enabled(members, ctx).await;
            if enabled.is_empty() {
                continue;
            }

            let report =
                run_level(enabled, Arc::clone(ctx), &self.config, SiblingPolicy::RunAll).await;
            if let LevelVerdict::Error { by, message } = report.verdict {
                warn!(middleware = %by, error = %message, "Finalize middleware failed");
            }
        }
    }

    async fn filter_enabled(
        &self,
        members: Vec<Arc<MiddlewareDefinition>>,
        ctx: &MiddlewareContext,
    ) -> Vec<Arc<MiddlewareDefinition>> {
        let mut enabled = Vec::with_capacity(members.len());
        for definition in members {
            if self
                .enablement
                .is_middleware_enabled(&definition.name, ctx.channel())
                .await
            {
                enabled.push(definition);
            } else {
                debug!(middleware = %definition.name, "Skipping disabled middleware");
                ctx.emit_event(
                    "middleware.skipped",
                    Some(json!({"middleware": definition.name, "reason": "disabled"})),
                );
            }
        }
        enabled
    }
}

impl std::fmt::Debug for GenerationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationPipeline")
            .field("graph", &self.graph)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`GenerationPipeline`].
pub struct GenerationPipelineBuilder {
    graph: Arc<DependencyGraph>,
    channels: Option<Arc<dyn ChannelProvider>>,
    configs: Option<Arc<dyn MiddlewareConfigSource>>,
    enablement: Option<Arc<dyn EnablementPolicy>>,
    services: Option<Arc<ServiceLocator>>,
    events: Option<Arc<dyn EventSink>>,
    config: PipelineConfig,
}

impl GenerationPipelineBuilder {
    /// Creates a builder over a graph.
    #[must_use]
    pub fn new(graph: Arc<DependencyGraph>) -> Self {
        Self {
            graph,
            channels: None,
            configs: None,
            enablement: None,
            services: None,
            events: None,
            config: PipelineConfig::default(),
        }
    }

    /// Sets the channel provider. Required.
    #[must_use]
    pub fn channels(mut self, channels: Arc<dyn ChannelProvider>) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Sets the global middleware config source.
    #[must_use]
    pub fn configs(mut self, configs: Arc<dyn MiddlewareConfigSource>) -> Self {
        self.configs = Some(configs);
        self
    }

    /// Sets the enablement policy.
    #[must_use]
    pub fn enablement(mut self, enablement: Arc<dyn EnablementPolicy>) -> Self {
        self.enablement = Some(enablement);
        self
    }

    /// Uses one in-memory settings store as both config source and
    /// enablement policy.
    #[must_use]
    pub fn settings(self, settings: Arc<InMemoryMiddlewareConfig>) -> Self {
        self.configs(settings.clone()).enablement(settings)
    }

    /// Sets the service locator.
    #[must_use]
    pub fn services(mut self, services: Arc<ServiceLocator>) -> Self {
        self.services = Some(services);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Sets the execution config.
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `GenflowError::Config` if no channel provider was set.
    pub fn build(self) -> Result<GenerationPipeline, GenflowError> {
        let channels = self.channels.ok_or_else(|| {
            GenflowError::Config("GenerationPipeline requires a channel provider".to_string())
        })?;

        Ok(GenerationPipeline {
            graph: self.graph,
            channels,
            configs: self
                .configs
                .unwrap_or_else(|| Arc::new(InMemoryMiddlewareConfig::new())),
            enablement: self.enablement.unwrap_or_else(|| Arc::new(AlwaysEnabled)),
            services: self.services.unwrap_or_default(),
            events: self.events.unwrap_or_else(|| Arc::new(NoOpEventSink)),
            config: self.config,
        })
    }
}

impl std::fmt::Debug for GenerationPipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationPipelineBuilder")
            .field("has_channels", &self.channels.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
