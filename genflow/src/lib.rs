//! # Genflow
//!
//! A dependency-ordered middleware pipeline for generation requests.
//!
//! Genflow runs pluggable request-processing middlewares in an order derived
//! from their declared constraints:
//!
//! - **Lifecycle phases**: every middleware belongs to one of five fixed phases
//! - **Dependency graph**: `before`/`after` constraints are resolved into levels
//!   of concurrently runnable middlewares, with cycle reporting
//! - **Level-parallel execution**: siblings run concurrently and share a
//!   first-writer-wins abort signal
//! - **Guaranteed finalize**: finalize-phase middlewares run even after a stop
//!   or an error
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use genflow::prelude::*;
//! use std::sync::Arc;
//!
//! let graph = Arc::new(DependencyGraph::new());
//! graph.register(
//!     MiddlewareDefinition::new("billing", Arc::new(Billing::new()))
//!         .with_phase(LifecyclePhase::Prepare),
//! )?;
//! graph.register(
//!     MiddlewareDefinition::new("connector", Arc::new(Connector::new()))
//!         .with_phase(LifecyclePhase::Request),
//! )?;
//!
//! let pipeline = GenerationPipeline::builder(graph)
//!     .channels(Arc::new(channels))
//!     .build()?;
//! pipeline.validate()?;
//!
//! let result = pipeline.execute(GenerationRequest::new(1, "a red fox")).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod graph;
pub mod middleware;
pub mod observability;
pub mod pipeline;
pub mod services;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{GenflowConfig, MiddlewareSettings, PipelineConfig};
    pub use crate::context::MiddlewareContext;
    pub use crate::core::{
        Asset, AssetKind, ChannelRef, GenerationRequest, GenerationResult, InputFile,
        LifecyclePhase, RunStatus,
    };
    pub use crate::errors::{
        AlreadyRegisteredError, ContractErrorInfo, CycleDetectedError, GenflowError,
        InvalidDefinitionError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::graph::{DependencyGraph, ExecutionPlan, MiddlewareRegistry};
    pub use crate::middleware::{CardField, FnMiddleware, Middleware, MiddlewareDefinition, Next};
    pub use crate::observability::{init_logging, LoggingConfig};
    pub use crate::pipeline::{GenerationPipeline, GenerationPipelineBuilder};
    pub use crate::services::{
        resolve_channel_ref, Channel, ChannelProvider, EnablementPolicy,
        InMemoryChannelProvider, InMemoryMiddlewareConfig, MiddlewareConfigSource, ServiceKey,
        ServiceLocator,
    };
}
