//! Middleware registry.

use super::{DependencyGraph, ExecutionPlan};
use crate::core::LifecyclePhase;
use crate::errors::{CycleDetectedError, GenflowError};
use crate::events::{EventSink, NoOpEventSink};
use crate::middleware::{CardField, MiddlewareDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// One middleware in an execution-order summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiddlewareSummary {
    /// Middleware name.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Lifecycle phase.
    pub phase: LifecyclePhase,
    /// Key its configuration and enablement are stored under.
    pub config_key: String,
}

/// One level in an execution-order summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSummary {
    /// Zero-based level index.
    pub level: usize,
    /// Whether the level runs more than one middleware.
    pub parallel: bool,
    /// The members of the level.
    pub middlewares: Vec<MiddlewareSummary>,
}

impl LevelSummary {
    fn from_plan(plan: &ExecutionPlan) -> Vec<Self> {
        plan.levels()
            .iter()
            .enumerate()
            .map(|(level, members)| Self {
                level,
                parallel: members.len() > 1,
                middlewares: members
                    .iter()
                    .map(|d| MiddlewareSummary {
                        name: d.name.clone(),
                        display_name: d.display_name.clone(),
                        phase: d.phase,
                        config_key: d.config_key().to_string(),
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Owns a dependency graph and announces registrations.
///
/// Emits `middleware.added` and `middleware.removed` events.
pub struct MiddlewareRegistry {
    graph: Arc<DependencyGraph>,
    events: Arc<dyn EventSink>,
}

impl Default for MiddlewareRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MiddlewareRegistry {
    /// Creates a registry with an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::with_graph(Arc::new(DependencyGraph::new()))
    }

    /// Creates a registry over an existing graph.
    #[must_use]
    pub fn with_graph(graph: Arc<DependencyGraph>) -> Self {
        Self {
            graph,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Registers a middleware.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRegistered` if the name is taken, or
    /// `InvalidDefinition` for a malformed definition.
    pub fn register(&self, definition: MiddlewareDefinition) -> Result<(), GenflowError> {
        let name = definition.name.clone();
        let phase = definition.phase;
        self.graph.register(definition)?;

        info!(middleware = %name, phase = %phase, "Middleware registered");
        self.events.try_emit(
            "middleware.added",
            Some(serde_json::json!({"middleware": name, "phase": phase})),
        );
        Ok(())
    }

    /// Unregisters a middleware. Returns true if it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.graph.unregister(name);
        if removed {
            info!(middleware = %name, "Middleware unregistered");
            self.events
                .try_emit("middleware.removed", Some(serde_json::json!({"middleware": name})));
        }
        removed
    }

    /// Returns the definition registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<MiddlewareDefinition>> {
        self.graph.get(name)
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.graph.has(name)
    }

    /// Returns all definitions in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<MiddlewareDefinition>> {
        self.graph.middlewares()
    }

    /// Returns the underlying graph.
    #[must_use]
    pub fn graph(&self) -> Arc<DependencyGraph> {
        Arc::clone(&self.graph)
    }

    /// Unregisters every middleware.
    pub fn clear(&self) {
        for name in self.graph.clear() {
            self.events
                .try_emit("middleware.removed", Some(serde_json::json!({"middleware": name})));
        }
    }

    /// Returns every declared card field, deduplicated by `(source, key)`.
    ///
    /// The first declaration in registration order wins.
    #[must_use]
    pub fn card_fields(&self) -> Vec<CardField> {
        let definitions = self.list();
        let mut seen = HashSet::new();
        definitions
            .iter()
            .flat_map(|d| d.card_fields.iter())
            .filter(|f| seen.insert((f.source.clone(), f.key.clone())))
            .cloned()
            .collect()
    }

    /// Returns the middlewares whose configuration lives under `key`.
    ///
    /// A middleware without a config group is keyed by its own name.
    #[must_use]
    pub fn in_config_group(&self, key: &str) -> Vec<Arc<MiddlewareDefinition>> {
        self.list()
            .into_iter()
            .filter(|d| d.config_key() == key)
            .collect()
    }

    /// Returns a serializable summary of the current execution plan.
    ///
    /// # Errors
    ///
    /// Returns `CycleDetectedError` if the graph has a cycle.
    pub fn execution_order(&self) -> Result<Vec<LevelSummary>, CycleDetectedError> {
        let plan = self.graph.build()?;
        Ok(LevelSummary::from_plan(&plan))
    }
}

impl std::fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}
