//! Dependency graph and registry.
//!
//! The graph holds the fixed lifecycle phases plus every registered
//! middleware, and turns their ordering constraints into an
//! [`ExecutionPlan`] of concurrently runnable levels.

mod dependency_graph;
mod registry;

pub use dependency_graph::{DependencyGraph, ExecutionPlan};
pub use registry::{LevelSummary, MiddlewareRegistry, MiddlewareSummary};
