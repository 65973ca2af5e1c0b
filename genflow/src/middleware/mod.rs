//! Middleware trait and implementations.
//!
//! Middlewares are the units of request-processing logic the pipeline runs.
//! Their behavior is owned by plugins; the pipeline only decides when they run.

mod definition;

pub use definition::{CardField, MiddlewareDefinition};

use crate::context::MiddlewareContext;
use crate::core::RunStatus;
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline middlewares.
///
/// Ordering between middlewares comes entirely from the dependency graph.
/// A middleware never calls another middleware.
#[async_trait]
pub trait Middleware: Send + Sync + Debug {
    /// Executes the middleware for one request.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The per-request context, shared with the rest of the level
    /// * `next` - Continuation to await when the middleware is done
    ///
    /// # Errors
    ///
    /// Any error halts the pipeline. Its display message becomes the
    /// request's error.
    async fn execute(&self, ctx: &MiddlewareContext, next: Next) -> anyhow::Result<RunStatus>;
}

/// The continuation handed to every middleware invocation.
///
/// Awaiting it signals "done, proceed" and always yields
/// [`RunStatus::Continue`]. It does not invoke any other middleware.
#[derive(Debug, Clone, Copy, Default)]
pub struct Next {
    _private: (),
}

impl Next {
    /// Creates a continuation.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Signals completion.
    pub async fn run(self) -> RunStatus {
        RunStatus::Continue
    }
}

/// A simple function-based middleware.
pub struct FnMiddleware<F>
where
    F: Fn(&MiddlewareContext) -> anyhow::Result<RunStatus> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: Fn(&MiddlewareContext) -> anyhow::Result<RunStatus> + Send + Sync,
{
    /// Creates a new function-based middleware.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnMiddleware<F>
where
    F: Fn(&MiddlewareContext) -> anyhow::Result<RunStatus> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnMiddleware")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&MiddlewareContext) -> anyhow::Result<RunStatus> + Send + Sync,
{
    async fn execute(&self, ctx: &MiddlewareContext, _next: Next) -> anyhow::Result<RunStatus> {
        (self.func)(ctx)
    }
}

/// A middleware that does nothing and continues.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

#[async_trait]
impl Middleware for PassThrough {
    async fn execute(&self, _ctx: &MiddlewareContext, next: Next) -> anyhow::Result<RunStatus> {
        Ok(next.run().await)
    }
}
