//! Mock middlewares for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::context::MiddlewareContext;
use crate::core::{Asset, RunStatus};
use crate::middleware::{Middleware, Next};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mark {
    Start(String),
    Finish(String),
}

#[derive(Debug, Default)]
struct LogState {
    marks: Vec<Mark>,
    active: usize,
    max_active: usize,
}

/// A shared, ordered log of middleware starts and finishes.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    state: Arc<Mutex<LogState>>,
}

impl ExecutionLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `name` started.
    pub fn start(&self, name: &str) {
        let mut state = self.state.lock();
        state.marks.push(Mark::Start(name.to_string()));
        state.active += 1;
        state.max_active = state.max_active.max(state.active);
    }

    /// Records that `name` finished.
    pub fn finish(&self, name: &str) {
        let mut state = self.state.lock();
        state.marks.push(Mark::Finish(name.to_string()));
        state.active = state.active.saturating_sub(1);
    }

    /// Returns true if `name` started.
    #[must_use]
    pub fn ran(&self, name: &str) -> bool {
        self.start_index(name).is_some()
    }

    /// Returns true if `name` finished.
    #[must_use]
    pub fn finished(&self, name: &str) -> bool {
        self.finish_index(name).is_some()
    }

    /// Returns the number of finished middlewares.
    #[must_use]
    pub fn finished_count(&self) -> usize {
        self.state
            .lock()
            .marks
            .iter()
            .filter(|m| matches!(m, Mark::Finish(_)))
            .count()
    }

    /// Returns the highest number of middlewares running at once.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.state.lock().max_active
    }

    /// Returns the names that started, in start order.
    #[must_use]
    pub fn started(&self) -> Vec<String> {
        self.state
            .lock()
            .marks
            .iter()
            .filter_map(|m| match m {
                Mark::Start(name) => Some(name.clone()),
                Mark::Finish(_) => None,
            })
            .collect()
    }

    /// Returns the position of `name`'s start mark.
    #[must_use]
    pub fn start_index(&self, name: &str) -> Option<usize> {
        let state = self.state.lock();
        state
            .marks
            .iter()
            .position(|m| matches!(m, Mark::Start(n) if n == name))
    }

    /// Returns the position of `name`'s finish mark.
    #[must_use]
    pub fn finish_index(&self, name: &str) -> Option<usize> {
        let state = self.state.lock();
        state
            .marks
            .iter()
            .position(|m| matches!(m, Mark::Finish(n) if n == name))
    }

    /// Returns true if `first` finished before `second` started.
    #[must_use]
    pub fn finished_before(&self, first: &str, second: &str) -> bool {
        match (self.finish_index(first), self.start_index(second)) {
            (Some(f), Some(s)) => f < s,
            _ => false,
        }
    }
}

/// A middleware that logs its run and continues.
#[derive(Debug)]
pub struct RecordingMiddleware {
    name: String,
    log: ExecutionLog,
}

impl RecordingMiddleware {
    /// Creates a recording middleware.
    #[must_use]
    pub fn new(name: impl Into<String>, log: ExecutionLog) -> Self {
        Self {
            name: name.into(),
            log,
        }
    }
}

#[async_trait]
impl Middleware for RecordingMiddleware {
    async fn execute(&self, _ctx: &MiddlewareContext, next: Next) -> anyhow::Result<RunStatus> {
        self.log.start(&self.name);
        tokio::task::yield_now().await;
        self.log.finish(&self.name);
        Ok(next.run().await)
    }
}

/// A middleware that logs its run and requests a stop.
#[derive(Debug)]
pub struct StoppingMiddleware {
    name: String,
    log: ExecutionLog,
    delay: Option<Duration>,
}

impl StoppingMiddleware {
    /// Creates a stopping middleware.
    #[must_use]
    pub fn new(name: impl Into<String>, log: ExecutionLog) -> Self {
        Self {
            name: name.into(),
            log,
            delay: None,
        }
    }

    /// Waits before stopping.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Middleware for StoppingMiddleware {
    async fn execute(&self, _ctx: &MiddlewareContext, _next: Next) -> anyhow::Result<RunStatus> {
        self.log.start(&self.name);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.log.finish(&self.name);
        Ok(RunStatus::Stop)
    }
}

/// A middleware that always returns an error.
#[derive(Debug)]
pub struct FailingMiddleware {
    name: String,
    message: String,
    delay: Option<Duration>,
}

impl FailingMiddleware {
    /// Creates a failing middleware.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            delay: None,
        }
    }

    /// Waits before failing.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the middleware name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Middleware for FailingMiddleware {
    async fn execute(&self, _ctx: &MiddlewareContext, _next: Next) -> anyhow::Result<RunStatus> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Err(anyhow::anyhow!("{}", self.message))
    }
}

/// A middleware that sleeps, then continues.
#[derive(Debug)]
pub struct SlowMiddleware {
    name: String,
    delay: Duration,
    log: ExecutionLog,
}

impl SlowMiddleware {
    /// Creates a slow middleware.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration, log: ExecutionLog) -> Self {
        Self {
            name: name.into(),
            delay,
            log,
        }
    }
}

#[async_trait]
impl Middleware for SlowMiddleware {
    async fn execute(&self, _ctx: &MiddlewareContext, _next: Next) -> anyhow::Result<RunStatus> {
        self.log.start(&self.name);
        tokio::time::sleep(self.delay).await;
        self.log.finish(&self.name);
        Ok(RunStatus::Continue)
    }
}

/// A middleware that panics.
#[derive(Debug)]
pub struct PanickingMiddleware {
    message: String,
}

impl PanickingMiddleware {
    /// Creates a panicking middleware.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Middleware for PanickingMiddleware {
    async fn execute(&self, _ctx: &MiddlewareContext, _next: Next) -> anyhow::Result<RunStatus> {
        panic!("{}", self.message)
    }
}

/// A middleware that appends an asset to the output.
#[derive(Debug)]
pub struct OutputMiddleware {
    asset: Asset,
    task_id: Option<i64>,
}

impl OutputMiddleware {
    /// Creates an output middleware.
    #[must_use]
    pub const fn new(asset: Asset) -> Self {
        Self {
            asset,
            task_id: None,
        }
    }

    /// Also records a task id.
    #[must_use]
    pub const fn with_task_id(mut self, task_id: i64) -> Self {
        self.task_id = Some(task_id);
        self
    }
}

#[async_trait]
impl Middleware for OutputMiddleware {
    async fn execute(&self, ctx: &MiddlewareContext, next: Next) -> anyhow::Result<RunStatus> {
        ctx.push_output(self.asset.clone());
        if let Some(task_id) = self.task_id {
            ctx.set_task_id(task_id);
        }
        Ok(next.run().await)
    }
}
