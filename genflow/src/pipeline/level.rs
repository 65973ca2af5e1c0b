//! Concurrent execution of one level.

use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::context::MiddlewareContext;
use crate::core::{LevelVerdict, MiddlewareOutcome};
use crate::middleware::{MiddlewareDefinition, Next};
use crate::observability::SpanTimer;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use rand::seq::SliceRandom;
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

/// How a halting member affects siblings that have not started yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SiblingPolicy {
    /// The first stop or failure skips unstarted siblings.
    AbortOnHalt,
    /// Every member runs regardless of its siblings.
    RunAll,
}

/// What happened to every member of a level.
#[derive(Debug, Clone)]
pub(crate) struct LevelReport {
    /// Per-middleware outcomes in completion order.
    pub outcomes: Vec<(String, MiddlewareOutcome)>,
    pub verdict: LevelVerdict,
}

impl LevelReport {
    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == MiddlewareOutcome::Skipped)
            .count()
    }

    #[cfg(test)]
    pub fn outcome_of(&self, name: &str) -> Option<&MiddlewareOutcome> {
        self.outcomes.iter().find(|(n, _)| n == name).map(|(_, o)| o)
    }
}

/// Runs every member of a level concurrently and waits for all of them.
///
/// Under [`SiblingPolicy::AbortOnHalt`] members share one cancellation token.
/// The first member to stop or fail trips it; members that have not started
/// yet observe it and are skipped. In-flight members always run to completion.
pub(crate) async fn run_level(
    mut members: Vec<Arc<MiddlewareDefinition>>,
    ctx: Arc<MiddlewareContext>,
    config: &PipelineConfig,
    policy: SiblingPolicy,
) -> LevelReport {
    if config.randomize_level_order {
        members.shuffle(&mut rand::thread_rng());
    }

    let token = Arc::new(CancellationToken::new());
    let semaphore = Arc::new(Semaphore::new(config.permits_for(members.len())));

    let mut tasks = FuturesUnordered::new();
    for definition in members {
        let name = definition.name.clone();
        let handle = tokio::spawn(run_member(
            definition,
            Arc::clone(&ctx),
            Arc::clone(&token),
            Arc::clone(&semaphore),
            policy,
        ));
        tasks.push(async move { (name, handle.await) });
    }

    let mut outcomes = Vec::with_capacity(tasks.len());
    while let Some((name, joined)) = tasks.next().await {
        let outcome = joined.unwrap_or_else(|e| {
            if policy == SiblingPolicy::AbortOnHalt {
                token.cancel(format!("{name} failed"));
            }
            let message = format!("Middleware task failed: {e}");
            MiddlewareOutcome::Failed(failure_message(&name, &message))
        });
        outcomes.push((name, outcome));
    }

    let verdict = verdict_of(&outcomes);
    LevelReport { outcomes, verdict }
}

async fn run_member(
    definition: Arc<MiddlewareDefinition>,
    ctx: Arc<MiddlewareContext>,
    token: Arc<CancellationToken>,
    semaphore: Arc<Semaphore>,
    policy: SiblingPolicy,
) -> MiddlewareOutcome {
    let name = definition.name.as_str();

    let Ok(_permit) = semaphore.acquire_owned().await else {
        return MiddlewareOutcome::Failed("Level semaphore closed".to_string());
    };

    if token.is_cancelled() {
        let reason = token.reason();
        debug!(middleware = %name, reason = ?reason, "Skipping middleware, level aborted");
        ctx.emit_event(
            "middleware.skipped",
            Some(json!({"middleware": name, "reason": reason})),
        );
        return MiddlewareOutcome::Skipped;
    }

    info!(middleware = %name, phase = %definition.phase, "Executing middleware");
    ctx.emit_event("middleware.started", Some(json!({"middleware": name})));

    let timer = SpanTimer::start(name);
    let result = AssertUnwindSafe(definition.handler.execute(&ctx, Next::new()))
        .catch_unwind()
        .await;
    let duration_ms = timer.finish();

    let outcome = match result {
        Ok(Ok(status)) => MiddlewareOutcome::from_status(status),
        Ok(Err(err)) => MiddlewareOutcome::Failed(failure_message(name, &err.to_string())),
        Err(panic) => MiddlewareOutcome::Failed(panic_message(panic.as_ref())),
    };

    if outcome.halts() && policy == SiblingPolicy::AbortOnHalt {
        let verb = if outcome == MiddlewareOutcome::Stopped { "stopped" } else { "failed" };
        token.cancel(format!("{name} {verb}"));
    }

    match &outcome {
        MiddlewareOutcome::Continued => {
            debug!(middleware = %name, duration_ms, "Middleware completed");
            ctx.emit_event(
                "middleware.completed",
                Some(json!({"middleware": name, "duration_ms": duration_ms})),
            );
        }
        MiddlewareOutcome::Stopped => {
            info!(middleware = %name, duration_ms, "Middleware requested stop");
            ctx.emit_event(
                "middleware.stopped",
                Some(json!({"middleware": name, "duration_ms": duration_ms})),
            );
        }
        MiddlewareOutcome::Skipped => {
            debug!(middleware = %name, "Middleware skipped itself");
            ctx.emit_event(
                "middleware.skipped",
                Some(json!({"middleware": name, "reason": "self"})),
            );
        }
        MiddlewareOutcome::Failed(message) => {
            error!(middleware = %name, error = %message, duration_ms, "Middleware failed");
            ctx.emit_event(
                "middleware.failed",
                Some(json!({"middleware": name, "error": message, "duration_ms": duration_ms})),
            );
        }
    }

    outcome
}

fn verdict_of(outcomes: &[(String, MiddlewareOutcome)]) -> LevelVerdict {
    if let Some((by, message)) = outcomes
        .iter()
        .find_map(|(name, o)| o.error().map(|m| (name, m)))
    {
        return LevelVerdict::Error {
            by: by.clone(),
            message: message.to_string(),
        };
    }

    outcomes
        .iter()
        .find(|(_, o)| *o == MiddlewareOutcome::Stopped)
        .map_or(LevelVerdict::Continue, |(by, _)| LevelVerdict::Stop { by: by.clone() })
}

/// Returns `message`, or a generic message naming the middleware when it is blank.
fn failure_message(name: &str, message: &str) -> String {
    if message.trim().is_empty() {
        format!("Middleware \"{name}\" failed")
    } else {
        message.to_string()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Middleware panicked: {detail}")
}
