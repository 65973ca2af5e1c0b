//! The per-request result returned by the pipeline.

use super::Asset;
use serde::{Deserialize, Serialize};

/// The outcome of one `execute()` call.
///
/// Failures are data: every error met while running a request ends up here
/// instead of crossing the `execute()` boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Whether the request succeeded. A graceful stop is still a success.
    pub success: bool,

    /// Produced assets. Always `Some` on success, possibly empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<Asset>>,

    /// The first fatal error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Task record id, if a middleware created one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<i64>,

    /// Wall-clock time spent in `execute()`.
    pub duration_ms: u64,

    /// The middleware that halted the pipeline with a stop, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_by: Option<String>,
}

impl GenerationResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(output: Vec<Asset>, duration_ms: u64) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            task_id: None,
            duration_ms,
            stopped_by: None,
        }
    }

    /// Creates a successful result with no output.
    #[must_use]
    pub fn empty(duration_ms: u64) -> Self {
        Self::success(Vec::new(), duration_ms)
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            task_id: None,
            duration_ms,
            stopped_by: None,
        }
    }

    /// Sets the task id.
    #[must_use]
    pub const fn with_task_id(mut self, task_id: Option<i64>) -> Self {
        self.task_id = task_id;
        self
    }

    /// Records which middleware stopped the pipeline.
    #[must_use]
    pub fn with_stopped_by(mut self, name: Option<String>) -> Self {
        self.stopped_by = name;
        self
    }

    /// Returns the output assets, or an empty slice.
    #[must_use]
    pub fn assets(&self) -> &[Asset] {
        self.output.as_deref().unwrap_or_default()
    }
}
