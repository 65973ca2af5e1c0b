//! Run status, per-middleware outcome and level verdict enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The non-error signal a middleware invocation returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Proceed normally.
    Continue,
    /// Halt the pipeline early. Not an error.
    Stop,
    /// The middleware did not run.
    Skipped,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::Continue
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Stop => write!(f, "stop"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// What happened to one middleware within a level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum MiddlewareOutcome {
    /// Ran and returned `Continue`.
    Continued,
    /// Ran and returned `Stop`.
    Stopped,
    /// Returned `Skipped`, or never started because a sibling tripped the level signal.
    Skipped,
    /// Returned an error or panicked.
    Failed(String),
}

impl MiddlewareOutcome {
    /// Maps a returned run status onto an outcome.
    #[must_use]
    pub const fn from_status(status: RunStatus) -> Self {
        match status {
            RunStatus::Continue => Self::Continued,
            RunStatus::Stop => Self::Stopped,
            RunStatus::Skipped => Self::Skipped,
        }
    }

    /// Returns the run status reported for this outcome.
    ///
    /// Failures report `Stop`, since they also halt the pipeline.
    #[must_use]
    pub const fn run_status(&self) -> RunStatus {
        match self {
            Self::Continued => RunStatus::Continue,
            Self::Stopped | Self::Failed(_) => RunStatus::Stop,
            Self::Skipped => RunStatus::Skipped,
        }
    }

    /// Returns true for outcomes that trip the level signal.
    #[must_use]
    pub const fn halts(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }

    /// Returns the error message of a failed outcome.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }
}

impl fmt::Display for MiddlewareOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continued => write!(f, "success"),
            Self::Stopped => write!(f, "stop"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed(_) => write!(f, "error"),
        }
    }
}

/// The combined result of one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelVerdict {
    /// Every member continued or skipped.
    Continue,
    /// At least one member stopped and none failed.
    Stop {
        /// The middleware that stopped first.
        by: String,
    },
    /// At least one member failed.
    Error {
        /// The middleware that failed first.
        by: String,
        /// Its error message.
        message: String,
    },
}

impl LevelVerdict {
    /// Returns true if later non-finalize levels must not run.
    #[must_use]
    pub const fn halts(&self) -> bool {
        !matches!(self, Self::Continue)
    }
}
