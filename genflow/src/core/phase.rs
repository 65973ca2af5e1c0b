//! Lifecycle phases.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fixed, totally ordered pipeline stage.
///
/// Phase *i* fully completes before phase *i + 1* begins, whatever the
/// middleware-level declarations say. Ordering follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LifecyclePhase {
    /// Input preparation (task records, uploads, billing holds).
    #[serde(rename = "lifecycle-prepare")]
    Prepare,
    /// Prompt and parameter rewriting before the backend call.
    #[serde(rename = "lifecycle-pre-request")]
    PreRequest,
    /// The call to the generation backend.
    #[serde(rename = "lifecycle-request")]
    Request,
    /// Post-processing of produced assets.
    #[serde(rename = "lifecycle-post-request")]
    PostRequest,
    /// Cleanup that runs on every exit path.
    #[serde(rename = "lifecycle-finalize")]
    Finalize,
}

impl LifecyclePhase {
    /// All phases in execution order.
    pub const ALL: [Self; 5] = [
        Self::Prepare,
        Self::PreRequest,
        Self::Request,
        Self::PostRequest,
        Self::Finalize,
    ];

    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prepare => "lifecycle-prepare",
            Self::PreRequest => "lifecycle-pre-request",
            Self::Request => "lifecycle-request",
            Self::PostRequest => "lifecycle-post-request",
            Self::Finalize => "lifecycle-finalize",
        }
    }

    /// Returns the phase that follows this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Prepare => Some(Self::PreRequest),
            Self::PreRequest => Some(Self::Request),
            Self::Request => Some(Self::PostRequest),
            Self::PostRequest => Some(Self::Finalize),
            Self::Finalize => None,
        }
    }

    /// Returns true for the terminal cleanup phase.
    #[must_use]
    pub const fn is_finalize(self) -> bool {
        matches!(self, Self::Finalize)
    }
}

impl Default for LifecyclePhase {
    fn default() -> Self {
        Self::Request
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown phase name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown lifecycle phase: '{0}'")]
pub struct UnknownPhaseError(pub String);

impl FromStr for LifecyclePhase {
    type Err = UnknownPhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| UnknownPhaseError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering() {
        assert!(LifecyclePhase::Prepare < LifecyclePhase::PreRequest);
        assert!(LifecyclePhase::PostRequest < LifecyclePhase::Finalize);

        let mut sorted = LifecyclePhase::ALL;
        sorted.sort();
        assert_eq!(sorted, LifecyclePhase::ALL);
    }

    #[test]
    fn test_phase_next_chain() {
        let mut phase = LifecyclePhase::Prepare;
        let mut visited = vec![phase];
        while let Some(next) = phase.next() {
            visited.push(next);
            phase = next;
        }
        assert_eq!(visited, LifecyclePhase::ALL.to_vec());
        assert!(phase.is_finalize());
    }

    #[test]
    fn test_phase_parse_roundtrip() {
        for phase in LifecyclePhase::ALL {
            assert_eq!(phase.as_str().parse::<LifecyclePhase>(), Ok(phase));
        }
        assert!("prepare".parse::<LifecyclePhase>().is_err());
    }

    #[test]
    fn test_phase_serialize() {
        let json = serde_json::to_string(&LifecyclePhase::PreRequest).unwrap();
        assert_eq!(json, r#""lifecycle-pre-request""#);
    }
}
