//! Testing utilities for genflow pipelines.
//!
//! This module provides:
//! - Mock middlewares and a shared execution log
//! - A pipeline test harness

mod fixtures;
mod mocks;

pub use fixtures::{PipelineHarness, TEST_CHANNEL_ID};
pub use mocks::{
    ExecutionLog, FailingMiddleware, OutputMiddleware, PanickingMiddleware, RecordingMiddleware,
    SlowMiddleware, StoppingMiddleware,
};
