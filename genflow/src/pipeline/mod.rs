//! Pipeline execution.
//!
//! This module provides:
//! - The per-request executor and its builder
//! - Concurrent level execution with a shared abort signal

mod executor;
mod level;

#[cfg(test)]
mod integration_tests;

pub use executor::{GenerationPipeline, GenerationPipelineBuilder};
