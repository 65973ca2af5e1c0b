//! Per-request execution context.
//!
//! This module provides:
//! - The context shared by every middleware of one request
//! - A thread-safe store for inter-middleware handoff
//! - Per-middleware diagnostic logs

mod middleware_context;
mod store;

pub use middleware_context::MiddlewareContext;
pub use store::{ContextStore, MiddlewareLogs};
