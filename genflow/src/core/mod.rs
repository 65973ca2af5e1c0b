//! Core domain model types for genflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Lifecycle phases
//! - Run status, middleware outcome and level verdict enums
//! - Request, asset and result types

mod asset;
mod phase;
mod request;
mod result;
mod status;

pub use asset::{Asset, AssetKind};
pub use phase::{LifecyclePhase, UnknownPhaseError};
pub use request::{ChannelRef, GenerationRequest, InputFile};
pub use result::GenerationResult;
pub use status::{LevelVerdict, MiddlewareOutcome, RunStatus};
