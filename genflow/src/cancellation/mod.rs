//! Cooperative cancellation.
//!
//! Each level of a pipeline run shares one [`CancellationToken`]. The first
//! middleware to stop or fail trips it, and siblings that have not started
//! yet are skipped.

mod token;

pub use token::CancellationToken;
