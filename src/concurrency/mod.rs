//! Optimistic concurrency: version-checked single-record and batch updates.

pub mod batch;
pub mod safe_update;
pub mod strategy;

pub use batch::{BatchItemResult, BatchOutcome};
pub use strategy::{ConflictResolutionStrategy, UpdatePlan};
