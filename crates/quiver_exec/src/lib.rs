//! Concurrency and execution support for Quiver.
//!
//! This crate provides:
//! - [`shadow`] - Lock-free thread-local shadows of the interner and handle cache
//! - [`RelaxedQueryCache`] - Sharded membership cache with weaker consistency
//! - [`WorkerPool`] - Fixed worker threads with task handles
//! - [`Pipeline`] - Staged find, map, and sync with abort between stages

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod pipeline;
pub mod pool;
pub mod query_cache;
pub mod shadow;

pub use pipeline::{AbortHandle, Pipeline, PipelineOutcome, Stage};
pub use pool::{PoolStats, TaskHandle, WorkerPool};
pub use query_cache::{QueryKind, RelaxedQueryCache, RelaxedStats};
pub use shadow::ShadowStats;
