//! Quiver - Caching and indexing for hierarchical, schema-typed entity stores
//!
//! This crate re-exports all layers of the Quiver system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 5: quiver_context    — CacheContext facade, CacheConfig
//! Layer 4: quiver_batch      — Cache-aligned structure-of-arrays batches
//!          quiver_exec       — Shadows, relaxed queries, worker pool, pipelines
//! Layer 3: quiver_index      — Registry index over types, properties, relationships
//! Layer 2: quiver_cache      — Property handle, schema type, and result value caches
//! Layer 1: quiver_store      — SchemaStore trait, in-memory reference store
//! Layer 0: quiver_foundation — Core types (EntityId, Name, Value, Error)
//! ```

pub use quiver_batch as batch;
pub use quiver_cache as cache;
pub use quiver_context as context;
pub use quiver_exec as exec;
pub use quiver_foundation as foundation;
pub use quiver_index as index;
pub use quiver_store as store;

pub use quiver_context::{CacheConfig, CacheContext};
