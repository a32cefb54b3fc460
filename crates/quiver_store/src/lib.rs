//! Entity/property store interface and in-memory reference store for Quiver.
//!
//! This crate provides:
//! - [`SchemaStore`] - The operations the cache layers consume from a store
//! - [`StoreHandle`] - A store's own resolved property reference
//! - [`SchemaRegistry`] - Primary types, capabilities, and ancestry
//! - [`MemoryStore`] - A hierarchical in-memory store with resolution counters
//! - [`GatedStore`] - A decorator that holds one read in flight

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod entity;
pub mod gated;
pub mod memory;
pub mod schema;
pub mod store;

pub use entity::EntityAllocator;
pub use gated::{GatedRead, GatedStore};
pub use memory::{MemoryStore, StoreStats};
pub use schema::{SchemaKind, SchemaRegistry, TypeSchema};
pub use store::{SchemaStore, StoreHandle};
