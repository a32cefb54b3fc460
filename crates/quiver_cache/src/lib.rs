//! Cache layers between gameplay code and a [`SchemaStore`].
//!
//! This crate provides:
//! - [`PropertyHandleCache`] - Resolved property references, negatives included
//! - [`SchemaTypeCache`] - Type ancestry and per-entity membership rows
//! - [`ResultValueCache`] - Decoded values with dirty tracking and write-back
//!
//! Every cache is keyed by [`EntityId`] and holds per-entity rows, so
//! invalidating an entity is a single row removal.
//!
//! [`SchemaStore`]: quiver_store::SchemaStore
//! [`EntityId`]: quiver_foundation::EntityId

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod handle;
pub mod types;
pub mod value;

pub use handle::{HandleStats, PropertyHandle, PropertyHandleCache};
pub use types::{SchemaTypeCache, Strategy, TypeCacheStats, TypeInfo, TypeKind};
pub use value::{CachedValue, ResultValueCache, SyncFailureEntry, SyncReport, ValueCacheStats};
