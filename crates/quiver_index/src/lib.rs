//! Registry index for Quiver.
//!
//! Inverted indices answering "which entities have X" without walking the
//! entity tree:
//! - type and capability name -> entities
//! - property name -> entities (with prefix queries)
//! - relationship target -> sources, and source -> targets
//!
//! Every forward map has an exact reverse map, maintained together.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod criteria;
pub mod registry;
mod tables;

pub use criteria::Criteria;
pub use registry::{IndexStats, RegistryIndex};

/// Snapshot of entities matching a query.
///
/// Persistent set: cloning is O(1), so queries hand out snapshots taken under
/// the read lock.
pub type EntitySet = im::HashSet<quiver_foundation::EntityId>;
