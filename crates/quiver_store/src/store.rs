//! The store interface consumed by the cache layers.

use quiver_foundation::{EntityId, Result, Value};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::schema::SchemaKind;

/// A store's resolved reference to one property of one entity.
///
/// The handle records the entity's structure version at resolution time.
/// Any structural change to the entity (a property added or removed, a type
/// or capability change) bumps the version and makes older handles stale.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StoreHandle {
    /// The entity owning the property.
    pub entity: EntityId,
    /// Store-internal slot of the property.
    pub slot: u32,
    /// Structure version the handle was resolved against.
    pub version: u64,
}

/// Operations Quiver needs from a hierarchical, schema-typed entity store.
///
/// Implementations must be safe to call from many threads at once.
pub trait SchemaStore: Send + Sync {
    /// Resolves a property by name, returning `None` if the entity or the
    /// property does not exist.
    fn resolve_property(&self, entity: EntityId, name: &str) -> Option<StoreHandle>;

    /// Reads the value behind a handle.
    ///
    /// # Errors
    ///
    /// Returns `StaleHandle` if the entity changed structurally since the
    /// handle was resolved, or `EntityNotFound` if it no longer exists.
    fn get_value(&self, handle: &StoreHandle) -> Result<Value>;

    /// Writes the value behind a handle.
    ///
    /// # Errors
    ///
    /// Returns `StaleHandle` or `EntityNotFound` as for [`get_value`], or
    /// `StoreRejected` if the store refuses the write.
    ///
    /// [`get_value`]: SchemaStore::get_value
    fn set_value(&self, handle: &StoreHandle, value: Value) -> Result<()>;

    /// Returns the entity's declared primary type.
    fn declared_type(&self, entity: EntityId) -> Option<String>;

    /// Returns the capabilities applied to the entity, instance names included.
    fn applied_capabilities(&self, entity: EntityId) -> Vec<String>;

    /// Returns the ancestry chain of a type, the type itself first.
    fn ancestry_chain(&self, type_name: &str) -> Vec<String>;

    /// Returns how a schema name participates in membership checks.
    fn schema_kind(&self, name: &str) -> Option<SchemaKind>;

    /// Returns every entity under `root` (inclusive) in depth-first preorder.
    fn traverse_all(&self, root: EntityId) -> Vec<EntityId>;

    /// Returns the names of the entity's properties.
    fn property_names(&self, entity: EntityId) -> Vec<String>;

    /// Returns the names of the entity's relationships.
    fn relationship_names(&self, entity: EntityId) -> Vec<String>;

    /// Returns the targets of one relationship.
    fn relationship_targets(&self, entity: EntityId, relationship: &str) -> Vec<EntityId>;

    /// Returns true if the entity exists.
    fn contains(&self, entity: EntityId) -> bool;
}
