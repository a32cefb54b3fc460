//! In-memory hierarchical store.
//!
//! `MemoryStore` implements [`SchemaStore`] over a tree of entities rooted at
//! a pseudo-root. Every call the cache layers make through the trait is
//! counted, so tests can assert exactly how often a cache went back to the
//! store.

// Allow usize to u32 casts - property counts per entity are small
#![allow(clippy::cast_possible_truncation)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use quiver_foundation::{EntityId, Error, Result, Value};
use tracing::debug;

use crate::entity::EntityAllocator;
use crate::schema::{SchemaKind, SchemaRegistry, TypeSchema};
use crate::store::{SchemaStore, StoreHandle};

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Default)]
struct EntityRecord {
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    declared_type: Option<String>,
    capabilities: Vec<String>,
    /// Slot order; removal shifts later slots, which is why it bumps the version.
    properties: Vec<(String, Value)>,
    structure_version: u64,
    relationships: BTreeMap<String, Vec<EntityId>>,
}

impl EntityRecord {
    fn slot_of(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|(n, _)| n == name)
    }

    fn bump(&mut self) {
        self.structure_version += 1;
    }

    fn define_defaults(&mut self, defaults: Vec<(String, Value)>) {
        for (name, value) in defaults {
            if self.slot_of(&name).is_none() {
                self.properties.push((name, value));
            }
        }
    }
}

#[derive(Debug)]
struct Graph {
    allocator: EntityAllocator,
    schemas: SchemaRegistry,
    records: HashMap<EntityId, EntityRecord>,
    root: EntityId,
    failing: HashSet<(EntityId, String)>,
}

impl Graph {
    fn record(&self, entity: EntityId) -> Result<&EntityRecord> {
        self.records
            .get(&entity)
            .ok_or_else(|| Error::entity_not_found(entity))
    }

    fn record_mut(&mut self, entity: EntityId) -> Result<&mut EntityRecord> {
        self.records
            .get_mut(&entity)
            .ok_or_else(|| Error::entity_not_found(entity))
    }

    fn check_handle(&self, handle: &StoreHandle) -> Result<&EntityRecord> {
        let record = self.record(handle.entity)?;
        if record.structure_version != handle.version {
            let property = record
                .properties
                .get(handle.slot as usize)
                .map_or_else(|| format!("slot {}", handle.slot), |(n, _)| n.clone());
            return Err(Error::stale_handle(handle.entity, property));
        }
        Ok(record)
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Snapshot of how often each store operation was called.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Calls to `resolve_property`.
    pub resolutions: u64,
    /// Calls to `get_value`.
    pub value_reads: u64,
    /// Calls to `set_value`.
    pub value_writes: u64,
    /// Calls to `declared_type`.
    pub type_queries: u64,
    /// Calls to `applied_capabilities`.
    pub capability_queries: u64,
    /// Calls to `ancestry_chain`.
    pub ancestry_queries: u64,
    /// Calls to `traverse_all`.
    pub traversals: u64,
}

#[derive(Debug, Default)]
struct Counters {
    resolutions: AtomicU64,
    value_reads: AtomicU64,
    value_writes: AtomicU64,
    type_queries: AtomicU64,
    capability_queries: AtomicU64,
    ancestry_queries: AtomicU64,
    traversals: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// =============================================================================
// MemoryStore
// =============================================================================

/// A thread-safe in-memory entity tree.
#[derive(Debug)]
pub struct MemoryStore {
    graph: RwLock<Graph>,
    counters: Counters,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a store containing only the pseudo-root.
    #[must_use]
    pub fn new() -> Self {
        let mut allocator = EntityAllocator::new();
        let root = allocator.allocate();
        let mut records = HashMap::new();
        records.insert(root, EntityRecord::default());

        Self {
            graph: RwLock::new(Graph {
                allocator,
                schemas: SchemaRegistry::new(),
                records,
                root,
                failing: HashSet::new(),
            }),
            counters: Counters::default(),
        }
    }

    /// Returns the pseudo-root every entity descends from.
    #[must_use]
    pub fn root(&self) -> EntityId {
        self.graph.read().root
    }

    /// Returns the number of live entities, the root included.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.graph.read().allocator.len()
    }

    // --- Schemas ---

    /// Registers a schema.
    ///
    /// # Errors
    ///
    /// See [`SchemaRegistry::register`].
    pub fn register_schema(&self, schema: TypeSchema) -> Result<()> {
        self.graph.write().schemas.register(schema)
    }

    /// Registers a primary type without default properties.
    ///
    /// # Errors
    ///
    /// See [`SchemaRegistry::register`].
    pub fn register_type(&self, name: &str, parent: Option<&str>) -> Result<()> {
        let mut schema = TypeSchema::primary(name);
        if let Some(parent) = parent {
            schema = schema.with_parent(parent);
        }
        self.register_schema(schema)
    }

    /// Registers a capability without default properties.
    ///
    /// # Errors
    ///
    /// See [`SchemaRegistry::register`].
    pub fn register_capability(&self, name: &str, multi_apply: bool) -> Result<()> {
        self.register_schema(TypeSchema::capability(name, multi_apply))
    }

    // --- Structure ---

    /// Creates a child entity.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if the parent does not exist.
    pub fn spawn(&self, parent: EntityId) -> Result<EntityId> {
        let mut graph = self.graph.write();
        graph.record(parent)?;

        let id = graph.allocator.allocate();
        graph.records.insert(
            id,
            EntityRecord {
                parent: Some(parent),
                ..EntityRecord::default()
            },
        );
        graph.record_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Sets the declared type, defining the type's default properties that
    /// are not already present.
    ///
    /// Unregistered type names are accepted and have no ancestry.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if the entity does not exist, or
    /// `StoreRejected` if `type_name` is a capability.
    pub fn set_type(&self, entity: EntityId, type_name: &str) -> Result<()> {
        let mut graph = self.graph.write();
        if graph.schemas.kind_of(type_name).is_some_and(SchemaKind::is_capability) {
            return Err(Error::store_rejected(format!(
                "{type_name} is a capability, not a type"
            )));
        }
        let defaults = graph.schemas.properties_for(type_name);
        let record = graph.record_mut(entity)?;
        record.declared_type = Some(type_name.to_string());
        record.define_defaults(defaults);
        record.bump();
        Ok(())
    }

    /// Applies a capability, or a named instance (`Collision:head`) of a
    /// multi-apply capability. Re-applying is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if the entity does not exist, or
    /// `StoreRejected` if the name is not a registered capability.
    pub fn apply_capability(&self, entity: EntityId, capability: &str) -> Result<()> {
        let mut graph = self.graph.write();
        match graph.schemas.kind_of(capability) {
            Some(SchemaKind::Capability { multi_apply }) => {
                if multi_apply && !capability.contains(':') {
                    return Err(Error::store_rejected(format!(
                        "{capability} is multi-apply and needs an instance name"
                    )));
                }
            }
            _ => {
                return Err(Error::store_rejected(format!(
                    "{capability} is not a registered capability"
                )));
            }
        }
        let base = capability.split(':').next().unwrap_or(capability);
        let defaults = graph
            .schemas
            .get(base)
            .map(|s| s.properties.clone())
            .unwrap_or_default();

        let record = graph.record_mut(entity)?;
        if record.capabilities.iter().any(|c| c == capability) {
            return Ok(());
        }
        record.capabilities.push(capability.to_string());
        record.define_defaults(defaults);
        record.bump();
        Ok(())
    }

    /// Removes a capability. Its properties stay defined.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if the entity does not exist.
    pub fn remove_capability(&self, entity: EntityId, capability: &str) -> Result<bool> {
        let mut graph = self.graph.write();
        let record = graph.record_mut(entity)?;
        let before = record.capabilities.len();
        record.capabilities.retain(|c| c != capability);
        let removed = record.capabilities.len() != before;
        if removed {
            record.bump();
        }
        Ok(removed)
    }

    /// Defines a property, or overwrites its value if it already exists.
    ///
    /// Only a newly defined property is a structural change.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if the entity does not exist.
    pub fn define_property(
        &self,
        entity: EntityId,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let mut graph = self.graph.write();
        let record = graph.record_mut(entity)?;
        let value = value.into();
        match record.slot_of(name) {
            Some(slot) => record.properties[slot].1 = value,
            None => {
                record.properties.push((name.to_string(), value));
                record.bump();
            }
        }
        Ok(())
    }

    /// Removes a property, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if the entity does not exist.
    pub fn remove_property(&self, entity: EntityId, name: &str) -> Result<bool> {
        let mut graph = self.graph.write();
        let record = graph.record_mut(entity)?;
        let Some(slot) = record.slot_of(name) else {
            return Ok(false);
        };
        record.properties.remove(slot);
        record.bump();
        Ok(true)
    }

    /// Reads a property directly, bypassing handles and counters.
    #[must_use]
    pub fn property(&self, entity: EntityId, name: &str) -> Option<Value> {
        let graph = self.graph.read();
        let record = graph.records.get(&entity)?;
        record.slot_of(name).map(|slot| record.properties[slot].1.clone())
    }

    /// Adds a relationship target. Adding an existing edge is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if either entity does not exist.
    pub fn add_relationship_target(
        &self,
        source: EntityId,
        relationship: &str,
        target: EntityId,
    ) -> Result<()> {
        let mut graph = self.graph.write();
        graph.record(target)?;
        let record = graph.record_mut(source)?;
        let targets = record.relationships.entry(relationship.to_string()).or_default();
        if !targets.contains(&target) {
            targets.push(target);
            record.bump();
        }
        Ok(())
    }

    /// Removes a relationship target, returning whether the edge existed.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if the source does not exist.
    pub fn remove_relationship_target(
        &self,
        source: EntityId,
        relationship: &str,
        target: EntityId,
    ) -> Result<bool> {
        let mut graph = self.graph.write();
        let record = graph.record_mut(source)?;
        let Some(targets) = record.relationships.get_mut(relationship) else {
            return Ok(false);
        };
        let before = targets.len();
        targets.retain(|t| *t != target);
        let removed = targets.len() != before;
        if targets.is_empty() {
            record.relationships.remove(relationship);
        }
        if removed {
            record.bump();
        }
        Ok(removed)
    }

    /// Destroys an entity and its whole subtree.
    ///
    /// Edges pointing at any destroyed entity are removed from the survivors.
    /// Returns the destroyed ids in preorder.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if the entity does not exist, or
    /// `StoreRejected` for the pseudo-root.
    pub fn destroy(&self, entity: EntityId) -> Result<Vec<EntityId>> {
        let mut graph = self.graph.write();
        if entity == graph.root {
            return Err(Error::store_rejected("the root cannot be destroyed"));
        }
        let parent = graph.record(entity)?.parent;

        let doomed = preorder(&graph, entity);
        let doomed_set: HashSet<_> = doomed.iter().copied().collect();

        for id in &doomed {
            graph.records.remove(id);
            graph.allocator.release(*id)?;
        }
        if let Some(parent) = parent {
            if let Some(record) = graph.records.get_mut(&parent) {
                record.children.retain(|c| *c != entity);
            }
        }
        for record in graph.records.values_mut() {
            let mut touched = false;
            record.relationships.retain(|_, targets| {
                let before = targets.len();
                targets.retain(|t| !doomed_set.contains(t));
                touched |= targets.len() != before;
                !targets.is_empty()
            });
            if touched {
                record.bump();
            }
        }
        graph.failing.retain(|(e, _)| !doomed_set.contains(e));

        debug!(entity = %entity, destroyed = doomed.len(), "destroyed subtree");
        Ok(doomed)
    }

    /// Returns the parent of an entity.
    #[must_use]
    pub fn parent_of(&self, entity: EntityId) -> Option<EntityId> {
        self.graph.read().records.get(&entity)?.parent
    }

    /// Returns the children of an entity.
    #[must_use]
    pub fn children_of(&self, entity: EntityId) -> Vec<EntityId> {
        self.graph
            .read()
            .records
            .get(&entity)
            .map(|r| r.children.clone())
            .unwrap_or_default()
    }

    // --- Failure injection ---

    /// Makes every write to `property` on `entity` fail until cleared.
    pub fn fail_writes(&self, entity: EntityId, property: &str) {
        self.graph
            .write()
            .failing
            .insert((entity, property.to_string()));
    }

    /// Clears all injected write failures.
    pub fn clear_failures(&self) {
        self.graph.write().failing.clear();
    }

    // --- Statistics ---

    /// Returns a snapshot of the operation counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let c = &self.counters;
        StoreStats {
            resolutions: c.resolutions.load(Ordering::Relaxed),
            value_reads: c.value_reads.load(Ordering::Relaxed),
            value_writes: c.value_writes.load(Ordering::Relaxed),
            type_queries: c.type_queries.load(Ordering::Relaxed),
            capability_queries: c.capability_queries.load(Ordering::Relaxed),
            ancestry_queries: c.ancestry_queries.load(Ordering::Relaxed),
            traversals: c.traversals.load(Ordering::Relaxed),
        }
    }

    /// Resets every counter to zero.
    pub fn reset_stats(&self) {
        let c = &self.counters;
        for counter in [
            &c.resolutions,
            &c.value_reads,
            &c.value_writes,
            &c.type_queries,
            &c.capability_queries,
            &c.ancestry_queries,
            &c.traversals,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

fn preorder(graph: &Graph, root: EntityId) -> Vec<EntityId> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let Some(record) = graph.records.get(&id) else {
            continue;
        };
        out.push(id);
        stack.extend(record.children.iter().rev().copied());
    }
    out
}

impl SchemaStore for MemoryStore {
    fn resolve_property(&self, entity: EntityId, name: &str) -> Option<StoreHandle> {
        bump(&self.counters.resolutions);
        let graph = self.graph.read();
        let record = graph.records.get(&entity)?;
        let slot = record.slot_of(name)?;
        Some(StoreHandle {
            entity,
            slot: slot as u32,
            version: record.structure_version,
        })
    }

    fn get_value(&self, handle: &StoreHandle) -> Result<Value> {
        bump(&self.counters.value_reads);
        let graph = self.graph.read();
        let record = graph.check_handle(handle)?;
        record
            .properties
            .get(handle.slot as usize)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| Error::internal(format!("slot {} out of range", handle.slot)))
    }

    fn set_value(&self, handle: &StoreHandle, value: Value) -> Result<()> {
        bump(&self.counters.value_writes);
        let mut graph = self.graph.write();
        let name = {
            let record = graph.check_handle(handle)?;
            record
                .properties
                .get(handle.slot as usize)
                .map(|(n, _)| n.clone())
                .ok_or_else(|| Error::internal(format!("slot {} out of range", handle.slot)))?
        };
        if graph.failing.contains(&(handle.entity, name.clone())) {
            return Err(Error::store_rejected(format!("write to {name} refused")));
        }
        let record = graph.record_mut(handle.entity)?;
        record.properties[handle.slot as usize].1 = value;
        Ok(())
    }

    fn declared_type(&self, entity: EntityId) -> Option<String> {
        bump(&self.counters.type_queries);
        self.graph.read().records.get(&entity)?.declared_type.clone()
    }

    fn applied_capabilities(&self, entity: EntityId) -> Vec<String> {
        bump(&self.counters.capability_queries);
        self.graph
            .read()
            .records
            .get(&entity)
            .map(|r| r.capabilities.clone())
            .unwrap_or_default()
    }

    fn ancestry_chain(&self, type_name: &str) -> Vec<String> {
        bump(&self.counters.ancestry_queries);
        self.graph.read().schemas.ancestry_chain(type_name)
    }

    fn schema_kind(&self, name: &str) -> Option<SchemaKind> {
        self.graph.read().schemas.kind_of(name)
    }

    fn traverse_all(&self, root: EntityId) -> Vec<EntityId> {
        bump(&self.counters.traversals);
        preorder(&self.graph.read(), root)
    }

    fn property_names(&self, entity: EntityId) -> Vec<String> {
        self.graph
            .read()
            .records
            .get(&entity)
            .map(|r| r.properties.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default()
    }

    fn relationship_names(&self, entity: EntityId) -> Vec<String> {
        self.graph
            .read()
            .records
            .get(&entity)
            .map(|r| r.relationships.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn relationship_targets(&self, entity: EntityId, relationship: &str) -> Vec<EntityId> {
        self.graph
            .read()
            .records
            .get(&entity)
            .and_then(|r| r.relationships.get(relationship).cloned())
            .unwrap_or_default()
    }

    fn contains(&self, entity: EntityId) -> bool {
        self.graph.read().records.contains_key(&entity)
    }
}
