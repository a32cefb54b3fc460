//! The registry index.
//!
//! `RegistryIndex` is bulk-built once from a store traversal and then kept
//! current by explicit `add_entity` / `remove_entity` / `update_entity`
//! calls made on every structural mutation. It does not observe the store:
//! a mutation nobody reports leaves the index stale until
//! [`revalidate`](RegistryIndex::revalidate) repairs it.
//!
//! Store reads happen before the write lock is taken, and everything an
//! entity contributes is inserted under one lock acquisition, so readers see
//! either none or all of an entity's entries.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use quiver_foundation::{EntityId, Error, Result};
use quiver_store::{SchemaKind, SchemaStore};
use tracing::{debug, info, warn};

use crate::EntitySet;
use crate::criteria::Criteria;
use crate::tables::{EntitySnapshot, IndexTables};

/// Counter snapshot for a [`RegistryIndex`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Entities added or re-added.
    pub adds: u64,
    /// Entities removed.
    pub removes: u64,
    /// Entities found out of date by revalidation.
    pub repairs: u64,
}

/// Bidirectional indices over types, properties, and relationships.
pub struct RegistryIndex {
    store: Arc<dyn SchemaStore>,
    tables: RwLock<IndexTables>,
    root: RwLock<Option<EntityId>>,
    adds: AtomicU64,
    removes: AtomicU64,
    repairs: AtomicU64,
}

impl RegistryIndex {
    /// Creates an empty index over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SchemaStore>) -> Self {
        Self {
            store,
            tables: RwLock::new(IndexTables::default()),
            root: RwLock::new(None),
            adds: AtomicU64::new(0),
            removes: AtomicU64::new(0),
            repairs: AtomicU64::new(0),
        }
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Clears the index and indexes every entity under `root`.
    ///
    /// Returns the number of entities indexed.
    pub fn build_from_store(&self, root: EntityId) -> usize {
        let snapshots: Vec<EntitySnapshot> = self
            .store
            .traverse_all(root)
            .into_iter()
            .filter_map(|e| self.snapshot(e))
            .collect();

        let mut tables = IndexTables::default();
        for snapshot in &snapshots {
            tables.apply(snapshot);
        }
        *self.tables.write() = tables;
        *self.root.write() = Some(root);

        let count = snapshots.len();
        self.adds.fetch_add(count as u64, Ordering::Relaxed);
        info!(entities = count, "built registry index");
        count
    }

    /// Indexes an entity, replacing whatever it contributed before.
    ///
    /// Returns false if the store does not know the entity.
    pub fn add_entity(&self, entity: EntityId) -> bool {
        let Some(snapshot) = self.snapshot(entity) else {
            return false;
        };
        self.tables.write().apply(&snapshot);
        self.adds.fetch_add(1, Ordering::Relaxed);
        debug!(entity = %entity, types = snapshot.types.len(), "indexed entity");
        true
    }

    /// Removes an entity, including every edge that targets it.
    pub fn remove_entity(&self, entity: EntityId) -> bool {
        let removed = self.tables.write().remove(entity);
        if removed {
            self.removes.fetch_add(1, Ordering::Relaxed);
            debug!(entity = %entity, "unindexed entity");
        }
        removed
    }

    /// Re-reads an entity after a structural change.
    ///
    /// An entity the store no longer knows is removed instead.
    pub fn update_entity(&self, entity: EntityId) -> bool {
        match self.snapshot(entity) {
            Some(snapshot) => {
                self.tables.write().apply(&snapshot);
                self.adds.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => self.remove_entity(entity),
        }
    }

    /// Compares the given entities against the store and repairs the ones
    /// that are out of date. Returns how many were repaired.
    pub fn revalidate(&self, entities: &[EntityId]) -> usize {
        let mut repaired = 0;
        for &entity in entities {
            let snapshot = self.snapshot(entity);
            let mut tables = self.tables.write();
            match snapshot {
                Some(snapshot) if !tables.matches(&snapshot) => {
                    tables.apply(&snapshot);
                    repaired += 1;
                }
                None if tables.entities.contains(&entity) => {
                    tables.remove(entity);
                    repaired += 1;
                }
                _ => {}
            }
        }
        if repaired > 0 {
            self.repairs.fetch_add(repaired as u64, Ordering::Relaxed);
            warn!(repaired, "registry index was stale");
        }
        repaired
    }

    /// Revalidates every indexed entity plus everything under the build root.
    pub fn revalidate_all(&self) -> usize {
        let mut candidates: BTreeSet<EntityId> =
            self.tables.read().entities.iter().copied().collect();
        if let Some(root) = *self.root.read() {
            candidates.extend(self.store.traverse_all(root));
        }
        let candidates: Vec<_> = candidates.into_iter().collect();
        self.revalidate(&candidates)
    }

    /// Drops everything.
    pub fn clear(&self) {
        *self.tables.write() = IndexTables::default();
        *self.root.write() = None;
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Entities of a type, its subtypes included, or with a capability.
    #[must_use]
    pub fn find_by_type(&self, type_name: &str) -> EntitySet {
        self.tables.read().types.get(type_name)
    }

    /// Entities with a capability applied.
    ///
    /// Capabilities share the type index; a multi-apply capability matches
    /// every instance.
    #[must_use]
    pub fn find_by_capability(&self, capability: &str) -> EntitySet {
        self.find_by_type(capability)
    }

    /// Entities with a property.
    #[must_use]
    pub fn find_by_property(&self, property: &str) -> EntitySet {
        self.tables.read().properties.get(property)
    }

    /// Entities with at least one property starting with `prefix`.
    #[must_use]
    pub fn find_by_property_prefix(&self, prefix: &str) -> EntitySet {
        self.tables.read().properties.with_prefix(prefix)
    }

    /// Targets of `source`, optionally through one relationship only.
    #[must_use]
    pub fn find_relationship_targets(&self, source: EntityId, relationship: Option<&str>) -> EntitySet {
        self.tables.read().edges.targets_of(source, relationship)
    }

    /// Sources pointing at `target`, optionally through one relationship only.
    #[must_use]
    pub fn find_relationship_sources(&self, target: EntityId, relationship: Option<&str>) -> EntitySet {
        self.tables.read().edges.sources_of(target, relationship)
    }

    /// Entities satisfying every condition of `criteria`.
    ///
    /// Candidate sets are intersected smallest first. Empty criteria match
    /// nothing.
    #[must_use]
    pub fn find_with_criteria(&self, criteria: &Criteria) -> EntitySet {
        let tables = self.tables.read();

        let mut sets: Vec<EntitySet> = Vec::with_capacity(criteria.condition_count());
        sets.extend(criteria.types.iter().map(|t| tables.types.get(t)));
        sets.extend(criteria.properties.iter().map(|p| tables.properties.get(p)));
        sets.extend(
            criteria
                .property_prefixes
                .iter()
                .map(|p| tables.properties.with_prefix(p)),
        );
        sets.extend(
            criteria
                .targets
                .iter()
                .map(|(rel, target)| tables.edges.sources_of(*target, Some(rel.as_str()))),
        );
        drop(tables);

        sets.sort_by_key(EntitySet::len);
        let mut sets = sets.into_iter();
        let Some(first) = sets.next() else {
            return EntitySet::new();
        };
        sets.fold(first, |acc, set| {
            if acc.is_empty() {
                acc
            } else {
                acc.intersection(set)
            }
        })
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Types and capabilities indexed for an entity.
    #[must_use]
    pub fn types_of(&self, entity: EntityId) -> Vec<String> {
        self.tables
            .read()
            .types
            .names_of(entity)
            .map(|names| names.iter().map(ToString::to_string).collect())
            .unwrap_or_default()
    }

    /// Properties indexed for an entity.
    #[must_use]
    pub fn properties_of(&self, entity: EntityId) -> Vec<String> {
        self.tables
            .read()
            .properties
            .names_of(entity)
            .map(|names| names.iter().map(ToString::to_string).collect())
            .unwrap_or_default()
    }

    /// Returns true if the entity is indexed under `type_name`.
    #[must_use]
    pub fn has_type(&self, entity: EntityId, type_name: &str) -> bool {
        self.tables.read().types.contains(entity, type_name)
    }

    /// Returns true if the entity is indexed with `property`.
    #[must_use]
    pub fn has_property(&self, entity: EntityId, property: &str) -> bool {
        self.tables.read().properties.contains(entity, property)
    }

    /// Returns true if the entity has outgoing edges (through `relationship`, if given).
    #[must_use]
    pub fn has_relationship(&self, entity: EntityId, relationship: Option<&str>) -> bool {
        self.tables.read().edges.has_outgoing(entity, relationship)
    }

    /// Returns true if any edge (through `relationship`, if given) targets the entity.
    #[must_use]
    pub fn is_targeted(&self, entity: EntityId, relationship: Option<&str>) -> bool {
        self.tables.read().edges.has_incoming(entity, relationship)
    }

    /// Every indexed type and capability name, sorted.
    #[must_use]
    pub fn all_types(&self) -> Vec<String> {
        self.tables.read().types.names().map(ToString::to_string).collect()
    }

    /// Every indexed property name, sorted.
    #[must_use]
    pub fn all_property_names(&self) -> Vec<String> {
        self.tables
            .read()
            .properties
            .names()
            .map(ToString::to_string)
            .collect()
    }

    /// Number of distinct indexed types and capabilities.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.tables.read().types.name_count()
    }

    /// Number of indexed entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.tables.read().entities.len()
    }

    /// Returns true if the entity is indexed.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.tables.read().entities.contains(&entity)
    }

    /// Checks that every forward map agrees with its reverse map.
    ///
    /// # Errors
    ///
    /// Returns an `Internal` error describing the first mismatch.
    pub fn verify_symmetry(&self) -> Result<()> {
        self.tables.read().verify().map_err(Error::internal)
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            adds: self.adds.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            repairs: self.repairs.load(Ordering::Relaxed),
        }
    }

    // =========================================================================
    // Store reads
    // =========================================================================

    /// Reads everything the index needs about one entity. No lock is held.
    fn snapshot(&self, entity: EntityId) -> Option<EntitySnapshot> {
        if !self.store.contains(entity) {
            return None;
        }
        let mut snapshot = EntitySnapshot {
            entity,
            ..EntitySnapshot::default()
        };

        if let Some(declared) = self.store.declared_type(entity) {
            let chain = self.store.ancestry_chain(&declared);
            if chain.is_empty() {
                snapshot.types.insert(declared.into());
            } else {
                snapshot.types.extend(chain.into_iter().map(Arc::from));
            }
        }

        for cap in self.store.applied_capabilities(entity) {
            if let Some((base, _)) = cap.split_once(':') {
                if matches!(
                    self.store.schema_kind(base),
                    Some(SchemaKind::Capability { multi_apply: true })
                ) {
                    snapshot.types.insert(base.into());
                }
            }
            snapshot.types.insert(cap.into());
        }

        snapshot
            .properties
            .extend(self.store.property_names(entity).into_iter().map(Arc::from));

        for rel in self.store.relationship_names(entity) {
            let targets: BTreeSet<EntityId> =
                self.store.relationship_targets(entity, &rel).into_iter().collect();
            if !targets.is_empty() {
                snapshot.edges.insert(rel.into(), targets);
            }
        }
        Some(snapshot)
    }
}

impl std::fmt::Debug for RegistryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryIndex")
            .field("entities", &self.entity_count())
            .field("types", &self.type_count())
            .finish_non_exhaustive()
    }
}
