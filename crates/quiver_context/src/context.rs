//! The cache context facade.
//!
//! A [`CacheContext`] owns one instance of every cache service over one
//! store. Nothing is global: several contexts can run side by side, each with
//! its own interner, caches, index, and worker pool.
//!
//! # Mutation hooks
//!
//! The context does not observe the store. Whoever mutates the store
//! structurally must call [`on_entity_added`](CacheContext::on_entity_added),
//! [`on_entity_changed`](CacheContext::on_entity_changed), or
//! [`on_entity_removed`](CacheContext::on_entity_removed) afterwards. A
//! missed call leaves the index stale for that entity until
//! [`revalidate_index`](CacheContext::revalidate_index) repairs it; the
//! caches themselves detect stale handles on their own.

use std::sync::Arc;

use quiver_batch::Batch;
use quiver_cache::{
    HandleStats, PropertyHandle, PropertyHandleCache, ResultValueCache, SchemaTypeCache, SyncReport,
    TypeCacheStats, ValueCacheStats,
};
use quiver_exec::{Pipeline, PoolStats, RelaxedQueryCache, RelaxedStats, WorkerPool, shadow};
use quiver_foundation::{EntityId, Interner, Name, PropertyValue, Result};
use quiver_index::{Criteria, EntitySet, IndexStats, RegistryIndex};
use quiver_store::SchemaStore;
use tracing::{debug, info};

use crate::config::CacheConfig;

/// Counter snapshot across every service of a context.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ContextStats {
    /// Interned names.
    pub interned: usize,
    /// Property handle cache.
    pub handles: HandleStats,
    /// Schema type cache.
    pub types: TypeCacheStats,
    /// Result value cache.
    pub values: ValueCacheStats,
    /// Relaxed membership cache, if enabled.
    pub relaxed: Option<RelaxedStats>,
    /// Registry index.
    pub index: IndexStats,
    /// Worker pool.
    pub pool: PoolStats,
    /// Entries waiting to be synced.
    pub dirty: usize,
}

/// Owns the caches, index, and worker pool over one store.
pub struct CacheContext {
    config: CacheConfig,
    store: Arc<dyn SchemaStore>,
    names: Arc<Interner>,
    handles: Arc<PropertyHandleCache>,
    types: Arc<SchemaTypeCache>,
    values: Arc<ResultValueCache>,
    relaxed: Option<RelaxedQueryCache>,
    index: Arc<RegistryIndex>,
    pool: Arc<WorkerPool>,
}

impl CacheContext {
    /// Creates a context over `store`. The index starts empty; call
    /// [`build_index`](Self::build_index) once the store is populated.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration fails validation, or the
    /// worker pool's error if it cannot start.
    pub fn new(store: Arc<dyn SchemaStore>, config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let names = Arc::new(Interner::new());
        names.pre_intern(config.pre_intern.iter().map(String::as_str));

        let handles = Arc::new(PropertyHandleCache::new(Arc::clone(&store)));
        let types = Arc::new(SchemaTypeCache::new(Arc::clone(&store), Arc::clone(&names)));
        let values = Arc::new(match config.value_capacity {
            Some(capacity) => ResultValueCache::with_capacity(Arc::clone(&handles), capacity),
            None => ResultValueCache::new(Arc::clone(&handles)),
        });
        let relaxed = config
            .relaxed_membership
            .then(|| RelaxedQueryCache::new(Arc::clone(&types)));
        let index = Arc::new(RegistryIndex::new(Arc::clone(&store)));
        let pool = Arc::new(WorkerPool::new(config.worker_threads)?);

        info!(
            threads = config.worker_threads,
            relaxed = config.relaxed_membership,
            shadows = config.thread_local_shadows,
            "cache context created"
        );

        Ok(Self {
            config,
            store,
            names,
            handles,
            types,
            values,
            relaxed,
            index,
            pool,
        })
    }

    /// Indexes every entity under `root`. Returns the number indexed.
    pub fn build_index(&self, root: EntityId) -> usize {
        self.index.build_from_store(root)
    }

    // --- Names ---

    /// Interns a name, through the thread-local shadow when enabled.
    pub fn intern(&self, name: &str) -> Name {
        if self.config.thread_local_shadows {
            shadow::intern(&self.names, name)
        } else {
            self.names.get_or_create(name)
        }
    }

    /// Returns the handle for a property, through the thread-local shadow
    /// when enabled.
    pub fn property_handle(&self, entity: EntityId, name: &str) -> Arc<PropertyHandle> {
        let name = self.intern(name);
        if self.config.thread_local_shadows {
            shadow::handle(&self.handles, entity, &name)
        } else {
            self.handles.get_handle(entity, &name)
        }
    }

    // --- Properties ---

    /// Reads a property, `None` if it is missing or holds another kind.
    pub fn get_property<T: PropertyValue>(&self, entity: EntityId, name: &str) -> Option<T> {
        self.values.get(entity, &self.intern(name))
    }

    /// Reads a property, reporting a kind mismatch as an error.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the value cannot decode as `T`.
    pub fn try_get_property<T: PropertyValue>(&self, entity: EntityId, name: &str) -> Result<Option<T>> {
        self.values.try_get(entity, &self.intern(name))
    }

    /// Writes a property into the cache. The store sees it on the next sync.
    ///
    /// Returns `false` if the entity has no such property.
    pub fn set_property<T: PropertyValue>(&self, entity: EntityId, name: &str, value: T) -> bool {
        self.values.set(entity, &self.intern(name), value)
    }

    // --- Membership ---

    /// Returns true if the entity's declared type is `type_name` or descends
    /// from it.
    ///
    /// With relaxed membership enabled the answer may lag an invalidation by
    /// one access; use [`is_type_strict`](Self::is_type_strict) where that
    /// matters.
    pub fn is_type(&self, entity: EntityId, type_name: &str) -> bool {
        let name = self.intern(type_name);
        match &self.relaxed {
            Some(relaxed) => relaxed.is_a(entity, &name),
            None => self.types.is_a(entity, &name),
        }
    }

    /// Returns true if the capability is applied to the entity. Relaxed in
    /// the same way as [`is_type`](Self::is_type).
    pub fn has_capability(&self, entity: EntityId, capability: &str) -> bool {
        let name = self.intern(capability);
        match &self.relaxed {
            Some(relaxed) => relaxed.has_capability(entity, &name),
            None => self.types.has_capability(entity, &name),
        }
    }

    /// `is_type` that never consults the relaxed cache.
    pub fn is_type_strict(&self, entity: EntityId, type_name: &str) -> bool {
        self.types.is_a(entity, &self.intern(type_name))
    }

    /// `has_capability` that never consults the relaxed cache.
    pub fn has_capability_strict(&self, entity: EntityId, capability: &str) -> bool {
        self.types.has_capability(entity, &self.intern(capability))
    }

    // --- Queries ---

    /// Entities whose type or ancestry includes `type_name`.
    #[must_use]
    pub fn find_entities_by_type(&self, type_name: &str) -> EntitySet {
        self.index.find_by_type(type_name)
    }

    /// Entities carrying the capability.
    #[must_use]
    pub fn find_entities_by_capability(&self, capability: &str) -> EntitySet {
        self.index.find_by_capability(capability)
    }

    /// Entities with the property.
    #[must_use]
    pub fn find_entities_by_property(&self, property: &str) -> EntitySet {
        self.index.find_by_property(property)
    }

    /// Entities with at least one property named with `prefix`.
    #[must_use]
    pub fn find_entities_by_property_prefix(&self, prefix: &str) -> EntitySet {
        self.index.find_by_property_prefix(prefix)
    }

    /// Entities matching every condition.
    #[must_use]
    pub fn find_with_criteria(&self, criteria: &Criteria) -> EntitySet {
        self.index.find_with_criteria(criteria)
    }

    /// Targets of the entity's relationships (one relationship, or all).
    #[must_use]
    pub fn find_relationship_targets(&self, source: EntityId, relationship: Option<&str>) -> EntitySet {
        self.index.find_relationship_targets(source, relationship)
    }

    /// Entities whose relationships point at `target`.
    #[must_use]
    pub fn find_relationship_sources(&self, target: EntityId, relationship: Option<&str>) -> EntitySet {
        self.index.find_relationship_sources(target, relationship)
    }

    // --- Sync ---

    /// Writes every dirty value to the store.
    pub fn sync_dirty_to_store(&self) -> SyncReport {
        self.values.sync_all()
    }

    /// Writes one entity's dirty values to the store.
    pub fn sync_entity(&self, entity: EntityId) -> SyncReport {
        self.values.sync_entity(entity)
    }

    // --- Invalidation and hooks ---

    /// Drops every cached handle, membership answer, and clean value for the
    /// entity. Pending writes are kept.
    pub fn invalidate_entity(&self, entity: EntityId) {
        self.handles.invalidate_entity(entity);
        self.types.invalidate_entity(entity);
        if let Some(relaxed) = &self.relaxed {
            relaxed.invalidate_entity(entity);
        }
        self.values.invalidate_entity(entity);
        debug!(entity = %entity, "entity invalidated");
    }

    /// Call after creating an entity in the store.
    pub fn on_entity_added(&self, entity: EntityId) {
        self.invalidate_entity(entity);
        self.index.add_entity(entity);
    }

    /// Call after changing an entity's type, capabilities, property set, or
    /// relationships.
    pub fn on_entity_changed(&self, entity: EntityId) {
        self.invalidate_entity(entity);
        self.index.update_entity(entity);
    }

    /// Call after deleting an entity. Pending writes for it are discarded.
    pub fn on_entity_removed(&self, entity: EntityId) {
        self.handles.invalidate_entity(entity);
        self.types.invalidate_entity(entity);
        if let Some(relaxed) = &self.relaxed {
            relaxed.invalidate_entity(entity);
        }
        self.values.remove_entity(entity);
        self.index.remove_entity(entity);
    }

    /// Re-reads every indexed entity from the store and repairs entries a
    /// missed hook left behind. Returns the number repaired.
    pub fn revalidate_index(&self) -> usize {
        self.index.revalidate_all()
    }

    // --- Batches and execution ---

    /// Batches `fields` for every entity carrying `capability`, in entity
    /// order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `fields` is empty or repeats a field.
    pub fn create_batch(&self, capability: &str, fields: &[&str]) -> Result<Batch> {
        let mut entities: Vec<EntityId> = self.index.find_by_capability(capability).into_iter().collect();
        entities.sort_unstable();
        let fields: Vec<Name> = fields.iter().map(|f| self.intern(f)).collect();
        Batch::build(Arc::clone(&self.values), entities, &fields)
    }

    /// Returns the worker pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Creates a pipeline over the worker pool.
    #[must_use]
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(Arc::clone(&self.pool), self.config.chunk_size)
    }

    /// Drains the worker pool and writes every pending value to the store.
    ///
    /// The context stays usable for reads and writes afterwards, but no more
    /// tasks can be submitted.
    pub fn shutdown(&self) -> SyncReport {
        self.pool.shutdown();
        let report = self.values.sync_all();
        info!(written = report.written, failures = report.failures.len(), "cache context shut down");
        report
    }

    // --- Introspection ---

    /// Returns a snapshot of every service's counters.
    #[must_use]
    pub fn stats(&self) -> ContextStats {
        ContextStats {
            interned: self.names.len(),
            handles: self.handles.stats(),
            types: self.types.stats(),
            values: self.values.stats(),
            relaxed: self.relaxed.as_ref().map(RelaxedQueryCache::stats),
            index: self.index.stats(),
            pool: self.pool.stats(),
            dirty: self.values.dirty_count(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SchemaStore> {
        &self.store
    }

    /// Returns the interner.
    #[must_use]
    pub fn names(&self) -> &Arc<Interner> {
        &self.names
    }

    /// Returns the value cache.
    #[must_use]
    pub fn values(&self) -> &Arc<ResultValueCache> {
        &self.values
    }

    /// Returns the schema type cache.
    #[must_use]
    pub fn types(&self) -> &Arc<SchemaTypeCache> {
        &self.types
    }

    /// Returns the registry index.
    #[must_use]
    pub fn index(&self) -> &Arc<RegistryIndex> {
        &self.index
    }
}

impl std::fmt::Debug for CacheContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheContext")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
