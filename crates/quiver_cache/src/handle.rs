//! Property handle cache.
//!
//! Resolving a property by name is the expensive part of every store access.
//! The cache resolves each (entity, name) pair once and hands out a shared
//! [`PropertyHandle`] until the entity is invalidated. Misses are cached as
//! negative handles, so asking for an absent property twice costs one
//! resolution.
//!
//! Resolution runs outside the cache's locks. Invalidation bumps an epoch,
//! and a handle resolved while the epoch moved is not cached; its caller gets
//! it already marked invalid. A negative answer from before a property was
//! added never outlives the invalidation that announced it.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use quiver_foundation::{EntityId, Name};
use quiver_store::{SchemaStore, StoreHandle};
use tracing::trace;

/// A shared, cached reference to one property of one entity.
#[derive(Debug)]
pub struct PropertyHandle {
    entity: EntityId,
    name: Name,
    raw: Option<StoreHandle>,
    valid: AtomicBool,
}

impl PropertyHandle {
    fn new(entity: EntityId, name: Name, raw: Option<StoreHandle>) -> Self {
        Self {
            entity,
            name,
            raw,
            valid: AtomicBool::new(true),
        }
    }

    /// Returns the entity this handle belongs to.
    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Returns the property name.
    #[must_use]
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Returns the store's handle, or `None` for a cached negative result.
    #[must_use]
    pub fn raw(&self) -> Option<&StoreHandle> {
        self.raw.as_ref()
    }

    /// Returns true if the property existed when the handle was resolved.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.raw.is_some()
    }

    /// Returns false once the entity has been invalidated.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

type Row = HashMap<Name, Arc<PropertyHandle>>;

#[derive(Debug, Default)]
struct Rows {
    /// Bumped by every invalidation.
    epoch: u64,
    map: HashMap<EntityId, Arc<RwLock<Row>>>,
}

/// Source of unique cache ids (0 is never handed out).
static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

/// Counter snapshot for a [`PropertyHandleCache`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HandleStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that went to the store.
    pub misses: u64,
    /// Store resolutions performed, forced refreshes included.
    pub resolutions: u64,
    /// Entity rows dropped by invalidation.
    pub invalidations: u64,
}

/// Per-entity cache of resolved property handles.
pub struct PropertyHandleCache {
    id: u64,
    alive: Arc<()>,
    store: Arc<dyn SchemaStore>,
    rows: RwLock<Rows>,
    hits: AtomicU64,
    misses: AtomicU64,
    resolutions: AtomicU64,
    invalidations: AtomicU64,
}

impl PropertyHandleCache {
    /// Creates an empty cache over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SchemaStore>) -> Self {
        Self {
            id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
            alive: Arc::new(()),
            store,
            rows: RwLock::new(Rows::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            resolutions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Returns an id unique to this cache instance.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns a token that expires when this cache is dropped.
    #[must_use]
    pub fn liveness(&self) -> Weak<()> {
        Arc::downgrade(&self.alive)
    }

    /// Returns the store this cache resolves against.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SchemaStore> {
        &self.store
    }

    /// Returns the handle for `name` on `entity`, resolving it on first use.
    ///
    /// The returned handle may be negative; check [`PropertyHandle::exists`].
    pub fn get_handle(&self, entity: EntityId, name: &Name) -> Arc<PropertyHandle> {
        let epoch = {
            let rows = self.rows.read();
            let cached = rows.map.get(&entity).and_then(|row| row.read().get(name).cloned());
            if let Some(handle) = cached {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return handle;
            }
            rows.epoch
        };

        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(entity = %entity, name = %name, "handle miss");
        let fresh = self.resolve(entity, name);
        self.install(entity, name, fresh, epoch, false)
    }

    /// Resolves `name` again and replaces whatever the row held.
    ///
    /// Used when the store reports a handle as stale.
    pub fn resolve_fresh(&self, entity: EntityId, name: &Name) -> Arc<PropertyHandle> {
        let epoch = self.rows.read().epoch;
        let fresh = self.resolve(entity, name);
        self.install(entity, name, fresh, epoch, true)
    }

    /// Resolves a set of names up front, returning how many exist.
    pub fn precache<'a>(&self, entity: EntityId, names: impl IntoIterator<Item = &'a Name>) -> usize {
        names
            .into_iter()
            .filter(|name| self.get_handle(entity, name).exists())
            .count()
    }

    /// Drops the entity's row and marks every handle in it invalid.
    ///
    /// Returns the number of handles dropped.
    pub fn invalidate_entity(&self, entity: EntityId) -> usize {
        let removed = {
            let mut rows = self.rows.write();
            rows.epoch += 1;
            rows.map.remove(&entity)
        };
        let Some(row) = removed else {
            return 0;
        };
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        let row = row.read();
        for handle in row.values() {
            handle.invalidate();
        }
        row.len()
    }

    /// Drops every row, invalidating all handles.
    pub fn clear(&self) {
        let rows = {
            let mut rows = self.rows.write();
            rows.epoch += 1;
            std::mem::take(&mut rows.map)
        };
        for row in rows.values() {
            for handle in row.read().values() {
                handle.invalidate();
            }
        }
    }

    /// Returns the total number of cached handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().map.values().map(|row| row.read().len()).sum()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of entities with a row.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.rows.read().map.len()
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> HandleStats {
        HandleStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            resolutions: self.resolutions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    fn resolve(&self, entity: EntityId, name: &Name) -> Arc<PropertyHandle> {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        let raw = self.store.resolve_property(entity, name.as_str());
        Arc::new(PropertyHandle::new(entity, name.clone(), raw))
    }

    /// Caches `fresh` unless an invalidation ran since `epoch`, and returns
    /// the handle the caller should use. With `replace`, an existing entry is
    /// superseded and marked invalid; otherwise it wins.
    fn install(
        &self,
        entity: EntityId,
        name: &Name,
        fresh: Arc<PropertyHandle>,
        epoch: u64,
        replace: bool,
    ) -> Arc<PropertyHandle> {
        let mut rows = self.rows.write();
        if rows.epoch != epoch {
            trace!(entity = %entity, name = %name, "invalidated while resolving, not cached");
            fresh.invalidate();
            return fresh;
        }
        let mut row = rows.map.entry(entity).or_default().write();
        if !replace {
            return Arc::clone(row.entry(name.clone()).or_insert(fresh));
        }
        if let Some(old) = row.insert(name.clone(), Arc::clone(&fresh)) {
            old.invalidate();
        }
        fresh
    }
}

impl std::fmt::Debug for PropertyHandleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyHandleCache")
            .field("entities", &self.entity_count())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
