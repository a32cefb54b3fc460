//! Result value cache.
//!
//! Holds decoded property values per entity, with dirty tracking. A write
//! updates the cached value immediately and marks it dirty; readers see it
//! before it ever reaches the store. Sync writes dirty entries back through
//! their handles and clears the flag only on success.
//!
//! Each entity row carries its own mutex, which gives per-entity
//! linearizability without a global write lock. Rows are locked one at a
//! time; eviction never holds two row locks at once.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use quiver_foundation::{EntityId, Error, ErrorContext, Name, PropertyValue, Result, Value};
use tracing::{debug, trace, warn};

use crate::handle::{PropertyHandle, PropertyHandleCache};

// =============================================================================
// Entries
// =============================================================================

/// A cached, decoded property value.
#[derive(Clone, Debug)]
pub struct CachedValue {
    /// Last value read or written.
    pub value: Value,
    /// True if the value has not reached the store yet.
    pub dirty: bool,
    /// Handle the value was read through or will be written through.
    pub handle: Arc<PropertyHandle>,
    /// Logical clock stamp of the last access.
    pub last_access: u64,
}

#[derive(Debug, Default)]
struct ValueRow {
    entries: HashMap<Name, CachedValue>,
    /// Set once the row is unlinked from the cache; holders must look it up again.
    retired: bool,
}

type SharedRow = Arc<Mutex<ValueRow>>;

// =============================================================================
// Sync reporting
// =============================================================================

/// One entry that could not be written back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncFailureEntry {
    /// The entity owning the value.
    pub entity: EntityId,
    /// The property that failed.
    pub property: Name,
    /// Why the write failed.
    pub reason: String,
}

/// Outcome of a sync pass.
#[derive(Clone, Debug, Default)]
pub struct SyncReport {
    /// Entries written and marked clean.
    pub written: usize,
    /// Entries that stayed dirty.
    pub failures: Vec<SyncFailureEntry>,
}

impl SyncReport {
    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: SyncReport) {
        self.written += other.written;
        self.failures.extend(other.failures);
    }

    /// Converts the report into a result.
    ///
    /// # Errors
    ///
    /// Returns a `SyncFailure` for the first failed entry; the others are
    /// listed as context notes.
    pub fn into_result(self) -> Result<usize> {
        let mut failures = self.failures.into_iter();
        let Some(first) = failures.next() else {
            return Ok(self.written);
        };

        let mut context = ErrorContext::new()
            .with_operation("sync")
            .with_entity(first.entity);
        for other in failures {
            context = context.with_note(format!(
                "also failed: {} on {}: {}",
                other.property, other.entity, other.reason
            ));
        }
        Err(Error::sync_failure(first.entity, first.property.as_str(), first.reason)
            .with_context(context))
    }
}

/// Counter snapshot for a [`ResultValueCache`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ValueCacheStats {
    /// Reads answered from the cache.
    pub hits: u64,
    /// Reads that went to the store.
    pub misses: u64,
    /// Writes accepted into the cache.
    pub writes: u64,
    /// Entries written back successfully.
    pub synced: u64,
    /// Write-back attempts that failed.
    pub sync_failures: u64,
    /// Clean entries evicted for capacity.
    pub evictions: u64,
    /// Stale handles transparently re-resolved.
    pub re_resolutions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    synced: AtomicU64,
    sync_failures: AtomicU64,
    evictions: AtomicU64,
    re_resolutions: AtomicU64,
}

// =============================================================================
// ResultValueCache
// =============================================================================

/// Per-entity cache of decoded property values.
pub struct ResultValueCache {
    handles: Arc<PropertyHandleCache>,
    rows: RwLock<HashMap<EntityId, SharedRow>>,
    capacity: usize,
    clock: AtomicU64,
    len: AtomicUsize,
    counters: Counters,
}

impl ResultValueCache {
    /// Creates an unbounded cache.
    #[must_use]
    pub fn new(handles: Arc<PropertyHandleCache>) -> Self {
        Self::with_capacity(handles, usize::MAX)
    }

    /// Creates a cache that evicts clean entries beyond `capacity`.
    #[must_use]
    pub fn with_capacity(handles: Arc<PropertyHandleCache>, capacity: usize) -> Self {
        Self {
            handles,
            rows: RwLock::new(HashMap::new()),
            capacity,
            clock: AtomicU64::new(0),
            len: AtomicUsize::new(0),
            counters: Counters::default(),
        }
    }

    /// Returns the handle cache values are resolved through.
    #[must_use]
    pub fn handles(&self) -> &Arc<PropertyHandleCache> {
        &self.handles
    }

    /// Returns the configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // --- Reads ---

    /// Reads a typed property.
    ///
    /// Returns `None` if the property does not exist or holds another kind.
    pub fn get<T: PropertyValue>(&self, entity: EntityId, name: &Name) -> Option<T> {
        self.get_raw(entity, name).and_then(|v| T::from_value(&v))
    }

    /// Reads a typed property, reporting a kind mismatch as an error.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the stored value cannot decode as `T`.
    pub fn try_get<T: PropertyValue>(&self, entity: EntityId, name: &Name) -> Result<Option<T>> {
        match self.get_raw(entity, name) {
            None => Ok(None),
            Some(v) => T::from_value(&v)
                .map(Some)
                .ok_or_else(|| Error::type_mismatch(T::KIND, v.kind())),
        }
    }

    /// Reads a property as an untyped [`Value`].
    pub fn get_raw(&self, entity: EntityId, name: &Name) -> Option<Value> {
        let value = loop {
            let shared = self.row_for(entity);
            let mut row = shared.lock();
            if row.retired {
                continue;
            }
            let stamp = self.tick();

            if let Some(entry) = row.entries.get_mut(name) {
                if entry.dirty || entry.handle.is_valid() {
                    entry.last_access = stamp;
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
            }
            if row.entries.remove(name).is_some() {
                self.len.fetch_sub(1, Ordering::Relaxed);
            }

            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            trace!(entity = %entity, name = %name, "value miss");
            let Some((handle, value)) = self.load(entity, name) else {
                self.retire_if_empty(entity, &shared, &mut row);
                return None;
            };
            row.entries.insert(
                name.clone(),
                CachedValue {
                    value: value.clone(),
                    dirty: false,
                    handle,
                    last_access: stamp,
                },
            );
            self.len.fetch_add(1, Ordering::Relaxed);
            break value;
        };

        self.evict_over_capacity();
        Some(value)
    }

    /// Returns true if the entry exists and has not been synced.
    #[must_use]
    pub fn is_dirty(&self, entity: EntityId, name: &Name) -> bool {
        self.existing_row(entity)
            .is_some_and(|row| row.lock().entries.get(name).is_some_and(|e| e.dirty))
    }

    // --- Writes ---

    /// Writes a typed property into the cache and marks it dirty.
    ///
    /// Returns `false` if the store has no such property.
    pub fn set<T: PropertyValue>(&self, entity: EntityId, name: &Name, value: T) -> bool {
        self.set_raw(entity, name, value.into_value())
    }

    /// Writes an untyped value into the cache and marks it dirty.
    pub fn set_raw(&self, entity: EntityId, name: &Name, value: Value) -> bool {
        loop {
            let shared = self.row_for(entity);
            let mut row = shared.lock();
            if row.retired {
                continue;
            }
            let stamp = self.tick();

            if let Some(entry) = row.entries.get_mut(name) {
                entry.value = value;
                entry.dirty = true;
                entry.last_access = stamp;
            } else {
                let handle = self.handles.get_handle(entity, name);
                if !handle.exists() {
                    self.retire_if_empty(entity, &shared, &mut row);
                    return false;
                }
                row.entries.insert(
                    name.clone(),
                    CachedValue {
                        value,
                        dirty: true,
                        handle,
                        last_access: stamp,
                    },
                );
                self.len.fetch_add(1, Ordering::Relaxed);
            }
            self.counters.writes.fetch_add(1, Ordering::Relaxed);
            return true;
        }
    }

    // --- Write-back ---

    /// Writes the entity's dirty entries to the store.
    ///
    /// The row stays locked for the duration, so no write to this entity can
    /// interleave with its sync.
    pub fn sync_entity(&self, entity: EntityId) -> SyncReport {
        let Some(row) = self.existing_row(entity) else {
            return SyncReport::default();
        };
        let mut row = row.lock();
        let mut report = SyncReport::default();

        for (name, entry) in row.entries.iter_mut().filter(|(_, e)| e.dirty) {
            match self.write_back(entity, name, entry) {
                Ok(()) => {
                    entry.dirty = false;
                    report.written += 1;
                    self.counters.synced.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    self.counters.sync_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(entity = %entity, property = %name, error = %err, "sync failed");
                    report.failures.push(SyncFailureEntry {
                        entity,
                        property: name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Writes every dirty entry to the store.
    pub fn sync_all(&self) -> SyncReport {
        let entities: Vec<EntityId> = self.rows.read().keys().copied().collect();
        let mut report = SyncReport::default();
        for entity in entities {
            report.merge(self.sync_entity(entity));
        }
        if report.written > 0 || !report.is_clean() {
            debug!(written = report.written, failed = report.failures.len(), "synced values");
        }
        report
    }

    // --- Invalidation ---

    /// Drops the entity's clean entries. Dirty entries survive and are
    /// re-resolved when synced.
    pub fn invalidate_entity(&self, entity: EntityId) -> usize {
        let Some(row) = self.existing_row(entity) else {
            return 0;
        };
        let mut row = row.lock();
        let before = row.entries.len();
        row.entries.retain(|_, e| e.dirty);
        let dropped = before - row.entries.len();
        self.len.fetch_sub(dropped, Ordering::Relaxed);
        dropped
    }

    /// Drops everything cached for a deleted entity, pending writes included.
    pub fn remove_entity(&self, entity: EntityId) -> usize {
        let Some(row) = self.rows.write().remove(&entity) else {
            return 0;
        };
        let row = row.lock();
        let dirty = row.entries.values().filter(|e| e.dirty).count();
        if dirty > 0 {
            warn!(entity = %entity, dirty, "discarding unsynced values of removed entity");
        }
        self.len.fetch_sub(row.entries.len(), Ordering::Relaxed);
        row.entries.len()
    }

    /// Re-reads the entity's clean entries from the store.
    ///
    /// Entries whose property no longer exists are dropped. Returns the
    /// number of entries refreshed.
    pub fn refresh_entity(&self, entity: EntityId) -> usize {
        let Some(row) = self.existing_row(entity) else {
            return 0;
        };
        let mut row = row.lock();
        let clean: Vec<Name> = row
            .entries
            .iter()
            .filter(|(_, e)| !e.dirty)
            .map(|(n, _)| n.clone())
            .collect();

        let mut refreshed = 0;
        for name in clean {
            if let Some((handle, value)) = self.load(entity, &name) {
                if let Some(entry) = row.entries.get_mut(&name) {
                    entry.value = value;
                    entry.handle = handle;
                    refreshed += 1;
                }
            } else if row.entries.remove(&name).is_some() {
                self.len.fetch_sub(1, Ordering::Relaxed);
            }
        }
        refreshed
    }

    /// Drops every entry, dirty ones included.
    pub fn clear(&self) {
        self.rows.write().clear();
        self.len.store(0, Ordering::Relaxed);
    }

    // --- Introspection ---

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of entities with a row.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns the number of entries waiting for sync.
    #[must_use]
    pub fn dirty_count(&self) -> usize {
        let rows: Vec<SharedRow> = self.rows.read().values().cloned().collect();
        rows.iter()
            .map(|row| row.lock().entries.values().filter(|e| e.dirty).count())
            .sum()
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> ValueCacheStats {
        let c = &self.counters;
        ValueCacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            writes: c.writes.load(Ordering::Relaxed),
            synced: c.synced.load(Ordering::Relaxed),
            sync_failures: c.sync_failures.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            re_resolutions: c.re_resolutions.load(Ordering::Relaxed),
        }
    }

    // --- Internals ---

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn existing_row(&self, entity: EntityId) -> Option<SharedRow> {
        self.rows.read().get(&entity).cloned()
    }

    /// Unlinks a row left empty by a failed lookup. Threads already holding
    /// it see `retired` and look the row up again.
    fn retire_if_empty(&self, entity: EntityId, shared: &SharedRow, row: &mut ValueRow) {
        if !row.entries.is_empty() {
            return;
        }
        row.retired = true;
        let mut rows = self.rows.write();
        if rows.get(&entity).is_some_and(|live| Arc::ptr_eq(live, shared)) {
            rows.remove(&entity);
        }
    }

    fn row_for(&self, entity: EntityId) -> SharedRow {
        if let Some(row) = self.rows.read().get(&entity) {
            return Arc::clone(row);
        }
        Arc::clone(self.rows.write().entry(entity).or_default())
    }

    /// Reads through the handle cache, re-resolving once on a stale handle.
    fn load(&self, entity: EntityId, name: &Name) -> Option<(Arc<PropertyHandle>, Value)> {
        let mut handle = self.handles.get_handle(entity, name);
        if !handle.is_valid() {
            handle = self.handles.resolve_fresh(entity, name);
        }
        let store = self.handles.store();

        match store.get_value(handle.raw()?) {
            Ok(value) => Some((handle, value)),
            Err(err) if err.is_stale() => {
                self.counters.re_resolutions.fetch_add(1, Ordering::Relaxed);
                let handle = self.handles.resolve_fresh(entity, name);
                let value = store.get_value(handle.raw()?).ok()?;
                Some((handle, value))
            }
            Err(_) => None,
        }
    }

    /// Writes one entry, re-resolving once if its handle went stale.
    fn write_back(&self, entity: EntityId, name: &Name, entry: &mut CachedValue) -> Result<()> {
        let store = self.handles.store();

        if !entry.handle.is_valid() {
            entry.handle = self.handles.get_handle(entity, name);
            self.counters.re_resolutions.fetch_add(1, Ordering::Relaxed);
        }
        let raw = entry
            .handle
            .raw()
            .copied()
            .ok_or_else(|| Error::property_not_found(entity, name.as_str()))?;

        match store.set_value(&raw, entry.value.clone()) {
            Err(err) if err.is_stale() => {
                self.counters.re_resolutions.fetch_add(1, Ordering::Relaxed);
                entry.handle = self.handles.resolve_fresh(entity, name);
                let raw = entry
                    .handle
                    .raw()
                    .copied()
                    .ok_or_else(|| Error::property_not_found(entity, name.as_str()))?;
                store.set_value(&raw, entry.value.clone())
            }
            other => other,
        }
    }

    /// Evicts least-recently-used clean entries until within capacity.
    fn evict_over_capacity(&self) {
        let over = self.len().saturating_sub(self.capacity);
        if over == 0 {
            return;
        }

        let rows: Vec<(EntityId, SharedRow)> = self
            .rows
            .read()
            .iter()
            .map(|(e, r)| (*e, Arc::clone(r)))
            .collect();

        let mut candidates: Vec<(u64, EntityId, Name)> = Vec::new();
        for (entity, row) in &rows {
            let row = row.lock();
            candidates.extend(
                row.entries
                    .iter()
                    .filter(|(_, e)| !e.dirty)
                    .map(|(n, e)| (e.last_access, *entity, n.clone())),
            );
        }
        candidates.sort_unstable_by_key(|(stamp, _, _)| *stamp);

        let lookup: HashMap<EntityId, SharedRow> = rows.into_iter().collect();
        let mut evicted = 0;
        for (stamp, entity, name) in candidates {
            if evicted == over {
                break;
            }
            let Some(row) = lookup.get(&entity) else {
                continue;
            };
            let mut row = row.lock();
            // The entry may have been touched since the scan.
            if row
                .entries
                .get(&name)
                .is_some_and(|e| !e.dirty && e.last_access == stamp)
            {
                row.entries.remove(&name);
                self.len.fetch_sub(1, Ordering::Relaxed);
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.counters
                .evictions
                .fetch_add(evicted as u64, Ordering::Relaxed);
            trace!(evicted, "evicted clean values");
        }
    }
}

impl std::fmt::Debug for ResultValueCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultValueCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
