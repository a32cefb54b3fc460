//! Relaxed-consistency membership cache.
//!
//! A sharded concurrent map of boolean membership answers in front of the
//! [`SchemaTypeCache`]. Lookups never take a global lock.
//!
//! # Consistency
//!
//! This cache is weaker than the rest of the system. A reader racing
//! [`invalidate_entity`](RelaxedQueryCache::invalidate_entity) may see the
//! previous answer once, and may even re-insert it if it resolved through
//! the type cache before that cache was invalidated. Any access that starts
//! after both caches have been invalidated resolves fresh. Use the type cache
//! directly for checks that must never observe a stale answer.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use quiver_cache::SchemaTypeCache;
use quiver_foundation::{EntityId, Name};

/// Which question a cached answer belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// `is_a`.
    Type,
    /// `has_capability`.
    Capability,
}

/// Counter snapshot for a [`RelaxedQueryCache`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RelaxedStats {
    /// Answers served from the map.
    pub hits: u64,
    /// Answers forwarded to the type cache.
    pub misses: u64,
}

/// Sharded membership cache with relaxed consistency.
#[derive(Debug)]
pub struct RelaxedQueryCache {
    types: Arc<SchemaTypeCache>,
    answers: DashMap<EntityId, HashMap<(Name, QueryKind), bool>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RelaxedQueryCache {
    /// Creates an empty cache in front of `types`.
    #[must_use]
    pub fn new(types: Arc<SchemaTypeCache>) -> Self {
        Self {
            types,
            answers: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Relaxed `is_a`.
    pub fn is_a(&self, entity: EntityId, type_name: &Name) -> bool {
        self.query(entity, type_name, QueryKind::Type)
    }

    /// Relaxed `has_capability`.
    pub fn has_capability(&self, entity: EntityId, capability: &Name) -> bool {
        self.query(entity, capability, QueryKind::Capability)
    }

    fn query(&self, entity: EntityId, name: &Name, kind: QueryKind) -> bool {
        let key = (name.clone(), kind);
        if let Some(answer) = self
            .answers
            .get(&entity)
            .and_then(|row| row.get(&key).copied())
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return answer;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let answer = match kind {
            QueryKind::Type => self.types.is_a(entity, name),
            QueryKind::Capability => self.types.has_capability(entity, name),
        };
        self.answers.entry(entity).or_default().insert(key, answer);
        answer
    }

    /// Drops every answer for the entity.
    pub fn invalidate_entity(&self, entity: EntityId) -> bool {
        self.answers.remove(&entity).is_some()
    }

    /// Drops everything.
    pub fn clear(&self) {
        self.answers.clear();
    }

    /// Returns the number of cached answers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.answers.iter().map(|row| row.len()).sum()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> RelaxedStats {
        RelaxedStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
