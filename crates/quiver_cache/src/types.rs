//! Schema type cache.
//!
//! Two layers:
//! - a global table of [`TypeInfo`], built once per type name, holding the
//!   ancestry chain and its set form;
//! - per-entity membership rows caching the answer to "is this entity an X".
//!
//! Membership goes through one resolution path. The queried name's
//! [`TypeInfo`] decides whether ancestry or the capability list is consulted,
//! so asking `is_a` about a capability still gives the right answer.
//!
//! Answers are resolved from the store without holding the row lock. Every
//! invalidation bumps an epoch, and an answer is cached only if no
//! invalidation happened while it was being resolved. A reader racing an
//! invalidation still gets its answer, but never leaves it behind.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use quiver_foundation::{EntityId, Interner, Name};
use quiver_store::{SchemaKind, SchemaStore};
use tracing::{debug, trace};

/// How a schema name participates in membership checks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Registered primary type.
    Primary,
    /// Registered capability.
    Capability {
        /// Whether named instances (`Name:instance`) exist.
        multi_apply: bool,
    },
    /// Unknown to the store's schema registry.
    Unregistered,
}

impl From<Option<SchemaKind>> for TypeKind {
    fn from(kind: Option<SchemaKind>) -> Self {
        match kind {
            Some(SchemaKind::Primary) => Self::Primary,
            Some(SchemaKind::Capability { multi_apply }) => Self::Capability { multi_apply },
            None => Self::Unregistered,
        }
    }
}

/// Per-type metadata, computed once per name.
#[derive(Debug)]
pub struct TypeInfo {
    /// The type's name.
    pub name: Name,
    /// Primary, capability, or unregistered.
    pub kind: TypeKind,
    /// The type itself first, then its ancestors up to the root.
    pub ancestry: Vec<Name>,
    ancestors: HashSet<Name>,
}

impl TypeInfo {
    /// Returns true if `other` is this type or one of its ancestors.
    #[must_use]
    pub fn descends_from(&self, other: &Name) -> bool {
        self.ancestors.contains(other)
    }

    /// Returns true for capabilities.
    #[must_use]
    pub fn is_capability(&self) -> bool {
        matches!(self.kind, TypeKind::Capability { .. })
    }
}

/// Which resolution strategy produced a cached membership answer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Ancestor-set lookup on the declared type.
    Ancestry,
    /// Scan of the applied capability list.
    CapabilityList,
    /// Plain comparison with an unregistered declared type.
    DeclaredName,
}

#[derive(Debug, Default)]
struct MembershipRow {
    /// Outer `None` means not yet fetched.
    declared: Option<Option<Name>>,
    answers: HashMap<Name, (bool, Strategy)>,
}

#[derive(Debug, Default)]
struct Rows {
    /// Bumped by every invalidation.
    epoch: u64,
    map: HashMap<EntityId, MembershipRow>,
}

/// Counter snapshot for a [`SchemaTypeCache`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeCacheStats {
    /// Type infos built.
    pub type_builds: u64,
    /// Membership answers served from a row.
    pub hits: u64,
    /// Membership answers resolved against the store.
    pub misses: u64,
}

/// Global ancestry cache plus per-entity membership rows.
pub struct SchemaTypeCache {
    store: Arc<dyn SchemaStore>,
    interner: Arc<Interner>,
    types: RwLock<HashMap<Name, Arc<TypeInfo>>>,
    rows: RwLock<Rows>,
    type_builds: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SchemaTypeCache {
    /// Creates an empty cache. Type names are interned through `interner`.
    #[must_use]
    pub fn new(store: Arc<dyn SchemaStore>, interner: Arc<Interner>) -> Self {
        Self {
            store,
            interner,
            types: RwLock::new(HashMap::new()),
            rows: RwLock::new(Rows::default()),
            type_builds: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the metadata for a type, building it on first use.
    pub fn type_info(&self, name: &Name) -> Arc<TypeInfo> {
        if let Some(info) = self.types.read().get(name) {
            return Arc::clone(info);
        }

        let kind = TypeKind::from(self.store.schema_kind(name.as_str()));
        let ancestry: Vec<Name> = match kind {
            TypeKind::Primary => self
                .store
                .ancestry_chain(name.as_str())
                .iter()
                .map(|t| self.interner.get_or_create(t))
                .collect(),
            TypeKind::Capability { .. } | TypeKind::Unregistered => vec![name.clone()],
        };
        let ancestors = ancestry.iter().cloned().collect();
        let info = Arc::new(TypeInfo {
            name: name.clone(),
            kind,
            ancestry,
            ancestors,
        });

        self.type_builds.fetch_add(1, Ordering::Relaxed);
        debug!(name = %name, ?kind, "built type info");
        Arc::clone(self.types.write().entry(name.clone()).or_insert(info))
    }

    /// Returns true if the entity is (or inherits from) `type_name`, or has
    /// it applied as a capability.
    pub fn is_a(&self, entity: EntityId, type_name: &Name) -> bool {
        self.membership(entity, type_name).0
    }

    /// Returns true if the entity has `capability` applied.
    ///
    /// Resolves through the same path as [`is_a`](Self::is_a); the answer
    /// does not depend on which of the two is called.
    pub fn has_capability(&self, entity: EntityId, capability: &Name) -> bool {
        self.membership(entity, capability).0
    }

    /// Returns the membership answer and the strategy that produced it.
    pub fn membership(&self, entity: EntityId, name: &Name) -> (bool, Strategy) {
        let epoch = {
            let rows = self.rows.read();
            if let Some(answer) = rows
                .map
                .get(&entity)
                .and_then(|row| row.answers.get(name).copied())
            {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return answer;
            }
            rows.epoch
        };

        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(entity = %entity, name = %name, "membership miss");
        let info = self.type_info(name);
        let answer = match info.kind {
            TypeKind::Primary => {
                let found = self
                    .declared_type(entity)
                    .is_some_and(|declared| self.type_info(&declared).descends_from(name));
                (found, Strategy::Ancestry)
            }
            TypeKind::Capability { multi_apply } => {
                let caps = self.store.applied_capabilities(entity);
                let found = caps.iter().any(|cap| {
                    cap == name.as_str()
                        || (multi_apply
                            && cap
                                .strip_prefix(name.as_str())
                                .is_some_and(|rest| rest.starts_with(':')))
                });
                (found, Strategy::CapabilityList)
            }
            TypeKind::Unregistered => {
                let found = self.declared_type(entity).as_ref() == Some(name);
                (found, Strategy::DeclaredName)
            }
        };

        self.fill_row(entity, epoch, |row| {
            row.answers.insert(name.clone(), answer);
        });
        answer
    }

    /// Returns the entity's declared type, cached in its row.
    pub fn declared_type(&self, entity: EntityId) -> Option<Name> {
        let epoch = {
            let rows = self.rows.read();
            if let Some(declared) = rows.map.get(&entity).and_then(|row| row.declared.clone()) {
                return declared;
            }
            rows.epoch
        };

        let declared = self
            .store
            .declared_type(entity)
            .map(|t| self.interner.get_or_create(&t));
        self.fill_row(entity, epoch, |row| row.declared = Some(declared.clone()));
        declared
    }

    /// Drops the entity's whole membership row.
    ///
    /// Answers still being resolved when this runs are not cached.
    pub fn invalidate_entity(&self, entity: EntityId) -> bool {
        let mut rows = self.rows.write();
        rows.epoch += 1;
        rows.map.remove(&entity).is_some()
    }

    /// Drops every row and every type info.
    pub fn clear(&self) {
        {
            let mut rows = self.rows.write();
            rows.epoch += 1;
            rows.map.clear();
        }
        self.types.write().clear();
    }

    /// Returns the number of type infos built.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.read().len()
    }

    /// Returns the number of entities with a membership row.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.rows.read().map.len()
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> TypeCacheStats {
        TypeCacheStats {
            type_builds: self.type_builds.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Updates the entity's row, unless an invalidation ran since `epoch`.
    fn fill_row(&self, entity: EntityId, epoch: u64, fill: impl FnOnce(&mut MembershipRow)) {
        let mut rows = self.rows.write();
        if rows.epoch != epoch {
            trace!(entity = %entity, "invalidated while resolving, not cached");
            return;
        }
        fill(rows.map.entry(entity).or_default());
    }
}

impl std::fmt::Debug for SchemaTypeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaTypeCache")
            .field("types", &self.type_count())
            .field("entities", &self.entity_count())
            .finish_non_exhaustive()
    }
}
