//! Forward/reverse tables behind the registry index.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use quiver_foundation::EntityId;

use crate::EntitySet;

// =============================================================================
// Name Index
// =============================================================================

/// Name -> entities, with the exact reverse map entity -> names.
///
/// Forward keys are ordered so prefix queries are a range scan.
#[derive(Clone, Debug, Default)]
pub(crate) struct NameIndex {
    forward: BTreeMap<Arc<str>, EntitySet>,
    reverse: HashMap<EntityId, BTreeSet<Arc<str>>>,
}

impl NameIndex {
    pub(crate) fn insert(&mut self, name: Arc<str>, entity: EntityId) {
        self.forward
            .entry(Arc::clone(&name))
            .or_default()
            .insert(entity);
        self.reverse.entry(entity).or_default().insert(name);
    }

    /// Removes every entry of `entity`, pruning empty buckets.
    pub(crate) fn remove_entity(&mut self, entity: EntityId) -> bool {
        let Some(names) = self.reverse.remove(&entity) else {
            return false;
        };
        for name in names {
            if let Some(bucket) = self.forward.get_mut(&name) {
                bucket.remove(&entity);
                if bucket.is_empty() {
                    self.forward.remove(&name);
                }
            }
        }
        true
    }

    pub(crate) fn get(&self, name: &str) -> EntitySet {
        self.forward.get(name).cloned().unwrap_or_default()
    }

    pub(crate) fn with_prefix(&self, prefix: &str) -> EntitySet {
        self.forward
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(name, _)| name.starts_with(prefix))
            .fold(EntitySet::new(), |acc, (_, bucket)| acc.union(bucket.clone()))
    }

    pub(crate) fn names_of(&self, entity: EntityId) -> Option<&BTreeSet<Arc<str>>> {
        self.reverse.get(&entity)
    }

    pub(crate) fn contains(&self, entity: EntityId, name: &str) -> bool {
        self.reverse
            .get(&entity)
            .is_some_and(|names| names.contains(name))
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &Arc<str>> {
        self.forward.keys()
    }

    pub(crate) fn name_count(&self) -> usize {
        self.forward.len()
    }

    /// Checks that forward and reverse agree, returning the first mismatch.
    pub(crate) fn verify(&self, label: &str) -> Result<(), String> {
        for (name, bucket) in &self.forward {
            if bucket.is_empty() {
                return Err(format!("{label}: empty bucket for {name}"));
            }
            for entity in bucket {
                if !self.contains(*entity, name) {
                    return Err(format!("{label}: {name} -> {entity} has no reverse entry"));
                }
            }
        }
        for (entity, names) in &self.reverse {
            for name in names {
                if !self.forward.get(name).is_some_and(|b| b.contains(entity)) {
                    return Err(format!("{label}: {entity} -> {name} has no forward entry"));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Edge Index
// =============================================================================

type Edges = HashMap<EntityId, BTreeMap<Arc<str>, EntitySet>>;

/// Relationship edges indexed from both ends.
#[derive(Clone, Debug, Default)]
pub(crate) struct EdgeIndex {
    /// Source -> relationship -> targets.
    targets: Edges,
    /// Target -> relationship -> sources.
    sources: Edges,
}

fn link(edges: &mut Edges, from: EntityId, rel: &Arc<str>, to: EntityId) {
    edges
        .entry(from)
        .or_default()
        .entry(Arc::clone(rel))
        .or_default()
        .insert(to);
}

fn unlink(edges: &mut Edges, from: EntityId, rel: &str, to: EntityId) {
    let Some(by_rel) = edges.get_mut(&from) else {
        return;
    };
    if let Some(set) = by_rel.get_mut(rel) {
        set.remove(&to);
        if set.is_empty() {
            by_rel.remove(rel);
        }
    }
    if by_rel.is_empty() {
        edges.remove(&from);
    }
}

fn collect(edges: &Edges, from: EntityId, rel: Option<&str>) -> EntitySet {
    let Some(by_rel) = edges.get(&from) else {
        return EntitySet::new();
    };
    match rel {
        Some(rel) => by_rel.get(rel).cloned().unwrap_or_default(),
        None => by_rel
            .values()
            .fold(EntitySet::new(), |acc, set| acc.union(set.clone())),
    }
}

fn present(edges: &Edges, from: EntityId, rel: Option<&str>) -> bool {
    edges.get(&from).is_some_and(|by_rel| match rel {
        Some(rel) => by_rel.contains_key(rel),
        None => !by_rel.is_empty(),
    })
}

impl EdgeIndex {
    pub(crate) fn insert(&mut self, source: EntityId, rel: &Arc<str>, target: EntityId) {
        link(&mut self.targets, source, rel, target);
        link(&mut self.sources, target, rel, source);
    }

    /// Removes the outgoing edges of `source`.
    pub(crate) fn remove_source(&mut self, source: EntityId) -> bool {
        let Some(by_rel) = self.targets.remove(&source) else {
            return false;
        };
        for (rel, targets) in by_rel {
            for target in targets {
                unlink(&mut self.sources, target, &rel, source);
            }
        }
        true
    }

    /// Removes the incoming edges of `target`.
    pub(crate) fn remove_target(&mut self, target: EntityId) -> bool {
        let Some(by_rel) = self.sources.remove(&target) else {
            return false;
        };
        for (rel, sources) in by_rel {
            for source in sources {
                unlink(&mut self.targets, source, &rel, target);
            }
        }
        true
    }

    pub(crate) fn targets_of(&self, source: EntityId, rel: Option<&str>) -> EntitySet {
        collect(&self.targets, source, rel)
    }

    pub(crate) fn sources_of(&self, target: EntityId, rel: Option<&str>) -> EntitySet {
        collect(&self.sources, target, rel)
    }

    pub(crate) fn has_outgoing(&self, source: EntityId, rel: Option<&str>) -> bool {
        present(&self.targets, source, rel)
    }

    pub(crate) fn has_incoming(&self, target: EntityId, rel: Option<&str>) -> bool {
        present(&self.sources, target, rel)
    }

    /// Outgoing edges of `source` in comparable form.
    pub(crate) fn outgoing(&self, source: EntityId) -> BTreeMap<Arc<str>, BTreeSet<EntityId>> {
        self.targets
            .get(&source)
            .map(|by_rel| {
                by_rel
                    .iter()
                    .map(|(rel, set)| (Arc::clone(rel), set.iter().copied().collect()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn verify(&self) -> Result<(), String> {
        for (source, by_rel) in &self.targets {
            for (rel, targets) in by_rel {
                if targets.is_empty() {
                    return Err(format!("edges: empty {rel} bucket on {source}"));
                }
                for target in targets {
                    let back = self
                        .sources
                        .get(target)
                        .and_then(|m| m.get(rel))
                        .is_some_and(|s| s.contains(source));
                    if !back {
                        return Err(format!("edges: {source} -{rel}-> {target} not reversed"));
                    }
                }
            }
        }
        for (target, by_rel) in &self.sources {
            for (rel, sources) in by_rel {
                for source in sources {
                    let fwd = self
                        .targets
                        .get(source)
                        .and_then(|m| m.get(rel))
                        .is_some_and(|t| t.contains(target));
                    if !fwd {
                        return Err(format!("edges: {source} -{rel}-> {target} not forward"));
                    }
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Combined Tables
// =============================================================================

/// Everything the index knows about one entity, read from the store.
#[derive(Clone, Debug, Default)]
pub(crate) struct EntitySnapshot {
    pub(crate) entity: EntityId,
    pub(crate) types: BTreeSet<Arc<str>>,
    pub(crate) properties: BTreeSet<Arc<str>>,
    pub(crate) edges: BTreeMap<Arc<str>, BTreeSet<EntityId>>,
}

/// All tables, guarded together by the registry's lock.
#[derive(Clone, Debug, Default)]
pub(crate) struct IndexTables {
    pub(crate) types: NameIndex,
    pub(crate) properties: NameIndex,
    pub(crate) edges: EdgeIndex,
    pub(crate) entities: HashSet<EntityId>,
}

impl IndexTables {
    /// Replaces everything `snapshot.entity` contributes as a source.
    ///
    /// Edges in which the entity is a target belong to other sources and are
    /// left alone.
    pub(crate) fn apply(&mut self, snapshot: &EntitySnapshot) {
        let entity = snapshot.entity;
        self.unindex_source(entity);

        for ty in &snapshot.types {
            self.types.insert(Arc::clone(ty), entity);
        }
        for prop in &snapshot.properties {
            self.properties.insert(Arc::clone(prop), entity);
        }
        for (rel, targets) in &snapshot.edges {
            for target in targets {
                self.edges.insert(entity, rel, *target);
            }
        }
        self.entities.insert(entity);
    }

    /// Removes the entity completely, incoming edges included.
    pub(crate) fn remove(&mut self, entity: EntityId) -> bool {
        let was_indexed = self.unindex_source(entity);
        let was_targeted = self.edges.remove_target(entity);
        was_indexed || was_targeted
    }

    fn unindex_source(&mut self, entity: EntityId) -> bool {
        let a = self.types.remove_entity(entity);
        let b = self.properties.remove_entity(entity);
        let c = self.edges.remove_source(entity);
        let d = self.entities.remove(&entity);
        a || b || c || d
    }

    /// Returns true if the tables already hold exactly this snapshot.
    pub(crate) fn matches(&self, snapshot: &EntitySnapshot) -> bool {
        let entity = snapshot.entity;
        let empty = BTreeSet::new();
        self.entities.contains(&entity)
            && self.types.names_of(entity).unwrap_or(&empty) == &snapshot.types
            && self.properties.names_of(entity).unwrap_or(&empty) == &snapshot.properties
            && self.edges.outgoing(entity) == snapshot.edges
    }

    pub(crate) fn verify(&self) -> Result<(), String> {
        self.types.verify("types")?;
        self.properties.verify("properties")?;
        self.edges.verify()
    }
}
