//! Generational entity allocation.
//!
//! The `EntityAllocator` hands out [`EntityId`]s and bumps a slot's
//! generation on release, so ids held by caches after an entity is destroyed
//! can never match a later entity that reuses the slot.

// Allow u64 to usize casts - we target 64-bit systems
#![allow(clippy::cast_possible_truncation)]

use quiver_foundation::{EntityId, Error, Result};

/// Allocates entity ids and tracks which are live.
///
/// Even generations are free, odd generations are alive.
#[derive(Debug, Clone, Default)]
pub struct EntityAllocator {
    generations: Vec<u32>,
    free_list: Vec<u64>,
    live_count: usize,
}

impl EntityAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh id, reusing a released slot when one is available.
    pub fn allocate(&mut self) -> EntityId {
        self.live_count += 1;

        if let Some(index) = self.free_list.pop() {
            let idx = index as usize;
            self.generations[idx] += 1;
            EntityId::new(index, self.generations[idx])
        } else {
            let index = self.generations.len() as u64;
            self.generations.push(1);
            EntityId::new(index, 1)
        }
    }

    /// Releases an id.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is stale or was never allocated.
    pub fn release(&mut self, id: EntityId) -> Result<()> {
        self.validate(id)?;

        self.generations[id.index as usize] += 1;
        self.free_list.push(id.index);
        self.live_count -= 1;
        Ok(())
    }

    /// Returns true if the id refers to a live entity.
    #[must_use]
    pub fn is_live(&self, id: EntityId) -> bool {
        self.generations
            .get(id.index as usize)
            .is_some_and(|&current| current == id.generation && current % 2 == 1)
    }

    /// Validates that an id is live.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if the id was never allocated or is free.
    pub fn validate(&self, id: EntityId) -> Result<()> {
        if self.is_live(id) {
            Ok(())
        } else {
            Err(Error::entity_not_found(id))
        }
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Returns true if no entity is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Iterates over all live ids in index order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.generations
            .iter()
            .enumerate()
            .filter(|(_, generation)| *generation % 2 == 1)
            .map(|(idx, generation)| EntityId::new(idx as u64, *generation))
    }
}
