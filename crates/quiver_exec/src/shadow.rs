//! Thread-local shadow caches.
//!
//! Each thread keeps its own copy of the names and handles it has looked up,
//! so repeat lookups take no lock at all. Misses fall through to the shared
//! [`Interner`] or [`PropertyHandleCache`]. Shadows are keyed by the owning
//! instance's id, so several contexts can coexist on one thread.
//!
//! A shadowed handle is checked on every hit; once its entity has been
//! invalidated the shadow entry is dropped and the shared cache consulted.
//!
//! Each table remembers its owner's liveness token. Tables of dropped
//! interners and caches are swept on the thread's next miss, so a long-lived
//! thread serving many short-lived contexts does not accumulate them.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use quiver_cache::{PropertyHandle, PropertyHandleCache};
use quiver_foundation::{EntityId, Interner, Name};

type HandleKey = (EntityId, Name);

/// One owner's shadow entries.
struct Table<K, V> {
    owner: Weak<()>,
    entries: HashMap<K, V>,
}

type Tables<K, V> = HashMap<u64, Table<K, V>>;

/// Drops tables whose owner is gone, then returns the table for `id`.
fn live_table<'a, K, V>(tables: &'a mut Tables<K, V>, id: u64, owner: &Weak<()>) -> &'a mut HashMap<K, V> {
    tables.retain(|_, table| table.owner.strong_count() > 0);
    &mut tables
        .entry(id)
        .or_insert_with(|| Table {
            owner: owner.clone(),
            entries: HashMap::new(),
        })
        .entries
}

thread_local! {
    static NAMES: RefCell<Tables<Box<str>, Name>> = RefCell::new(HashMap::new());
    static HANDLES: RefCell<Tables<HandleKey, Arc<PropertyHandle>>> = RefCell::new(HashMap::new());
    static STATS: Cell<ShadowStats> = const { Cell::new(ShadowStats::new()) };
}

/// Per-thread shadow counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ShadowStats {
    /// Names answered from the shadow.
    pub name_hits: u64,
    /// Names fetched from the interner.
    pub name_misses: u64,
    /// Handles answered from the shadow.
    pub handle_hits: u64,
    /// Handles fetched from the shared cache.
    pub handle_misses: u64,
    /// Shadowed handles dropped because they had been invalidated.
    pub stale_drops: u64,
}

impl ShadowStats {
    const fn new() -> Self {
        Self {
            name_hits: 0,
            name_misses: 0,
            handle_hits: 0,
            handle_misses: 0,
            stale_drops: 0,
        }
    }
}

fn count(update: impl FnOnce(&mut ShadowStats)) {
    STATS.with(|cell| {
        let mut stats = cell.get();
        update(&mut stats);
        cell.set(stats);
    });
}

/// Interns `s` through this thread's shadow of `interner`.
pub fn intern(interner: &Interner, s: &str) -> Name {
    let cached = NAMES.with(|names| {
        names
            .borrow()
            .get(&interner.id())
            .and_then(|table| table.entries.get(s).cloned())
    });
    if let Some(name) = cached {
        count(|c| c.name_hits += 1);
        return name;
    }

    count(|c| c.name_misses += 1);
    let name = interner.get_or_create(s);
    NAMES.with(|names| {
        live_table(&mut names.borrow_mut(), interner.id(), &interner.liveness()).insert(s.into(), name.clone());
    });
    name
}

/// Returns the handle for `name` on `entity` through this thread's shadow
/// of `cache`.
pub fn handle(cache: &PropertyHandleCache, entity: EntityId, name: &Name) -> Arc<PropertyHandle> {
    let key = (entity, name.clone());
    let cached = HANDLES.with(|handles| {
        handles
            .borrow()
            .get(&cache.id())
            .and_then(|table| table.entries.get(&key).cloned())
    });

    match cached {
        Some(h) if h.is_valid() => {
            count(|c| c.handle_hits += 1);
            return h;
        }
        Some(_) => count(|c| c.stale_drops += 1),
        None => {}
    }

    count(|c| c.handle_misses += 1);
    let fresh = cache.get_handle(entity, name);
    HANDLES.with(|handles| {
        live_table(&mut handles.borrow_mut(), cache.id(), &cache.liveness()).insert(key, Arc::clone(&fresh));
    });
    fresh
}

/// Drops every shadow entry on the calling thread.
pub fn clear_thread() {
    NAMES.with(|names| names.borrow_mut().clear());
    HANDLES.with(|handles| handles.borrow_mut().clear());
}

/// Returns how many interners and handle caches the calling thread holds
/// shadow tables for.
#[must_use]
pub fn table_count() -> usize {
    NAMES.with(|names| names.borrow().len()) + HANDLES.with(|handles| handles.borrow().len())
}

/// Returns the calling thread's counters.
#[must_use]
pub fn stats() -> ShadowStats {
    STATS.with(Cell::get)
}

/// Resets the calling thread's counters.
pub fn reset_stats() {
    STATS.with(|cell| cell.set(ShadowStats::new()));
}
