//! Thread-safe string interning for property, type, and capability names.
//!
//! Every string-keyed lookup in the cache layers goes through a [`Name`].
//! Equal strings interned by the same [`Interner`] share one allocation, so
//! comparing and hashing names never touches the string bytes.
//!
//! The table is append-only. There is no removal API: a removed name could
//! still be held by a cached handle, and the vocabulary is bounded by the
//! schema anyway.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

/// Source of unique interner ids (0 is never handed out).
static NEXT_INTERNER_ID: AtomicU64 = AtomicU64::new(1);

/// Interned name.
///
/// Equality and hashing are by identity of the shared allocation, which is
/// exactly string equality for names produced by the same interner. Names
/// from different interners never compare equal.
#[derive(Clone)]
pub struct Name(Arc<str>);

impl Name {
    /// Returns the interned text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if both names share the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Returns true if the text starts with `prefix`.
    #[must_use]
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    /// Returns the shared text.
    #[must_use]
    pub fn text(&self) -> &Arc<str> {
        &self.0
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<u8>() as usize
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.addr());
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    /// Orders by text; ties (same text, different interner) break on address
    /// so the ordering stays consistent with equality.
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str()
            .cmp(other.as_str())
            .then_with(|| self.addr().cmp(&other.addr()))
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({:?})", &*self.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key wrapper so the table can be queried with a plain `&str`.
#[derive(Clone, PartialEq, Eq, Hash)]
struct Key(Arc<str>);

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Thread-safe, append-only string interner.
///
/// Lookups take a shared read lock; only the first sighting of a string
/// takes the write lock, and it re-checks after acquiring it so two racing
/// threads can never insert the same string twice.
pub struct Interner {
    id: u64,
    alive: Arc<()>,
    names: RwLock<HashMap<Key, Name>>,
}

impl Interner {
    /// Creates an empty interner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_INTERNER_ID.fetch_add(1, AtomicOrdering::Relaxed),
            alive: Arc::new(()),
            names: RwLock::new(HashMap::new()),
        }
    }

    /// Creates an interner pre-populated with `names`.
    #[must_use]
    pub fn with_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let interner = Self::new();
        interner.pre_intern(names);
        interner
    }

    /// Returns this interner's process-unique id.
    ///
    /// Thread-local shadow caches key their tables by this id so that two
    /// interners never share shadow entries.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns a token that expires when this interner is dropped, so
    /// shadow tables keyed by [`id`](Self::id) can tell when to let go.
    #[must_use]
    pub fn liveness(&self) -> Weak<()> {
        Arc::downgrade(&self.alive)
    }

    /// Returns the canonical name for `s`, interning it on first sight.
    pub fn get_or_create(&self, s: &str) -> Name {
        {
            let names = self.names.read();
            if let Some(name) = names.get(s) {
                return name.clone();
            }
        }

        let mut names = self.names.write();
        // Another thread may have inserted it between the two locks.
        if let Some(name) = names.get(s) {
            return name.clone();
        }
        let text: Arc<str> = Arc::from(s);
        let name = Name(Arc::clone(&text));
        names.insert(Key(text), name.clone());
        name
    }

    /// Returns the canonical name for `s` if it has been interned.
    #[must_use]
    pub fn get(&self, s: &str) -> Option<Name> {
        self.names.read().get(s).cloned()
    }

    /// Returns true if `s` has been interned.
    #[must_use]
    pub fn contains(&self, s: &str) -> bool {
        self.names.read().contains_key(s)
    }

    /// Interns many strings under a single write lock.
    pub fn pre_intern<'a>(&self, strings: impl IntoIterator<Item = &'a str>) {
        let mut names = self.names.write();
        for s in strings {
            if !names.contains_key(s) {
                let text: Arc<str> = Arc::from(s);
                names.insert(Key(Arc::clone(&text)), Name(text));
            }
        }
    }

    /// Returns the number of interned names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    /// Returns true if nothing has been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }

    /// Returns every interned name, sorted by text.
    #[must_use]
    pub fn names(&self) -> Vec<Name> {
        let mut all: Vec<Name> = self.names.read().values().cloned().collect();
        all.sort();
        all
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Interner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interner")
            .field("id", &self.id)
            .field("len", &self.len())
            .finish()
    }
}

/// A labelled group of related, pre-interned property names.
///
/// Groups give gameplay code short keys (`"current"`) for full property
/// paths (`"health:current"`) without a lookup at the call site.
#[derive(Clone, Debug)]
pub struct NameGroup {
    label: String,
    members: BTreeMap<String, Name>,
}

impl NameGroup {
    /// Interns every `(key, path)` pair and builds the group.
    #[must_use]
    pub fn new(interner: &Interner, label: impl Into<String>, entries: &[(&str, &str)]) -> Self {
        interner.pre_intern(entries.iter().map(|(_, path)| *path));
        let members = entries
            .iter()
            .map(|(key, path)| ((*key).to_string(), interner.get_or_create(path)))
            .collect();
        Self {
            label: label.into(),
            members,
        }
    }

    /// Builds a group whose paths are `namespace:key` for each key.
    #[must_use]
    pub fn namespaced(interner: &Interner, namespace: &str, keys: &[&str]) -> Self {
        let paths: Vec<(String, String)> = keys
            .iter()
            .map(|key| ((*key).to_string(), format!("{namespace}:{key}")))
            .collect();
        let entries: Vec<(&str, &str)> = paths
            .iter()
            .map(|(key, path)| (key.as_str(), path.as_str()))
            .collect();
        Self::new(interner, namespace, &entries)
    }

    /// Returns the group label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the name stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Name> {
        self.members.get(key)
    }

    /// Returns the keys of this group in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// Returns the names of this group in key order.
    pub fn names(&self) -> impl Iterator<Item = &Name> {
        self.members.values()
    }

    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
