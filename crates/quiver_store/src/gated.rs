//! A store decorator that can hold one read in flight.
//!
//! [`GatedStore`] forwards every call to an inner store. Once armed, the next
//! matching read performs its lookup, then blocks until released. This gives
//! a deterministic way to let a writer run between a cache's store read and
//! the moment the cache records the result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use quiver_foundation::{EntityId, Result, Value};

use crate::schema::SchemaKind;
use crate::store::{SchemaStore, StoreHandle};

/// Reads a [`GatedStore`] can hold.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GatedRead {
    /// [`SchemaStore::resolve_property`].
    ResolveProperty,
    /// [`SchemaStore::declared_type`].
    DeclaredType,
    /// [`SchemaStore::applied_capabilities`].
    AppliedCapabilities,
}

#[derive(Debug, Default)]
struct GateState {
    armed: Option<GatedRead>,
    held: bool,
    released: bool,
}

/// Forwards to an inner store and can hold one armed read.
#[derive(Debug)]
pub struct GatedStore<S> {
    inner: Arc<S>,
    state: Mutex<GateState>,
    changed: Condvar,
}

impl<S: SchemaStore> GatedStore<S> {
    /// Wraps `inner` with a disarmed gate.
    #[must_use]
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            state: Mutex::new(GateState::default()),
            changed: Condvar::new(),
        }
    }

    /// Returns the wrapped store.
    #[must_use]
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    /// Arms the gate for the next call of `read`.
    pub fn arm(&self, read: GatedRead) {
        *self.state.lock() = GateState {
            armed: Some(read),
            ..GateState::default()
        };
    }

    /// Blocks until a reader is held at the gate, or `timeout` passes.
    ///
    /// Returns true if a reader is held.
    pub fn wait_held(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.held {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.held;
            }
        }
        true
    }

    /// Lets the held reader return.
    pub fn release(&self) {
        self.state.lock().released = true;
        self.changed.notify_all();
    }

    fn pass(&self, read: GatedRead) {
        let mut state = self.state.lock();
        if state.armed != Some(read) {
            return;
        }
        state.armed = None;
        state.held = true;
        self.changed.notify_all();
        while !state.released {
            self.changed.wait(&mut state);
        }
    }
}

impl<S: SchemaStore> SchemaStore for GatedStore<S> {
    fn resolve_property(&self, entity: EntityId, name: &str) -> Option<StoreHandle> {
        let handle = self.inner.resolve_property(entity, name);
        self.pass(GatedRead::ResolveProperty);
        handle
    }

    fn get_value(&self, handle: &StoreHandle) -> Result<Value> {
        self.inner.get_value(handle)
    }

    fn set_value(&self, handle: &StoreHandle, value: Value) -> Result<()> {
        self.inner.set_value(handle, value)
    }

    fn declared_type(&self, entity: EntityId) -> Option<String> {
        let declared = self.inner.declared_type(entity);
        self.pass(GatedRead::DeclaredType);
        declared
    }

    fn applied_capabilities(&self, entity: EntityId) -> Vec<String> {
        let caps = self.inner.applied_capabilities(entity);
        self.pass(GatedRead::AppliedCapabilities);
        caps
    }

    fn ancestry_chain(&self, type_name: &str) -> Vec<String> {
        self.inner.ancestry_chain(type_name)
    }

    fn schema_kind(&self, name: &str) -> Option<SchemaKind> {
        self.inner.schema_kind(name)
    }

    fn traverse_all(&self, root: EntityId) -> Vec<EntityId> {
        self.inner.traverse_all(root)
    }

    fn property_names(&self, entity: EntityId) -> Vec<String> {
        self.inner.property_names(entity)
    }

    fn relationship_names(&self, entity: EntityId) -> Vec<String> {
        self.inner.relationship_names(entity)
    }

    fn relationship_targets(&self, entity: EntityId, relationship: &str) -> Vec<EntityId> {
        self.inner.relationship_targets(entity, relationship)
    }

    fn contains(&self, entity: EntityId) -> bool {
        self.inner.contains(entity)
    }
}
