//! Integration tests for the cache layer
//!
//! Tests for property handles, schema types, and result values against a
//! resolution-counting store.

mod handles;
mod types;
mod values;

use std::sync::Arc;

use quiver_foundation::EntityId;
use quiver_store::{MemoryStore, TypeSchema};

/// A store with an `Actor > Enemy` hierarchy, a health capability, and one
/// enemy carrying it.
pub fn enemy_world() -> (Arc<MemoryStore>, EntityId) {
    let store = Arc::new(MemoryStore::new());
    store.register_type("Actor", None).unwrap();
    store.register_type("Enemy", Some("Actor")).unwrap();
    store
        .register_schema(
            TypeSchema::capability("HealthComponent", false)
                .with_property("health:current", 100.0)
                .with_property("health:maximum", 100.0),
        )
        .unwrap();

    let enemy = store.spawn(store.root()).unwrap();
    store.set_type(enemy, "Enemy").unwrap();
    store.apply_capability(enemy, "HealthComponent").unwrap();
    store.reset_stats();
    (store, enemy)
}
