//! Concurrency tests
//!
//! Tests for many threads sharing one context: disjoint-entity writes,
//! worker pool fan-out, pipelines, shared read paths, and invalidation
//! racing in-flight reads.

mod invalidation;
mod pipelines;
mod threads;

use std::sync::Arc;

use quiver_context::{CacheConfig, CacheContext};
use quiver_foundation::EntityId;
use quiver_store::MemoryStore;

/// A context over `count` entities, each with a `counter` and a `score`.
pub fn counters(count: usize, config: CacheConfig) -> (Arc<MemoryStore>, Arc<CacheContext>, Vec<EntityId>) {
    let store = Arc::new(MemoryStore::new());
    store.register_type("Counter", None).unwrap();
    let entities: Vec<EntityId> = (0..count)
        .map(|_| {
            let e = store.spawn(store.root()).unwrap();
            store.set_type(e, "Counter").unwrap();
            store.define_property(e, "counter", 0_i64).unwrap();
            store.define_property(e, "score", 0.0).unwrap();
            e
        })
        .collect();

    let ctx = CacheContext::new(store.clone(), config).unwrap();
    ctx.build_index(store.root());
    (store, Arc::new(ctx), entities)
}
