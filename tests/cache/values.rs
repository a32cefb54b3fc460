//! Result value cache tests

use std::sync::Arc;

use quiver_cache::{PropertyHandleCache, ResultValueCache};
use quiver_foundation::{ErrorKind, Interner, Value};

use crate::enemy_world;

fn value_cache(store: &Arc<quiver_store::MemoryStore>, capacity: usize) -> ResultValueCache {
    let handles = Arc::new(PropertyHandleCache::new(store.clone()));
    ResultValueCache::with_capacity(handles, capacity)
}

#[test]
fn read_your_writes_before_sync() {
    let (store, e) = enemy_world();
    let values = value_cache(&store, usize::MAX);
    let health = Interner::new().get_or_create("health:current");

    assert!(values.set(e, &health, 60.0));
    assert_eq!(values.get::<f64>(e, &health), Some(60.0));
    assert!(values.is_dirty(e, &health));
    assert_eq!(store.property(e, "health:current"), Some(Value::Float(100.0)));

    let report = values.sync_all();
    assert_eq!(report.written, 1);
    assert!(!values.is_dirty(e, &health));
    assert_eq!(store.property(e, "health:current"), Some(Value::Float(60.0)));
}

#[test]
fn cached_reads_skip_the_store() {
    let (store, e) = enemy_world();
    let values = value_cache(&store, usize::MAX);
    let health = Interner::new().get_or_create("health:current");

    for _ in 0..5 {
        assert_eq!(values.get::<f64>(e, &health), Some(100.0));
    }
    assert_eq!(store.stats().value_reads, 1);
    assert_eq!(values.stats().hits, 4);
}

#[test]
fn failed_writes_stay_dirty_for_retry() {
    let (store, e) = enemy_world();
    let values = value_cache(&store, usize::MAX);
    let health = Interner::new().get_or_create("health:current");

    store.fail_writes(e, "health:current");
    values.set(e, &health, 10.0);
    let report = values.sync_all();
    assert_eq!(report.failures.len(), 1);
    assert!(values.is_dirty(e, &health));

    let err = report.into_result().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::SyncFailure { .. }));

    store.clear_failures();
    assert!(values.sync_all().is_clean());
    assert_eq!(store.property(e, "health:current"), Some(Value::Float(10.0)));
}

#[test]
fn eviction_never_drops_dirty_entries() {
    let (store, e) = enemy_world();
    let values = value_cache(&store, 1);
    let names = Interner::new();
    let current = names.get_or_create("health:current");
    let maximum = names.get_or_create("health:maximum");

    values.set(e, &current, 5.0);
    assert_eq!(values.get::<f64>(e, &maximum), Some(100.0));
    assert!(values.is_dirty(e, &current));
    assert_eq!(values.get::<f64>(e, &current), Some(5.0));
}

#[test]
fn structural_change_is_survived_by_re_resolution() {
    let (store, e) = enemy_world();
    let values = value_cache(&store, usize::MAX);
    let health = Interner::new().get_or_create("health:current");

    values.set(e, &health, 42.0);
    // Adding a property makes every earlier store handle for the entity stale.
    store.define_property(e, "armor", 1.0).unwrap();

    assert!(values.sync_entity(e).is_clean());
    assert_eq!(store.property(e, "health:current"), Some(Value::Float(42.0)));
    assert!(values.stats().re_resolutions >= 1);
}

#[test]
fn kind_mismatch_is_reported_by_try_get() {
    let (store, e) = enemy_world();
    let values = value_cache(&store, usize::MAX);
    let health = Interner::new().get_or_create("health:current");

    assert_eq!(values.get::<bool>(e, &health), None);
    let err = values.try_get::<bool>(e, &health).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
}
