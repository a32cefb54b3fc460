//! Property handle cache tests

use std::sync::Arc;

use quiver_cache::PropertyHandleCache;
use quiver_foundation::Interner;

use crate::enemy_world;

#[test]
fn resolves_once_per_pair() {
    let (store, enemy) = enemy_world();
    let handles = PropertyHandleCache::new(store.clone());
    let health = Interner::new().get_or_create("health:current");

    for _ in 0..10 {
        assert!(handles.get_handle(enemy, &health).exists());
    }
    assert_eq!(store.stats().resolutions, 1);
    assert_eq!(handles.stats().hits, 9);
}

#[test]
fn negative_results_are_cached() {
    let (store, enemy) = enemy_world();
    let handles = PropertyHandleCache::new(store.clone());
    let armor = Interner::new().get_or_create("armor");

    assert!(!handles.get_handle(enemy, &armor).exists());
    assert!(!handles.get_handle(enemy, &armor).exists());
    assert_eq!(store.stats().resolutions, 1);
}

#[test]
fn invalidation_forces_a_fresh_resolution() {
    let (store, enemy) = enemy_world();
    let handles = PropertyHandleCache::new(store.clone());
    let names = Interner::new();
    let armor = names.get_or_create("armor");

    let before = handles.get_handle(enemy, &armor);
    assert!(!before.exists());

    store.define_property(enemy, "armor", 3.0).unwrap();
    handles.invalidate_entity(enemy);
    assert!(!before.is_valid());

    let after = handles.get_handle(enemy, &armor);
    assert!(after.exists());
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(store.stats().resolutions, 2);
}

#[test]
fn precache_counts_existing_properties() {
    let (store, enemy) = enemy_world();
    let handles = PropertyHandleCache::new(store.clone());
    let names = Interner::new();
    let wanted = [
        names.get_or_create("health:current"),
        names.get_or_create("health:maximum"),
        names.get_or_create("mana"),
    ];

    assert_eq!(handles.precache(enemy, &wanted), 2);
    assert_eq!(handles.len(), 3);
    assert_eq!(handles.entity_count(), 1);
}
