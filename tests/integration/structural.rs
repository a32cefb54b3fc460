//! Structural mutation tests: hooks, invalidation, and re-resolution

use std::sync::Arc;

use quiver_context::{CacheConfig, CacheContext};
use quiver_foundation::Value;
use quiver_index::Criteria;
use quiver_store::MemoryStore;

fn setup() -> (Arc<MemoryStore>, CacheContext) {
    let store = Arc::new(MemoryStore::new());
    store.register_type("Creature", None).unwrap();
    store.register_type("Wolf", Some("Creature")).unwrap();
    store.register_capability("Burning", false).unwrap();
    store.register_capability("Buff", true).unwrap();
    let ctx = CacheContext::new(store.clone(), CacheConfig::default()).unwrap();
    ctx.build_index(store.root());
    (store, ctx)
}

#[test]
fn invalidation_forces_fresh_resolution() {
    let (store, ctx) = setup();
    let wolf = store.spawn(store.root()).unwrap();
    store.set_type(wolf, "Wolf").unwrap();
    store.define_property(wolf, "speed", 4.0).unwrap();
    ctx.on_entity_added(wolf);

    assert!(ctx.is_type(wolf, "Creature"));
    assert_eq!(ctx.get_property::<f64>(wolf, "speed"), Some(4.0));
    store.reset_stats();

    ctx.is_type(wolf, "Creature");
    ctx.get_property::<f64>(wolf, "speed");
    assert_eq!(store.stats().resolutions, 0);
    assert_eq!(store.stats().type_queries, 0);

    ctx.invalidate_entity(wolf);
    ctx.is_type(wolf, "Creature");
    ctx.get_property::<f64>(wolf, "speed");
    assert_eq!(store.stats().resolutions, 1);
    assert_eq!(store.stats().type_queries, 1);
}

#[test]
fn capability_changes_flow_through_the_changed_hook() {
    let (store, ctx) = setup();
    let wolf = store.spawn(store.root()).unwrap();
    store.set_type(wolf, "Wolf").unwrap();
    ctx.on_entity_added(wolf);
    assert!(!ctx.has_capability(wolf, "Burning"));

    store.apply_capability(wolf, "Burning").unwrap();
    store.apply_capability(wolf, "Buff:haste").unwrap();
    ctx.on_entity_changed(wolf);

    assert!(ctx.has_capability(wolf, "Burning"));
    assert!(ctx.has_capability(wolf, "Buff"));
    assert!(ctx.find_entities_by_capability("Buff:haste").contains(&wolf));
    assert!(
        ctx.find_with_criteria(&Criteria::new().with_type("Creature").with_type("Burning"))
            .contains(&wolf)
    );
}

#[test]
fn pending_writes_survive_structural_changes() {
    let (store, ctx) = setup();
    let wolf = store.spawn(store.root()).unwrap();
    store.define_property(wolf, "speed", 4.0).unwrap();
    ctx.on_entity_added(wolf);

    ctx.set_property(wolf, "speed", 9.0);
    store.define_property(wolf, "howl", true).unwrap();
    ctx.on_entity_changed(wolf);

    assert_eq!(ctx.get_property::<f64>(wolf, "speed"), Some(9.0));
    assert!(ctx.sync_dirty_to_store().is_clean());
    assert_eq!(store.property(wolf, "speed"), Some(Value::Float(9.0)));
    assert!(ctx.find_entities_by_property("howl").contains(&wolf));
}

#[test]
fn removal_discards_everything_for_the_entity() {
    let (store, ctx) = setup();
    let wolf = store.spawn(store.root()).unwrap();
    let pup = store.spawn(wolf).unwrap();
    store.set_type(pup, "Wolf").unwrap();
    store.define_property(pup, "speed", 2.0).unwrap();
    ctx.on_entity_added(wolf);
    ctx.on_entity_added(pup);
    ctx.set_property(pup, "speed", 3.0);

    for gone in store.destroy(wolf).unwrap() {
        ctx.on_entity_removed(gone);
    }

    assert!(ctx.find_entities_by_type("Wolf").is_empty());
    assert_eq!(ctx.stats().dirty, 0);
    assert!(ctx.sync_dirty_to_store().is_clean());
    assert!(ctx.index().verify_symmetry().is_ok());
}

#[test]
fn failed_sync_is_reported_and_retried() {
    let (store, ctx) = setup();
    let wolf = store.spawn(store.root()).unwrap();
    store.define_property(wolf, "speed", 4.0).unwrap();
    ctx.on_entity_added(wolf);

    ctx.set_property(wolf, "speed", 5.0);
    store.fail_writes(wolf, "speed");
    let report = ctx.sync_dirty_to_store();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].property, ctx.intern("speed"));
    assert!(report.into_result().is_err());

    store.clear_failures();
    assert_eq!(ctx.sync_dirty_to_store().written, 1);
    assert_eq!(store.property(wolf, "speed"), Some(Value::Float(5.0)));
}
