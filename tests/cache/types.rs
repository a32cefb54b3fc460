//! Schema type cache tests

use std::sync::Arc;

use quiver_cache::{SchemaTypeCache, Strategy, TypeKind};
use quiver_foundation::Interner;

use crate::enemy_world;

#[test]
fn ancestry_is_built_once_per_type() {
    let (store, _) = enemy_world();
    let names = Arc::new(Interner::new());
    let types = SchemaTypeCache::new(store.clone(), Arc::clone(&names));
    let enemy = names.get_or_create("Enemy");

    let info = types.type_info(&enemy);
    let again = types.type_info(&enemy);
    assert!(Arc::ptr_eq(&info, &again));
    assert_eq!(info.kind, TypeKind::Primary);
    assert!(info.descends_from(&names.get_or_create("Actor")));
    assert_eq!(store.stats().ancestry_queries, 1);
}

#[test]
fn membership_reports_its_strategy() {
    let (store, e) = enemy_world();
    let names = Arc::new(Interner::new());
    let types = SchemaTypeCache::new(store, Arc::clone(&names));

    assert_eq!(
        types.membership(e, &names.get_or_create("Actor")),
        (true, Strategy::Ancestry)
    );
    assert_eq!(
        types.membership(e, &names.get_or_create("HealthComponent")),
        (true, Strategy::CapabilityList)
    );
    assert_eq!(
        types.membership(e, &names.get_or_create("Decoration")),
        (false, Strategy::DeclaredName)
    );
}

#[test]
fn answers_are_the_same_from_either_entry_point() {
    let (store, e) = enemy_world();
    let names = Arc::new(Interner::new());
    let types = SchemaTypeCache::new(store, Arc::clone(&names));

    for n in ["Actor", "Enemy", "HealthComponent", "Player"] {
        let name = names.get_or_create(n);
        assert_eq!(types.is_a(e, &name), types.has_capability(e, &name));
    }
}

#[test]
fn invalidation_after_a_capability_change() {
    let (store, e) = enemy_world();
    let names = Arc::new(Interner::new());
    let types = SchemaTypeCache::new(store.clone(), Arc::clone(&names));
    let health = names.get_or_create("HealthComponent");

    assert!(types.has_capability(e, &health));
    assert!(types.has_capability(e, &health));
    assert_eq!(store.stats().capability_queries, 1);

    store.remove_capability(e, "HealthComponent").unwrap();
    assert!(types.invalidate_entity(e));
    assert!(!types.has_capability(e, &health));
    assert_eq!(store.stats().capability_queries, 2);
}
