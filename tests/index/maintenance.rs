//! Registry index maintenance tests

use crate::Level;

#[test]
fn bulk_build_covers_the_tree() {
    let level = Level::new();
    // Four spawned entities plus the store root.
    assert_eq!(level.index.entity_count(), 5);
    assert!(level.index.verify_symmetry().is_ok());
}

#[test]
fn removal_prunes_entries_and_inbound_edges() {
    let level = Level::new();
    level.store.destroy(level.chest).unwrap();
    assert!(level.index.remove_entity(level.chest));

    assert!(level.index.find_by_type("Prop").is_empty());
    assert!(!level.index.all_types().contains(&"Prop".to_string()));
    assert!(level.index.find_relationship_targets(level.player, Some("inventory")).is_empty());
    assert!(level.index.verify_symmetry().is_ok());
    assert!(!level.index.remove_entity(level.chest));
}

#[test]
fn update_reflects_a_type_change() {
    let level = Level::new();
    level.store.set_type(level.goblin, "Player").unwrap();
    assert!(level.index.update_entity(level.goblin));

    assert_eq!(level.index.find_by_type("Enemy").len(), 1);
    assert!(level.index.has_type(level.goblin, "Player"));
    // Its outgoing edge is still indexed.
    assert!(level.index.has_relationship(level.goblin, Some("target")));
}

#[test]
fn update_keeps_inbound_edges() {
    let level = Level::new();
    level.store.define_property(level.player, "combat:block", 2.0).unwrap();
    level.index.update_entity(level.player);
    assert_eq!(level.index.find_relationship_sources(level.player, None).len(), 2);
}

#[test]
fn missed_hooks_are_repaired_by_revalidation() {
    let level = Level::new();
    level.store.remove_property(level.orc, "combat:rage").unwrap();
    let newcomer = level.store.spawn(level.store.root()).unwrap();
    level.store.set_type(newcomer, "Enemy").unwrap();

    assert_eq!(level.index.find_by_property("combat:rage").len(), 1);
    assert_eq!(level.index.revalidate_all(), 2);
    assert!(level.index.find_by_property("combat:rage").is_empty());
    assert!(level.index.find_by_type("Enemy").contains(&newcomer));
    assert_eq!(level.index.stats().repairs, 2);
    assert_eq!(level.index.revalidate_all(), 0);
}

#[test]
fn interleaved_adds_and_removes_stay_symmetric() {
    let level = Level::new();
    for round in 0..20 {
        let e = level.store.spawn(level.store.root()).unwrap();
        level.store.set_type(e, if round % 2 == 0 { "Enemy" } else { "Prop" }).unwrap();
        level.store.define_property(e, &format!("combat:m{round}"), 1.0).unwrap();
        level.store.add_relationship_target(e, "target", level.player).unwrap();
        level.index.add_entity(e);
        if round % 3 == 0 {
            level.store.destroy(e).unwrap();
            level.index.remove_entity(e);
        }
    }
    assert!(level.index.verify_symmetry().is_ok());
    assert_eq!(level.index.find_by_property_prefix("combat:m").len(), 13);
}
