//! Registry index query tests

use quiver_index::Criteria;

use crate::Level;

#[test]
fn types_include_ancestors() {
    let level = Level::new();
    let enemies = level.index.find_by_type("Enemy");
    assert_eq!(enemies.len(), 2);
    assert!(enemies.contains(&level.goblin) && enemies.contains(&level.orc));

    let actors = level.index.find_by_type("Actor");
    assert_eq!(actors.len(), 3);
    assert!(!actors.contains(&level.chest));
}

#[test]
fn multi_apply_capabilities_match_by_base_and_instance() {
    let level = Level::new();
    assert!(level.index.find_by_capability("Loot").contains(&level.chest));
    assert!(level.index.find_by_capability("Loot:gold").contains(&level.chest));
    assert!(level.index.find_by_capability("Loot:silver").is_empty());
}

#[test]
fn property_prefix_groups_a_namespace() {
    let level = Level::new();
    let combat = level.index.find_by_property_prefix("combat:");
    assert_eq!(combat.len(), 3);
    assert!(!combat.contains(&level.chest));

    assert_eq!(level.index.find_by_property("combat:rage").len(), 1);
    assert!(level.index.find_by_property_prefix("magic:").is_empty());
}

#[test]
fn relationships_are_indexed_both_ways() {
    let level = Level::new();
    let attackers = level.index.find_relationship_sources(level.player, Some("target"));
    assert_eq!(attackers.len(), 2);

    let owned = level.index.find_relationship_targets(level.player, None);
    assert!(owned.contains(&level.chest));
    assert!(level.index.is_targeted(level.chest, Some("inventory")));
    assert!(level.index.has_relationship(level.goblin, Some("target")));
}

#[test]
fn criteria_intersect_every_condition() {
    let level = Level::new();
    let raging_enemies = level.index.find_with_criteria(
        &Criteria::new()
            .with_type("Enemy")
            .with_property_prefix("combat:")
            .with_property("combat:rage"),
    );
    assert_eq!(raging_enemies.len(), 1);
    assert!(raging_enemies.contains(&level.orc));

    let hunting_player = level
        .index
        .find_with_criteria(&Criteria::new().with_type("Enemy").targeting("target", level.player));
    assert_eq!(hunting_player.len(), 2);
}

#[test]
fn empty_criteria_match_nothing() {
    let level = Level::new();
    assert!(level.index.find_with_criteria(&Criteria::new()).is_empty());
}

#[test]
fn unknown_names_match_nothing() {
    let level = Level::new();
    assert!(
        level
            .index
            .find_with_criteria(&Criteria::new().with_type("Dragon").with_type("Actor"))
            .is_empty()
    );
}
