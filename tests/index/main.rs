//! Integration tests for the registry index
//!
//! Tests for bulk builds, incremental maintenance, and composite queries.

mod maintenance;
mod queries;

use std::sync::Arc;

use quiver_foundation::EntityId;
use quiver_index::RegistryIndex;
use quiver_store::MemoryStore;

/// A small level: two enemies, a player, and a chest, with combat
/// properties on the fighters and an inventory relationship.
pub struct Level {
    pub store: Arc<MemoryStore>,
    pub index: RegistryIndex,
    pub goblin: EntityId,
    pub orc: EntityId,
    pub player: EntityId,
    pub chest: EntityId,
}

impl Level {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        store.register_type("Actor", None).unwrap();
        store.register_type("Enemy", Some("Actor")).unwrap();
        store.register_type("Player", Some("Actor")).unwrap();
        store.register_type("Prop", None).unwrap();
        store.register_capability("HealthComponent", false).unwrap();
        store.register_capability("Loot", true).unwrap();

        let spawn = |type_name: &str| {
            let e = store.spawn(store.root()).unwrap();
            store.set_type(e, type_name).unwrap();
            e
        };
        let goblin = spawn("Enemy");
        let orc = spawn("Enemy");
        let player = spawn("Player");
        let chest = spawn("Prop");

        for e in [goblin, orc, player] {
            store.apply_capability(e, "HealthComponent").unwrap();
            store.define_property(e, "combat:attack", 5.0).unwrap();
        }
        store.define_property(orc, "combat:rage", 1.0).unwrap();
        store.define_property(chest, "contents:gold", 30_i64).unwrap();
        store.apply_capability(chest, "Loot:gold").unwrap();
        store.add_relationship_target(player, "inventory", chest).unwrap();
        store.add_relationship_target(goblin, "target", player).unwrap();
        store.add_relationship_target(orc, "target", player).unwrap();

        let index = RegistryIndex::new(store.clone());
        index.build_from_store(store.root());
        Self {
            store,
            index,
            goblin,
            orc,
            player,
            chest,
        }
    }
}
