//! End-to-end gameplay scenarios

use std::sync::Arc;

use quiver_context::{CacheConfig, CacheContext};
use quiver_foundation::{EntityId, Value};
use quiver_store::MemoryStore;

struct Arena {
    store: Arc<MemoryStore>,
    ctx: CacheContext,
    enemy: EntityId,
    player: EntityId,
}

fn arena(config: CacheConfig) -> Arena {
    let store = Arc::new(MemoryStore::new());
    store.register_type("Actor", None).unwrap();
    store.register_type("Enemy", Some("Actor")).unwrap();
    store.register_type("Player", Some("Actor")).unwrap();

    let enemy = store.spawn(store.root()).unwrap();
    store.set_type(enemy, "Enemy").unwrap();
    store.define_property(enemy, "health", 100_i64).unwrap();
    store.define_property(enemy, "max", 100_i64).unwrap();

    let player = store.spawn(store.root()).unwrap();
    store.set_type(player, "Player").unwrap();
    store.define_property(player, "health", 80_i64).unwrap();
    store.define_property(player, "max", 100_i64).unwrap();

    let ctx = CacheContext::new(store.clone(), config).unwrap();
    ctx.build_index(store.root());
    Arena {
        store,
        ctx,
        enemy,
        player,
    }
}

// =============================================================================
// Scenario A: damage an enemy
// =============================================================================

#[test]
fn enemy_damage_is_cached_then_synced() {
    let a = arena(CacheConfig::default());

    let enemies = a.ctx.find_entities_by_type("Enemy");
    assert_eq!(enemies.len(), 1);
    assert!(enemies.contains(&a.enemy));

    assert!(a.ctx.set_property(a.enemy, "health", 60_i64));
    assert_eq!(a.ctx.get_property::<i64>(a.enemy, "health"), Some(60));
    assert_eq!(a.store.property(a.enemy, "health"), Some(Value::Int(100)));

    assert!(a.ctx.sync_dirty_to_store().is_clean());
    assert_eq!(a.store.property(a.enemy, "health"), Some(Value::Int(60)));
    assert_eq!(a.ctx.stats().dirty, 0);
}

// =============================================================================
// Scenario B: the player is untouched
// =============================================================================

#[test]
fn player_reads_come_from_the_store_once() {
    let a = arena(CacheConfig::realtime());

    assert!(a.ctx.is_type(a.player, "Actor"));
    assert!(!a.ctx.is_type(a.player, "Enemy"));
    assert!(a.ctx.find_entities_by_type("Player").contains(&a.player));

    a.store.reset_stats();
    for _ in 0..10 {
        assert_eq!(a.ctx.get_property::<i64>(a.player, "health"), Some(80));
        assert_eq!(a.ctx.get_property::<i64>(a.player, "max"), Some(100));
    }
    assert_eq!(a.store.stats().value_reads, 2);

    a.ctx.set_property(a.enemy, "health", 60_i64);
    a.ctx.sync_dirty_to_store();
    assert_eq!(a.store.property(a.player, "health"), Some(Value::Int(80)));
}

#[test]
fn both_actors_share_the_ancestor_index() {
    let a = arena(CacheConfig::single_threaded());
    let actors = a.ctx.find_entities_by_type("Actor");
    assert_eq!(actors.len(), 2);
    assert_eq!(a.ctx.find_entities_by_property("max").len(), 2);
}

// =============================================================================
// Independent contexts
// =============================================================================

#[test]
fn contexts_over_one_store_do_not_share_state() {
    let a = arena(CacheConfig::default());
    let other = CacheContext::new(a.store.clone(), CacheConfig::default()).unwrap();

    a.ctx.set_property(a.enemy, "health", 1_i64);
    assert_eq!(other.get_property::<i64>(a.enemy, "health"), Some(100));
    assert!(other.find_entities_by_type("Enemy").is_empty());
    assert_ne!(a.ctx.intern("health"), other.intern("health"));
}
