//! Integration tests for batch layouts
//!
//! Tests that batched updates match the per-entity API and only reach the
//! store through the value cache.

use std::sync::Arc;

use quiver_batch::{Batch, Kernel, Operand, integrate_step};
use quiver_context::{CacheConfig, CacheContext};
use quiver_foundation::{EntityId, Value};
use quiver_store::{MemoryStore, TypeSchema};

const HEALTH: &str = "health:current";
const MAX: &str = "health:maximum";
const REGEN: &str = "health:regenerationRate";

fn world(count: usize) -> (Arc<MemoryStore>, Vec<EntityId>) {
    let store = Arc::new(MemoryStore::new());
    store.register_type("Enemy", None).unwrap();
    store
        .register_schema(
            TypeSchema::capability("HealthComponent", false)
                .with_property(HEALTH, 100.0)
                .with_property(MAX, 100.0)
                .with_property(REGEN, 0.0),
        )
        .unwrap();

    let entities = (0..count)
        .map(|i| {
            let e = store.spawn(store.root()).unwrap();
            store.set_type(e, "Enemy").unwrap();
            store.apply_capability(e, "HealthComponent").unwrap();
            store.define_property(e, HEALTH, (i * 7 % 100) as f64).unwrap();
            store.define_property(e, REGEN, (i % 5) as f64 - 1.0).unwrap();
            e
        })
        .collect();
    (store, entities)
}

fn context(store: &Arc<MemoryStore>) -> CacheContext {
    let ctx = CacheContext::new(store.clone(), CacheConfig::single_threaded()).unwrap();
    ctx.build_index(store.root());
    ctx
}

fn regen(ctx: &CacheContext) -> Kernel {
    Kernel::Integrate {
        target: ctx.intern(HEALTH),
        rate: Operand::from(ctx.intern(REGEN)),
        min: Operand::Const(0.0),
        max: Operand::from(ctx.intern(MAX)),
    }
}

#[test]
fn batched_updates_match_per_entity_updates() {
    const STEPS: usize = 12;
    const DT: f64 = 0.75;

    let (batched_store, entities) = world(40);
    let batched = context(&batched_store);
    let mut batch = batched
        .create_batch("HealthComponent", &[HEALTH, MAX, REGEN])
        .unwrap()
        .with_kernel(regen(&batched))
        .unwrap();
    assert_eq!(batch.len(), 40);
    for _ in 0..STEPS {
        batch.update(DT);
    }
    batch.sync_back();
    assert!(batched.sync_dirty_to_store().is_clean());

    let (plain_store, _) = world(40);
    let plain = context(&plain_store);
    for _ in 0..STEPS {
        for &e in &entities {
            let v: f64 = plain.get_property(e, HEALTH).unwrap();
            let max: f64 = plain.get_property(e, MAX).unwrap();
            let rate: f64 = plain.get_property(e, REGEN).unwrap();
            plain.set_property(e, HEALTH, integrate_step(v, rate, 0.0, max, DT));
        }
    }
    assert!(plain.sync_dirty_to_store().is_clean());

    for &e in &entities {
        assert_eq!(batched_store.property(e, HEALTH), plain_store.property(e, HEALTH));
    }
}

#[test]
fn sync_back_stops_at_the_value_cache() {
    let (store, entities) = world(3);
    let ctx = context(&store);
    let mut batch = ctx.create_batch("HealthComponent", &[HEALTH]).unwrap();

    let health = ctx.intern(HEALTH);
    for v in batch.column_mut(&health).unwrap() {
        *v = 1.0;
    }
    assert_eq!(batch.sync_back(), 3);
    assert_eq!(ctx.stats().dirty, 3);
    assert_eq!(store.property(entities[0], HEALTH), Some(Value::Float(0.0)));

    ctx.sync_dirty_to_store();
    assert!(entities.iter().all(|&e| store.property(e, HEALTH) == Some(Value::Float(1.0))));
}

#[test]
fn entities_without_the_fields_are_reported() {
    let (store, entities) = world(2);
    store.remove_property(entities[1], REGEN).unwrap();
    let ctx = context(&store);

    let batch = Batch::build(Arc::clone(ctx.values()), entities.clone(), &[ctx.intern(HEALTH), ctx.intern(REGEN)]).unwrap();
    assert_eq!(batch.entities(), &entities[..1]);
    assert_eq!(batch.excluded()[0].entity, entities[1]);
    assert_eq!(batch.excluded()[0].field, ctx.intern(REGEN));
}

#[test]
fn columns_are_cache_line_aligned() {
    let (store, _) = world(20);
    let ctx = context(&store);
    let batch = ctx.create_batch("HealthComponent", &[HEALTH, MAX]).unwrap();
    for column in batch.columns() {
        assert_eq!(column.base_address() % 64, 0);
        assert_eq!(column.len(), 20);
    }
}
