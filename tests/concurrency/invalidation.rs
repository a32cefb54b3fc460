//! Invalidation racing in-flight reads
//!
//! A gated store holds a reader between its store lookup and the moment the
//! cache records the answer, while the test changes the entity and fires the
//! change hook. The racing reader may see the old answer; every read after
//! the hook must see the new one.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use quiver_context::{CacheConfig, CacheContext};
use quiver_foundation::EntityId;
use quiver_store::{GatedRead, GatedStore, MemoryStore};

const HOLD: Duration = Duration::from_secs(5);

fn gated_context(config: CacheConfig) -> (Arc<GatedStore<MemoryStore>>, Arc<CacheContext>, EntityId) {
    let store = Arc::new(MemoryStore::new());
    store.register_type("Enemy", None).unwrap();
    store.register_type("Prop", None).unwrap();
    store.register_capability("Shielded", false).unwrap();
    let e = store.spawn(store.root()).unwrap();
    store.set_type(e, "Enemy").unwrap();

    let gated = Arc::new(GatedStore::new(Arc::clone(&store)));
    let ctx = CacheContext::new(gated.clone(), config).unwrap();
    ctx.build_index(store.root());
    (gated, Arc::new(ctx), e)
}

#[test]
fn handle_missed_before_a_define_is_not_kept() {
    let (gated, ctx, e) = gated_context(CacheConfig::single_threaded());
    gated.arm(GatedRead::ResolveProperty);

    let reader = {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || ctx.property_handle(e, "armor"))
    };
    assert!(gated.wait_held(HOLD));
    gated.inner().define_property(e, "armor", 5.0).unwrap();
    ctx.on_entity_changed(e);
    gated.release();

    let raced = reader.join().unwrap();
    assert!(!raced.exists());
    assert!(!raced.is_valid());

    assert!(ctx.property_handle(e, "armor").exists());
    assert_eq!(ctx.get_property::<f64>(e, "armor"), Some(5.0));
    assert!(ctx.find_entities_by_property("armor").contains(&e));
}

#[test]
fn shadowed_handle_missed_before_a_define_is_not_kept() {
    let (gated, ctx, e) = gated_context(CacheConfig::default());
    gated.arm(GatedRead::ResolveProperty);

    let reader = {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || {
            let raced = ctx.property_handle(e, "armor");
            // The thread's shadow must not keep serving the raced handle.
            let again = ctx.property_handle(e, "armor");
            (raced.exists(), again.exists())
        })
    };
    assert!(gated.wait_held(HOLD));
    gated.inner().define_property(e, "armor", 5.0).unwrap();
    ctx.on_entity_changed(e);
    gated.release();

    assert_eq!(reader.join().unwrap(), (false, true));
}

#[test]
fn capability_answer_across_an_apply_is_not_kept() {
    let (gated, ctx, e) = gated_context(CacheConfig::single_threaded());
    gated.arm(GatedRead::AppliedCapabilities);

    let reader = {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || ctx.has_capability_strict(e, "Shielded"))
    };
    assert!(gated.wait_held(HOLD));
    gated.inner().apply_capability(e, "Shielded").unwrap();
    ctx.on_entity_changed(e);
    gated.release();

    assert!(!reader.join().unwrap());
    assert!(ctx.has_capability_strict(e, "Shielded"));
    assert!(ctx.find_entities_by_capability("Shielded").contains(&e));
}

#[test]
fn type_answer_across_a_retype_is_not_kept() {
    let (gated, ctx, e) = gated_context(CacheConfig::single_threaded());
    gated.arm(GatedRead::DeclaredType);

    let reader = {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || ctx.is_type_strict(e, "Enemy"))
    };
    assert!(gated.wait_held(HOLD));
    gated.inner().set_type(e, "Prop").unwrap();
    ctx.on_entity_changed(e);
    gated.release();

    assert!(reader.join().unwrap());
    assert!(!ctx.is_type_strict(e, "Enemy"));
    assert!(ctx.is_type_strict(e, "Prop"));
    assert!(ctx.find_entities_by_type("Prop").contains(&e));
}
