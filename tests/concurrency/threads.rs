//! Shared-context thread tests

use std::sync::Arc;
use std::thread;

use quiver_context::CacheConfig;
use quiver_foundation::Value;

use crate::counters;

const THREADS: usize = 8;
const ROUNDS: i64 = 200;

#[test]
fn disjoint_entities_lose_no_updates() {
    let (store, ctx, entities) = counters(THREADS * 4, CacheConfig::default());

    let workers: Vec<_> = entities
        .chunks(4)
        .map(|mine| {
            let ctx = Arc::clone(&ctx);
            let mine = mine.to_vec();
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    for &e in &mine {
                        let n: i64 = ctx.get_property(e, "counter").unwrap();
                        assert!(ctx.set_property(e, "counter", n + 1));
                    }
                    if round % 50 == 0 {
                        for &e in &mine {
                            assert!(ctx.sync_entity(e).is_clean());
                        }
                    }
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    assert!(ctx.sync_dirty_to_store().is_clean());
    for e in entities {
        assert_eq!(store.property(e, "counter"), Some(Value::Int(ROUNDS)));
    }
}

#[test]
fn global_sync_races_with_writers_safely() {
    let (store, ctx, entities) = counters(THREADS, CacheConfig::default());

    let syncer = {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || {
            for _ in 0..50 {
                assert!(ctx.sync_dirty_to_store().is_clean());
                thread::yield_now();
            }
        })
    };
    let writers: Vec<_> = entities
        .iter()
        .map(|&e| {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || {
                for i in 1..=ROUNDS {
                    ctx.set_property(e, "counter", i);
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }
    syncer.join().unwrap();

    ctx.sync_dirty_to_store();
    for e in entities {
        assert_eq!(store.property(e, "counter"), Some(Value::Int(ROUNDS)));
    }
}

#[test]
fn membership_reads_agree_across_threads() {
    let (_store, ctx, entities) = counters(16, CacheConfig::realtime().with_worker_threads(2));

    let readers: Vec<_> = (0..THREADS)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            let entities = entities.clone();
            thread::spawn(move || {
                entities
                    .iter()
                    .all(|&e| ctx.is_type(e, "Counter") && !ctx.is_type(e, "Enemy"))
            })
        })
        .collect();
    for r in readers {
        assert!(r.join().unwrap());
    }
    let relaxed = ctx.stats().relaxed.unwrap();
    assert_eq!(relaxed.hits + relaxed.misses, (THREADS * 16 * 2) as u64);
}

#[test]
fn names_interned_on_many_threads_are_identical() {
    let (_store, ctx, _) = counters(1, CacheConfig::default());

    let names: Vec<_> = (0..THREADS)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || ctx.intern("score"))
        })
        .map(|h| h.join().unwrap())
        .collect();
    for name in &names[1..] {
        assert!(name.ptr_eq(&names[0]));
    }
}
