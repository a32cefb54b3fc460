//! Worker pool and pipeline tests

use std::sync::Arc;

use quiver_context::CacheConfig;
use quiver_foundation::{ErrorKind, Value};

use crate::counters;

#[test]
fn pool_tasks_write_through_the_context() {
    let (store, ctx, entities) = counters(32, CacheConfig::default().with_worker_threads(4));

    let tasks = entities.iter().map(|&e| {
        let ctx = Arc::clone(&ctx);
        move || ctx.set_property(e, "score", 2.5)
    });
    let results = ctx.pool().execute_all(tasks).unwrap();
    assert!(results.into_iter().all(|ok| ok));

    assert_eq!(ctx.sync_dirty_to_store().written, 32);
    assert!(entities.iter().all(|&e| store.property(e, "score") == Some(Value::Float(2.5))));
}

#[test]
fn find_map_sync_pipeline() {
    let (store, ctx, _) = counters(100, CacheConfig::default().with_worker_threads(4).with_chunk_size(16));

    let finder = Arc::clone(&ctx);
    let mapper = Arc::clone(&ctx);
    let syncer = Arc::clone(&ctx);
    let outcome = ctx
        .pipeline()
        .run(
            move || {
                let mut found: Vec<_> = finder.find_entities_by_type("Counter").into_iter().collect();
                found.sort_unstable();
                found
            },
            move |e| mapper.set_property(e, "score", 1.0),
            move |entities, _| {
                let mut report = quiver_cache::SyncReport::default();
                for &e in entities {
                    report.merge(syncer.sync_entity(e));
                }
                report
            },
        )
        .unwrap();

    assert_eq!(outcome.entities.len(), 100);
    assert!(outcome.results.iter().all(|&ok| ok));
    assert_eq!(outcome.sync.written, 100);
    assert!(outcome.entities.iter().all(|&e| store.property(e, "score") == Some(Value::Float(1.0))));
}

#[test]
fn aborted_pipeline_writes_nothing() {
    let (store, ctx, entities) = counters(4, CacheConfig::default());
    let pipeline = ctx.pipeline();
    let abort = pipeline.abort_handle();

    let list = entities.clone();
    let mapper = Arc::clone(&ctx);
    let err = pipeline
        .run(
            move || {
                abort.abort();
                list
            },
            move |e| mapper.set_property(e, "score", 9.0),
            |_, _| quiver_cache::SyncReport::default(),
        )
        .unwrap_err();

    assert!(matches!(err.kind, ErrorKind::Aborted(_)));
    assert_eq!(ctx.stats().dirty, 0);
    assert!(entities.iter().all(|&e| store.property(e, "score") == Some(Value::Float(0.0))));
}

#[test]
fn shutdown_rejects_new_work() {
    let (_store, ctx, _) = counters(1, CacheConfig::default().with_worker_threads(2));
    assert!(ctx.shutdown().is_clean());
    let err = ctx.pool().submit(|| 1).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::PoolShutdown));
}
