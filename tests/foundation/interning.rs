//! Integration tests for name interning
//!
//! Tests identity, cross-thread idempotence, and name groups.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use quiver_foundation::{Interner, NameGroup};

// =============================================================================
// Identity
// =============================================================================

#[test]
fn same_text_same_identity() {
    let names = Interner::new();
    let a = names.get_or_create("health:current");
    let b = names.get_or_create("health:current");
    assert_eq!(a, b);
    assert!(a.ptr_eq(&b));
    assert_eq!(names.len(), 1);
}

#[test]
fn distinct_text_distinct_identity() {
    let names = Interner::new();
    let words = ["health", "armor", "speed", "health:max", "Health"];
    let interned: HashSet<_> = words.iter().map(|w| names.get_or_create(w)).collect();
    assert_eq!(interned.len(), words.len());
}

#[test]
fn lookups_never_insert() {
    let names = Interner::new();
    assert_eq!(names.get("missing"), None);
    assert!(!names.contains("missing"));
    assert!(names.is_empty());
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn interning_is_idempotent_across_threads() {
    let names = Arc::new(Interner::new());
    let words: Vec<String> = (0..64).map(|i| format!("prop:{i}")).collect();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let names = Arc::clone(&names);
            let words = words.clone();
            thread::spawn(move || words.iter().map(|w| names.get_or_create(w)).collect::<Vec<_>>())
        })
        .collect();

    let results: Vec<Vec<_>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for other in &results[1..] {
        for (a, b) in results[0].iter().zip(other) {
            assert!(a.ptr_eq(b));
        }
    }
    assert_eq!(names.len(), words.len());
}

// =============================================================================
// Groups
// =============================================================================

#[test]
fn namespaced_groups_share_the_interner() {
    let names = Interner::new();
    let health = NameGroup::namespaced(&names, "health", &["current", "maximum"]);

    assert_eq!(health.len(), 2);
    assert_eq!(health.get("current"), Some(&names.get_or_create("health:current")));
    assert_eq!(health.get("missing"), None);
}
