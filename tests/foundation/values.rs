//! Integration tests for values
//!
//! Tests typed conversion through `PropertyValue` and value display.

use std::sync::Arc;

use quiver_foundation::{EntityId, PropertyValue, Value, ValueKind};

// =============================================================================
// Typed Conversion
// =============================================================================

#[test]
fn floats_round_trip() {
    let v = 42.5_f64.into_value();
    assert_eq!(v.kind(), ValueKind::Float);
    assert_eq!(f64::from_value(&v), Some(42.5));
}

#[test]
fn integers_do_not_decode_as_bools() {
    let v = Value::Int(1);
    assert_eq!(bool::from_value(&v), None);
    assert_eq!(i64::from_value(&v), Some(1));
}

#[test]
fn text_decodes_as_string_and_shared_str() {
    let v = Value::Text(Arc::from("goblin"));
    assert_eq!(String::from_value(&v).as_deref(), Some("goblin"));
    assert_eq!(v.as_str(), Some("goblin"));
}

#[test]
fn entity_references() {
    let target = EntityId::new(7, 1);
    let v: Value = target.into();
    assert_eq!(v.as_entity(), Some(target));
    assert_eq!(EntityId::from_value(&v), Some(target));
}

#[test]
fn numbers_widen() {
    assert_eq!(Value::Int(3).as_number(), Some(3.0));
    assert_eq!(Value::Float(0.5).as_number(), Some(0.5));
    assert_eq!(Value::Bool(true).as_number(), None);
}

// =============================================================================
// Entity Ids
// =============================================================================

#[test]
fn null_entity() {
    assert!(EntityId::null().is_null());
    assert!(!EntityId::new(0, 1).is_null());
    assert_eq!(EntityId::default(), EntityId::null());
}
