//! Integration tests for errors
//!
//! Tests error classification, messages, and context.

use quiver_foundation::{EntityId, Error, ErrorContext, ErrorKind, ValueKind};

#[test]
fn not_found_kinds_are_classified() {
    let e = EntityId::new(1, 1);
    assert!(Error::entity_not_found(e).is_not_found());
    assert!(Error::property_not_found(e, "health").is_not_found());
    assert!(!Error::stale_handle(e, "health").is_not_found());
    assert!(Error::stale_handle(e, "health").is_stale());
}

#[test]
fn messages_name_the_problem() {
    let err = Error::type_mismatch(ValueKind::Float, ValueKind::Text);
    assert_eq!(err.to_string(), "type mismatch: expected float, got text");

    let err = Error::new(ErrorKind::Aborted("map".into()));
    assert_eq!(err.to_string(), "aborted before stage map");
}

#[test]
fn context_is_attached() {
    let e = EntityId::new(4, 1);
    let err = Error::sync_failure(e, "health", "read only").with_context(
        ErrorContext::new()
            .with_operation("sync")
            .with_entity(e)
            .with_note("retry on next frame"),
    );
    let ctx = err.context.as_ref().unwrap();
    assert_eq!(ctx.operation.as_deref(), Some("sync"));
    assert_eq!(ctx.entity, Some(e));
    assert!(ctx.to_string().contains("retry on next frame"));
}
