//! Error types for the Quiver cache layers.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.
//!
//! Most misses are not errors at all: a missing property or entity is
//! reported as `None`/`false` by the caches. The kinds here exist for the
//! paths that must surface a failure explicitly, chiefly write-back.

use std::fmt;

use thiserror::Error;

use crate::entity::EntityId;
use crate::value::ValueKind;

/// Result type for Quiver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Quiver operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates an entity not found error.
    #[must_use]
    pub fn entity_not_found(id: EntityId) -> Self {
        Self::new(ErrorKind::EntityNotFound(id))
    }

    /// Creates a property not found error.
    #[must_use]
    pub fn property_not_found(entity: EntityId, property: impl Into<String>) -> Self {
        Self::new(ErrorKind::PropertyNotFound {
            entity,
            property: property.into(),
        })
    }

    /// Creates a stale handle error.
    #[must_use]
    pub fn stale_handle(entity: EntityId, property: impl Into<String>) -> Self {
        Self::new(ErrorKind::StaleHandle {
            entity,
            property: property.into(),
        })
    }

    /// Creates a write-back failure error.
    #[must_use]
    pub fn sync_failure(
        entity: EntityId,
        property: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::SyncFailure {
            entity,
            property: property.into(),
            reason: reason.into(),
        })
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: ValueKind, actual: ValueKind) -> Self {
        Self::new(ErrorKind::TypeMismatch { expected, actual })
    }

    /// Creates a store rejection error (the store refused a write).
    #[must_use]
    pub fn store_rejected(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::StoreRejected(reason.into()))
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfig(reason.into()))
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }

    /// Returns true if this error means "absent" rather than "broken".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::EntityNotFound(_) | ErrorKind::PropertyNotFound { .. }
        )
    }

    /// Returns true if this error was caused by an outdated handle.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self.kind, ErrorKind::StaleHandle { .. })
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Entity was not found in the store.
    #[error("entity not found: {0:?}")]
    EntityNotFound(EntityId),

    /// Property was not found on an entity.
    #[error("property not found: {property} on entity {entity:?}")]
    PropertyNotFound {
        /// The entity that was queried.
        entity: EntityId,
        /// The property name that was not found.
        property: String,
    },

    /// A cached handle was invalidated by a structural change.
    #[error("stale handle: {property} on entity {entity:?}")]
    StaleHandle {
        /// The entity the handle belongs to.
        entity: EntityId,
        /// The property the handle points at.
        property: String,
    },

    /// Writing a dirty value back to the store failed.
    #[error("sync failed for {property} on entity {entity:?}: {reason}")]
    SyncFailure {
        /// The entity whose value could not be written.
        entity: EntityId,
        /// The property whose value could not be written.
        property: String,
        /// Why the store rejected the write.
        reason: String,
    },

    /// Value had a different kind than requested.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The expected kind.
        expected: ValueKind,
        /// The kind actually stored.
        actual: ValueKind,
    },

    /// The store refused an operation.
    #[error("store rejected operation: {0}")]
    StoreRejected(String),

    /// A task was submitted to a pool that has shut down.
    #[error("worker pool is shut down")]
    PoolShutdown,

    /// A pooled task panicked before producing a result.
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    /// A staged operation was aborted between stages.
    #[error("aborted before stage {0}")]
    Aborted(String),

    /// Configuration was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Operation that was running (`sync`, `build_index`, ...).
    pub operation: Option<String>,
    /// Entity involved, if any.
    pub entity: Option<EntityId>,
    /// Additional notes, outermost last.
    pub notes: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Sets the entity.
    #[must_use]
    pub fn with_entity(mut self, entity: EntityId) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Adds a note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(op) = &self.operation {
            write!(f, "during {op}")?;
        }
        if let Some(entity) = self.entity {
            write!(f, " on {entity}")?;
        }
        for note in &self.notes {
            write!(f, "\n  {note}")?;
        }
        Ok(())
    }
}
