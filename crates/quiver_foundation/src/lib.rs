//! Entity identifiers, interned names, values, and errors for Quiver.
//!
//! This crate provides:
//! - [`EntityId`] - Generational entity identifiers used as the universal cache key
//! - [`Name`] / [`Interner`] - Identity-preserving, thread-safe string interning
//! - [`Value`] / [`PropertyValue`] - One tagged value representation with typed access
//! - [`Error`] - Error kinds shared by every cache layer

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod entity;
pub mod error;
pub mod intern;
pub mod value;

pub use entity::EntityId;
pub use error::{Error, ErrorContext, ErrorKind, Result};
pub use intern::{Interner, Name, NameGroup};
pub use value::{PropertyValue, Value, ValueKind};
