//! Tagged property values and typed access.
//!
//! All property values flow through one [`Value`] enum. Typed getters and
//! setters are generic over [`PropertyValue`], so a single cache serves every
//! primitive type instead of one cache per type.

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// The kind of a [`Value`], used for type checks and error reporting.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ValueKind {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// Text.
    Text,
    /// Entity reference.
    Entity,
    /// Three-component vector.
    Vec3,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Entity => "entity",
            Self::Vec3 => "vec3",
        };
        f.write_str(name)
    }
}

/// A decoded property value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// Text value.
    Text(Arc<str>),
    /// Reference to another entity.
    Entity(EntityId),
    /// Three-component vector (positions, velocities, colors).
    Vec3([f64; 3]),
}

impl Value {
    /// Returns the kind of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::Entity(_) => ValueKind::Entity,
            Self::Vec3(_) => ValueKind::Vec3,
        }
    }

    /// Attempts to extract a boolean value.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to extract an integer value.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract a number as f64 (integers widen).
    ///
    /// Note: Converting large i64 values to f64 may lose precision.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract a string reference.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Attempts to extract an entity reference.
    #[must_use]
    pub const fn as_entity(&self) -> Option<EntityId> {
        match self {
            Self::Entity(id) => Some(*id),
            _ => None,
        }
    }

    /// Attempts to extract a vector.
    #[must_use]
    pub const fn as_vec3(&self) -> Option<[f64; 3]> {
        match self {
            Self::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns true if this value is numeric (int or float).
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Entity(id) => write!(f, "{id}"),
            Self::Vec3([x, y, z]) => write!(f, "({x}, {y}, {z})"),
        }
    }
}

/// A Rust type that can be stored in and read from a [`Value`].
pub trait PropertyValue: Sized {
    /// The kind this type is stored as.
    const KIND: ValueKind;

    /// Decodes from a value, returning `None` on a kind mismatch.
    fn from_value(value: &Value) -> Option<Self>;

    /// Encodes into a value.
    fn into_value(self) -> Value;
}

impl PropertyValue for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl PropertyValue for i64 {
    const KIND: ValueKind = ValueKind::Int;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_int()
    }

    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl PropertyValue for i32 {
    const KIND: ValueKind = ValueKind::Int;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_int().and_then(|n| i32::try_from(n).ok())
    }

    fn into_value(self) -> Value {
        Value::Int(i64::from(self))
    }
}

impl PropertyValue for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_number()
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl PropertyValue for f32 {
    const KIND: ValueKind = ValueKind::Float;

    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: &Value) -> Option<Self> {
        value.as_number().map(|n| n as f32)
    }

    fn into_value(self) -> Value {
        Value::Float(f64::from(self))
    }
}

impl PropertyValue for String {
    const KIND: ValueKind = ValueKind::Text;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(ToString::to_string)
    }

    fn into_value(self) -> Value {
        Value::Text(self.into())
    }
}

impl PropertyValue for Arc<str> {
    const KIND: ValueKind = ValueKind::Text;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(s) => Some(Arc::clone(s)),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Text(self)
    }
}

impl PropertyValue for EntityId {
    const KIND: ValueKind = ValueKind::Entity;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_entity()
    }

    fn into_value(self) -> Value {
        Value::Entity(self)
    }
}

impl PropertyValue for [f64; 3] {
    const KIND: ValueKind = ValueKind::Vec3;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_vec3()
    }

    fn into_value(self) -> Value {
        Value::Vec3(self)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.into())
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Self::Entity(id)
    }
}

impl From<[f64; 3]> for Value {
    fn from(v: [f64; 3]) -> Self {
        Self::Vec3(v)
    }
}
