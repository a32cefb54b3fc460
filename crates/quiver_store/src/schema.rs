//! Schema definitions for primary types and capabilities.
//!
//! A primary type is the single declared type of an entity and may inherit
//! from one parent type. A capability is applied on top of the primary type;
//! multi-apply capabilities are applied as named instances (`Collision:head`).

use std::collections::HashMap;

use quiver_foundation::{Error, Result, Value};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a schema participates in membership checks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SchemaKind {
    /// A declared type with single inheritance.
    Primary,
    /// A capability applied on top of the declared type.
    Capability {
        /// Whether the capability can be applied several times as named instances.
        multi_apply: bool,
    },
}

impl SchemaKind {
    /// Returns true for capabilities.
    #[must_use]
    pub const fn is_capability(self) -> bool {
        matches!(self, Self::Capability { .. })
    }
}

/// Schema definition for a type or capability.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TypeSchema {
    /// Schema name (e.g., `Enemy`, `HealthComponent`).
    pub name: String,
    /// Primary or capability.
    pub kind: SchemaKind,
    /// Parent type, primary types only.
    pub parent: Option<String>,
    /// Properties defined when the schema is applied, with their defaults.
    pub properties: Vec<(String, Value)>,
}

impl TypeSchema {
    /// Creates a primary type schema.
    #[must_use]
    pub fn primary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SchemaKind::Primary,
            parent: None,
            properties: Vec::new(),
        }
    }

    /// Creates a capability schema.
    #[must_use]
    pub fn capability(name: impl Into<String>, multi_apply: bool) -> Self {
        Self {
            name: name.into(),
            kind: SchemaKind::Capability { multi_apply },
            parent: None,
            properties: Vec::new(),
        }
    }

    /// Sets the parent type.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Adds a property with a default value.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.properties.push((name.into(), default.into()));
        self
    }
}

/// Registry of every known schema.
///
/// Parents must be registered before their children, so ancestry chains are
/// always finite.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, TypeSchema>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken, the parent is unknown or not a
    /// primary type, or a capability declares a parent.
    pub fn register(&mut self, schema: TypeSchema) -> Result<()> {
        if self.schemas.contains_key(&schema.name) {
            return Err(Error::store_rejected(format!(
                "schema already registered: {}",
                schema.name
            )));
        }

        if let Some(parent) = &schema.parent {
            if schema.kind.is_capability() {
                return Err(Error::store_rejected(format!(
                    "capability {} cannot inherit",
                    schema.name
                )));
            }
            match self.schemas.get(parent) {
                Some(p) if p.kind == SchemaKind::Primary => {}
                Some(_) => {
                    return Err(Error::store_rejected(format!(
                        "parent {parent} of {} is not a primary type",
                        schema.name
                    )));
                }
                None => {
                    return Err(Error::store_rejected(format!(
                        "unknown parent {parent} for {}",
                        schema.name
                    )));
                }
            }
        }

        self.schemas.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Returns the schema registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypeSchema> {
        self.schemas.get(name)
    }

    /// Returns the kind of a schema.
    ///
    /// Instance names of multi-apply capabilities (`Collision:head`) resolve
    /// to their base capability.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<SchemaKind> {
        if let Some(schema) = self.schemas.get(name) {
            return Some(schema.kind);
        }
        let (base, _) = name.split_once(':')?;
        match self.schemas.get(base)?.kind {
            kind @ SchemaKind::Capability { multi_apply: true } => Some(kind),
            _ => None,
        }
    }

    /// Returns the ancestry chain, the type itself first and the root last.
    ///
    /// Unregistered names have an empty chain.
    #[must_use]
    pub fn ancestry_chain(&self, name: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = self.schemas.get(name);
        while let Some(schema) = current {
            chain.push(schema.name.clone());
            current = schema.parent.as_ref().and_then(|p| self.schemas.get(p));
        }
        chain
    }

    /// Returns the properties a type defines, ancestors first.
    #[must_use]
    pub fn properties_for(&self, name: &str) -> Vec<(String, Value)> {
        let mut props = Vec::new();
        for ty in self.ancestry_chain(name).iter().rev() {
            if let Some(schema) = self.schemas.get(ty) {
                props.extend(schema.properties.iter().cloned());
            }
        }
        props
    }

    /// Returns the number of registered schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
