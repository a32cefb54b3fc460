//! Combined query criteria.

use quiver_foundation::EntityId;

/// A conjunction of index conditions.
///
/// Every condition must hold. Criteria with no condition match nothing.
///
/// # Example
///
/// ```
/// use quiver_index::Criteria;
///
/// let criteria = Criteria::new()
///     .with_type("Enemy")
///     .with_property("health:current");
/// assert_eq!(criteria.condition_count(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Criteria {
    /// Types or capabilities the entity must have.
    pub types: Vec<String>,
    /// Properties the entity must have.
    pub properties: Vec<String>,
    /// Property prefixes the entity must have at least one property under.
    pub property_prefixes: Vec<String>,
    /// (relationship, target) edges the entity must have.
    pub targets: Vec<(String, EntityId)>,
}

impl Criteria {
    /// Creates empty criteria.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires a type or capability.
    #[must_use]
    pub fn with_type(mut self, name: impl Into<String>) -> Self {
        self.types.push(name.into());
        self
    }

    /// Requires a property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>) -> Self {
        self.properties.push(name.into());
        self
    }

    /// Requires at least one property starting with `prefix`.
    #[must_use]
    pub fn with_property_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.property_prefixes.push(prefix.into());
        self
    }

    /// Requires an edge `relationship` pointing at `target`.
    #[must_use]
    pub fn targeting(mut self, relationship: impl Into<String>, target: EntityId) -> Self {
        self.targets.push((relationship.into(), target));
        self
    }

    /// Returns the number of conditions.
    #[must_use]
    pub fn condition_count(&self) -> usize {
        self.types.len() + self.properties.len() + self.property_prefixes.len() + self.targets.len()
    }

    /// Returns true if there are no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.condition_count() == 0
    }
}
