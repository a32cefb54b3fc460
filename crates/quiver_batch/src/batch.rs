//! Structure-of-arrays batches.
//!
//! A [`Batch`] copies a fixed set of numeric fields for a homogeneous entity
//! set out of the [`ResultValueCache`] into aligned columns, runs kernels over
//! whole columns, and writes changed slots back into the value cache. The
//! store is never touched directly; dirty entries reach it through the normal
//! value cache sync.

use std::sync::Arc;

use quiver_cache::ResultValueCache;
use quiver_foundation::{EntityId, Error, Name, Result, ValueKind};
use tracing::{debug, warn};

use crate::column::{Column, ColumnView, lanes_as_mut_slice};
use crate::kernel::Kernel;

/// An entity left out of a batch because a field was unusable.
#[derive(Clone, Debug, PartialEq)]
pub struct Exclusion {
    /// The entity.
    pub entity: EntityId,
    /// The first field that could not be read.
    pub field: Name,
    /// Kind of the value found, or `None` if the property is missing.
    pub found: Option<ValueKind>,
}

/// Dense numeric columns over a set of entities.
#[derive(Debug)]
pub struct Batch {
    values: Arc<ResultValueCache>,
    entities: Vec<EntityId>,
    columns: Vec<Column>,
    /// Kernels with the index of their target column.
    kernels: Vec<(usize, Kernel)>,
    excluded: Vec<Exclusion>,
}

impl Batch {
    /// Reads `fields` for every entity into aligned columns.
    ///
    /// Entities missing a field, or holding a non-numeric value in one, are
    /// excluded and reported by [`excluded`](Self::excluded).
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `fields` is empty or names a field twice.
    pub fn build(
        values: Arc<ResultValueCache>,
        entities: impl IntoIterator<Item = EntityId>,
        fields: &[Name],
    ) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::invalid_config("batch needs at least one field"));
        }
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].contains(field) {
                return Err(Error::invalid_config(format!("batch field {field} listed twice")));
            }
        }

        let entities = entities.into_iter();
        let capacity = entities.size_hint().0;
        let mut columns: Vec<Column> = fields
            .iter()
            .map(|f| Column::with_capacity(f.clone(), capacity))
            .collect();
        let mut members = Vec::with_capacity(capacity);
        let mut excluded = Vec::new();
        let mut row = Vec::with_capacity(fields.len());

        'entities: for entity in entities {
            row.clear();
            for field in fields {
                let value = values.get_raw(entity, field);
                match value.as_ref().and_then(|v| v.as_number().map(|n| (n, v.kind()))) {
                    Some(slot) => row.push(slot),
                    None => {
                        excluded.push(Exclusion {
                            entity,
                            field: field.clone(),
                            found: value.map(|v| v.kind()),
                        });
                        continue 'entities;
                    }
                }
            }
            for (column, &(n, kind)) in columns.iter_mut().zip(&row) {
                column.push(n, kind);
            }
            members.push(entity);
        }

        if !excluded.is_empty() {
            debug!(excluded = excluded.len(), "entities left out of batch");
        }
        debug!(entities = members.len(), fields = fields.len(), "batch built");

        Ok(Self {
            values,
            entities: members,
            columns,
            kernels: Vec::new(),
            excluded,
        })
    }

    // --- Kernels ---

    /// Adds a kernel that runs on every [`update`](Self::update), after the
    /// kernels already added.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the kernel writes or reads a field that is
    /// not a column of this batch, or reads its own target.
    pub fn add_kernel(&mut self, kernel: Kernel) -> Result<()> {
        let target = self
            .column_index(kernel.target())
            .ok_or_else(|| Error::invalid_config(format!("no batch column {}", kernel.target())))?;
        for input in kernel.inputs() {
            if input == kernel.target() {
                return Err(Error::invalid_config(format!("kernel on {input} reads its own target")));
            }
            if self.column_index(input).is_none() {
                return Err(Error::invalid_config(format!("no batch column {input}")));
            }
        }
        self.kernels.push((target, kernel));
        Ok(())
    }

    /// Builder form of [`add_kernel`](Self::add_kernel).
    ///
    /// # Errors
    ///
    /// As for [`add_kernel`](Self::add_kernel).
    pub fn with_kernel(mut self, kernel: Kernel) -> Result<Self> {
        self.add_kernel(kernel)?;
        Ok(self)
    }

    /// Runs every kernel once across its whole column. Integer fields are
    /// rounded after each kernel, as a per-entity write would round them.
    pub fn update(&mut self, dt: f64) {
        let len = self.entities.len();
        for (target, kernel) in &self.kernels {
            let mut lanes = self.columns[*target].take_lanes();
            kernel.apply(
                lanes_as_mut_slice(&mut lanes, len),
                &ColumnView::new(&self.columns, *target),
                dt,
            );
            let column = &mut self.columns[*target];
            column.restore_lanes(lanes);
            column.round_integer_slots();
        }
    }

    /// Writes every changed slot into the value cache, marking it dirty.
    ///
    /// Returns the number of slots written. A slot whose property has
    /// disappeared is skipped and stays changed.
    pub fn sync_back(&mut self) -> usize {
        let mut written = 0;
        for column in &mut self.columns {
            for (slot, &entity) in self.entities.iter().enumerate() {
                if !column.is_changed(slot) {
                    continue;
                }
                if self.values.set_raw(entity, column.name(), column.value_at(slot)) {
                    column.mark_synced(slot);
                    written += 1;
                } else {
                    warn!(entity = %entity, field = %column.name(), "batch slot has no property to write");
                }
            }
        }
        debug!(written, "batch synced back");
        written
    }

    // --- Access ---

    /// Returns the named column's slots.
    #[must_use]
    pub fn column(&self, field: &Name) -> Option<&[f64]> {
        self.column_index(field).map(|i| self.columns[i].as_slice())
    }

    /// Returns the named column's slots for writing.
    pub fn column_mut(&mut self, field: &Name) -> Option<&mut [f64]> {
        self.column_index(field).map(|i| self.columns[i].as_mut_slice())
    }

    /// Returns every column.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the batched entities, in slot order.
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Returns the slot of `entity`, if batched.
    #[must_use]
    pub fn slot_of(&self, entity: EntityId) -> Option<usize> {
        self.entities.iter().position(|&e| e == entity)
    }

    /// Returns the number of batched entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if no entity was batched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns the entities left out at build time.
    #[must_use]
    pub fn excluded(&self) -> &[Exclusion] {
        &self.excluded
    }

    fn column_index(&self, field: &Name) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == field)
    }
}
