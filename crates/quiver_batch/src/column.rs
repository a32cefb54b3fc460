//! Cache-line aligned numeric columns.
//!
//! A column stores one field for every entity of a batch. Storage is a vector
//! of 64-byte [`Lane`]s, so the first element of every column starts on a
//! cache line and eight `f64` slots share each line. Systems see the column as
//! a plain `&[f64]` through a zero-copy `bytemuck` cast.

use bytemuck::{Pod, Zeroable};
use quiver_foundation::{Name, Value, ValueKind};

/// Number of `f64` slots per lane.
pub const LANE_WIDTH: usize = 8;

/// One cache line of column storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C, align(64))]
pub struct Lane(pub [f64; LANE_WIDTH]);

const _: () = assert!(std::mem::size_of::<Lane>() == 64);
const _: () = assert!(std::mem::align_of::<Lane>() == 64);

/// A single field laid out for every entity in a batch.
#[derive(Clone, Debug)]
pub struct Column {
    name: Name,
    lanes: Vec<Lane>,
    len: usize,
    /// Values as last read from or written to the value cache.
    synced: Vec<f64>,
    /// Source kind per slot, so integer fields go back as integers.
    kinds: Vec<ValueKind>,
}

impl Column {
    pub(crate) fn with_capacity(name: Name, capacity: usize) -> Self {
        Self {
            name,
            lanes: Vec::with_capacity(capacity.div_ceil(LANE_WIDTH)),
            len: 0,
            synced: Vec::with_capacity(capacity),
            kinds: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, value: f64, kind: ValueKind) {
        let slot = self.len % LANE_WIDTH;
        if slot == 0 {
            self.lanes.push(Lane::zeroed());
        }
        if let Some(lane) = self.lanes.last_mut() {
            lane.0[slot] = value;
        }
        self.len += 1;
        self.synced.push(value);
        self.kinds.push(kind);
    }

    /// Returns the field name.
    #[must_use]
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the column has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the slots as a contiguous slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &bytemuck::cast_slice::<Lane, f64>(&self.lanes)[..self.len]
    }

    /// Returns the slots as a contiguous mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut bytemuck::cast_slice_mut::<Lane, f64>(&mut self.lanes)[..self.len]
    }

    /// Returns true if the slot differs from its last synced value.
    pub(crate) fn is_changed(&self, slot: usize) -> bool {
        self.as_slice()[slot].to_bits() != self.synced[slot].to_bits()
    }

    /// Converts a slot back into a [`Value`] of its source kind.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn value_at(&self, slot: usize) -> Value {
        let v = self.as_slice()[slot];
        match self.kinds[slot] {
            ValueKind::Int => Value::Int(v.round() as i64),
            _ => Value::Float(v),
        }
    }

    /// Rounds integer-kind slots to whole numbers, as a write through the
    /// value cache would.
    pub(crate) fn round_integer_slots(&mut self) {
        let slots = &mut bytemuck::cast_slice_mut::<Lane, f64>(&mut self.lanes)[..self.len];
        for (v, kind) in slots.iter_mut().zip(&self.kinds) {
            if *kind == ValueKind::Int {
                *v = v.round();
            }
        }
    }

    pub(crate) fn mark_synced(&mut self, slot: usize) {
        self.synced[slot] = self.as_slice()[slot];
    }

    /// Moves the storage out, leaving the column empty until restored.
    pub(crate) fn take_lanes(&mut self) -> Vec<Lane> {
        std::mem::take(&mut self.lanes)
    }

    pub(crate) fn restore_lanes(&mut self, lanes: Vec<Lane>) {
        self.lanes = lanes;
    }

    /// Returns the pointer address of the first slot.
    #[must_use]
    pub fn base_address(&self) -> usize {
        self.lanes.as_ptr() as usize
    }
}

/// Views a taken-out lane vector as `len` slots.
pub(crate) fn lanes_as_mut_slice(lanes: &mut [Lane], len: usize) -> &mut [f64] {
    &mut bytemuck::cast_slice_mut::<Lane, f64>(lanes)[..len]
}

/// Read access to the columns of a batch while one of them is being written.
///
/// The column under update is absent from the view.
#[derive(Clone, Copy, Debug)]
pub struct ColumnView<'a> {
    columns: &'a [Column],
    hidden: usize,
}

impl<'a> ColumnView<'a> {
    pub(crate) fn new(columns: &'a [Column], hidden: usize) -> Self {
        Self { columns, hidden }
    }

    /// Returns the named column's slots.
    #[must_use]
    pub fn get(&self, name: &Name) -> Option<&'a [f64]> {
        self.columns
            .iter()
            .enumerate()
            .find(|(i, c)| *i != self.hidden && c.name() == name)
            .map(|(_, c)| c.as_slice())
    }
}
