//! Whole-column update kernels.

use std::fmt;
use std::sync::Arc;

use quiver_foundation::Name;

use crate::column::ColumnView;

/// A kernel argument: a constant or another column of the batch.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// The same value for every slot.
    Const(f64),
    /// The slot-wise value of another column.
    Field(Name),
}

impl Operand {
    pub(crate) fn field(&self) -> Option<&Name> {
        match self {
            Self::Field(name) => Some(name),
            Self::Const(_) => None,
        }
    }

    fn resolve<'a>(&self, view: &ColumnView<'a>) -> Resolved<'a> {
        match self {
            Self::Const(v) => Resolved::Const(*v),
            // Fields are checked when the kernel is added.
            Self::Field(name) => view.get(name).map_or(Resolved::Const(0.0), Resolved::Column),
        }
    }
}

impl From<f64> for Operand {
    fn from(v: f64) -> Self {
        Self::Const(v)
    }
}

impl From<Name> for Operand {
    fn from(name: Name) -> Self {
        Self::Field(name)
    }
}

impl From<&Name> for Operand {
    fn from(name: &Name) -> Self {
        Self::Field(name.clone())
    }
}

enum Resolved<'a> {
    Const(f64),
    Column(&'a [f64]),
}

impl Resolved<'_> {
    #[inline]
    fn at(&self, slot: usize) -> f64 {
        match self {
            Self::Const(v) => *v,
            Self::Column(c) => c[slot],
        }
    }
}

/// Signature of a custom whole-column kernel: target slots, the other
/// columns, and the time step.
pub type CustomFn = dyn Fn(&mut [f64], &ColumnView<'_>, f64) + Send + Sync;

/// A transform applied to one column on every update.
#[derive(Clone)]
pub enum Kernel {
    /// Moves the target by `rate * dt` toward the bound in the rate's
    /// direction, stopping at `max` when rising and `min` when falling.
    Integrate {
        /// Column written.
        target: Name,
        /// Change per unit of time.
        rate: Operand,
        /// Lower bound.
        min: Operand,
        /// Upper bound.
        max: Operand,
    },
    /// Multiplies the target by `factor` on every update.
    Scale {
        /// Column written.
        target: Name,
        /// Multiplier.
        factor: Operand,
    },
    /// Arbitrary whole-column function.
    Custom {
        /// Column written.
        target: Name,
        /// The function.
        f: Arc<CustomFn>,
    },
}

impl Kernel {
    /// Builds a [`Kernel::Custom`].
    pub fn custom<F>(target: Name, f: F) -> Self
    where
        F: Fn(&mut [f64], &ColumnView<'_>, f64) + Send + Sync + 'static,
    {
        Self::Custom {
            target,
            f: Arc::new(f),
        }
    }

    /// Returns the column this kernel writes.
    #[must_use]
    pub fn target(&self) -> &Name {
        match self {
            Self::Integrate { target, .. } | Self::Scale { target, .. } | Self::Custom { target, .. } => {
                target
            }
        }
    }

    /// Returns every column this kernel reads besides its target.
    pub(crate) fn inputs(&self) -> Vec<&Name> {
        match self {
            Self::Integrate { rate, min, max, .. } => [rate, min, max]
                .into_iter()
                .filter_map(Operand::field)
                .collect(),
            Self::Scale { factor, .. } => factor.field().into_iter().collect(),
            Self::Custom { .. } => Vec::new(),
        }
    }

    pub(crate) fn apply(&self, target: &mut [f64], view: &ColumnView<'_>, dt: f64) {
        match self {
            Self::Integrate { rate, min, max, .. } => {
                let (rate, min, max) = (rate.resolve(view), min.resolve(view), max.resolve(view));
                for (slot, v) in target.iter_mut().enumerate() {
                    *v = integrate_step(*v, rate.at(slot), min.at(slot), max.at(slot), dt);
                }
            }
            Self::Scale { factor, .. } => {
                let factor = factor.resolve(view);
                for (slot, v) in target.iter_mut().enumerate() {
                    *v *= factor.at(slot);
                }
            }
            Self::Custom { f, .. } => f(target, view, dt),
        }
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integrate {
                target,
                rate,
                min,
                max,
            } => f
                .debug_struct("Integrate")
                .field("target", target)
                .field("rate", rate)
                .field("min", min)
                .field("max", max)
                .finish(),
            Self::Scale { target, factor } => f
                .debug_struct("Scale")
                .field("target", target)
                .field("factor", factor)
                .finish(),
            Self::Custom { target, .. } => f.debug_struct("Custom").field("target", target).finish_non_exhaustive(),
        }
    }
}

/// One integration step for a single value.
///
/// A value already beyond the bound it is moving toward is left alone.
#[inline]
#[must_use]
pub fn integrate_step(value: f64, rate: f64, min: f64, max: f64, dt: f64) -> f64 {
    let step = rate * dt;
    if step > 0.0 && value < max {
        (value + step).min(max)
    } else if step < 0.0 && value > min {
        (value + step).max(min)
    } else {
        value
    }
}
