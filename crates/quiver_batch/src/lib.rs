//! Batch layout transformer for Quiver.
//!
//! This crate provides:
//! - [`Batch`] - Dense numeric columns over a homogeneous entity set
//! - [`Column`] / [`Lane`] - 64-byte aligned column storage viewed as `&[f64]`
//! - [`Kernel`] - Whole-column transforms run by [`Batch::update`]
//!
//! Batches read from and write back into a `ResultValueCache`, never the
//! store, so every write still reaches the store through a value cache sync.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod batch;
pub mod column;
pub mod kernel;

pub use batch::{Batch, Exclusion};
pub use column::{Column, ColumnView, LANE_WIDTH, Lane};
pub use kernel::{CustomFn, Kernel, Operand, integrate_step};
