//! Integration tests for the foundation layer
//!
//! Tests for interned names, values, and errors.

mod errors;
mod interning;
mod values;
