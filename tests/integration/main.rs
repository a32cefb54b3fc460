//! Cross-layer integration tests for Quiver
//!
//! Tests that verify the context, caches, and index working together over
//! one store.

mod scenarios;
mod structural;
