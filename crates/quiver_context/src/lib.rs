//! Cache context facade for Quiver.
//!
//! This crate provides:
//! - [`CacheContext`] - One owned instance of every cache service over a store
//! - [`CacheConfig`] - Presets, builders, and TOML loading for a context
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use quiver_context::{CacheConfig, CacheContext};
//! use quiver_store::MemoryStore;
//!
//! let store = Arc::new(MemoryStore::new());
//! store.register_type("Enemy", None).unwrap();
//! let enemy = store.spawn(store.root()).unwrap();
//! store.set_type(enemy, "Enemy").unwrap();
//! store.define_property(enemy, "health", 100.0).unwrap();
//!
//! let ctx = CacheContext::new(store.clone(), CacheConfig::single_threaded()).unwrap();
//! ctx.build_index(store.root());
//!
//! assert!(ctx.find_entities_by_type("Enemy").contains(&enemy));
//! ctx.set_property(enemy, "health", 60.0);
//! assert!(ctx.sync_dirty_to_store().is_clean());
//! assert_eq!(store.property(enemy, "health"), Some(60.0.into()));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod context;

pub use config::CacheConfig;
pub use context::{CacheContext, ContextStats};
