//! Configuration for a cache context.

use serde::{Deserialize, Serialize};

use quiver_foundation::{Error, Result};

/// Configuration for a [`CacheContext`](crate::CacheContext).
///
/// Controls cache bounds, the worker pool, and which fast paths are enabled.
/// Usually built from a preset and adjusted with the `with_*` methods, or
/// loaded once at startup with [`from_toml_str`](Self::from_toml_str).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum number of cached values (`None` = unbounded).
    pub value_capacity: Option<usize>,

    /// Number of worker threads.
    pub worker_threads: usize,

    /// Route `is_type`/`has_capability` through the relaxed membership cache.
    pub relaxed_membership: bool,

    /// Use thread-local shadows for interning and handle lookups.
    pub thread_local_shadows: bool,

    /// Entities per task in pipelines.
    pub chunk_size: usize,

    /// Names interned when the context is created.
    pub pre_intern: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            value_capacity: None,
            worker_threads: 4,
            relaxed_membership: false,
            thread_local_shadows: true,
            chunk_size: 256,
            pre_intern: Vec::new(),
        }
    }
}

impl CacheConfig {
    /// Creates a configuration for per-frame game workloads: bounded value
    /// cache, relaxed membership checks, and small chunks.
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            value_capacity: Some(65_536),
            worker_threads: std::thread::available_parallelism().map_or(4, usize::from),
            relaxed_membership: true,
            thread_local_shadows: true,
            chunk_size: 64,
            pre_intern: Vec::new(),
        }
    }

    /// Creates a configuration with one worker and no thread-local state.
    #[must_use]
    pub fn single_threaded() -> Self {
        Self {
            worker_threads: 1,
            thread_local_shadows: false,
            ..Self::default()
        }
    }

    /// Parses a configuration from TOML. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the text does not parse or fails
    /// [`validate`](Self::validate).
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::invalid_config(format!("bad cache config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::internal(format!("cannot render cache config: {e}")))
    }

    /// Checks the configuration for unusable values.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.value_capacity == Some(0) {
            return Err(Error::invalid_config("value_capacity must be > 0"));
        }
        if self.worker_threads == 0 {
            return Err(Error::invalid_config("worker_threads must be > 0"));
        }
        if self.chunk_size == 0 {
            return Err(Error::invalid_config("chunk_size must be > 0"));
        }
        Ok(())
    }

    /// Builder method to bound the value cache.
    #[must_use]
    pub fn with_value_capacity(mut self, capacity: usize) -> Self {
        self.value_capacity = Some(capacity);
        self
    }

    /// Builder method to set the worker thread count.
    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Builder method to enable or disable relaxed membership checks.
    #[must_use]
    pub fn with_relaxed_membership(mut self, relaxed: bool) -> Self {
        self.relaxed_membership = relaxed;
        self
    }

    /// Builder method to enable or disable thread-local shadows.
    #[must_use]
    pub fn with_thread_local_shadows(mut self, enabled: bool) -> Self {
        self.thread_local_shadows = enabled;
        self
    }

    /// Builder method to set the pipeline chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Builder method to add names interned at startup.
    #[must_use]
    pub fn with_pre_intern<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pre_intern.extend(names.into_iter().map(Into::into));
        self
    }
}
