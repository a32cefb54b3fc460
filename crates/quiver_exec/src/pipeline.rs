//! Staged parallel pipeline.
//!
//! A pipeline runs three stages in order:
//! 1. **find** - pick the entities to process (usually an index query)
//! 2. **map** - run a per-entity function on the worker pool, chunked
//! 3. **sync** - write the results back (usually a value cache sync)
//!
//! There is no in-flight cancellation. An [`AbortHandle`] is checked between
//! stages; a stage that has started always completes.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use quiver_cache::SyncReport;
use quiver_foundation::{EntityId, Error, ErrorKind, Result};
use tracing::debug;

use crate::pool::WorkerPool;

/// Pipeline stages.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Entity selection.
    Find,
    /// Parallel per-entity work.
    Map,
    /// Write-back.
    Sync,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Find => "find",
            Self::Map => "map",
            Self::Sync => "sync",
        })
    }
}

/// Shared flag that stops a pipeline before its next stage.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    /// Creates a handle that has not been triggered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests an abort.
    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once an abort was requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clears the flag so the pipeline can run again.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What a completed pipeline run produced.
#[derive(Debug)]
pub struct PipelineOutcome<R> {
    /// Entities chosen by the find stage.
    pub entities: Vec<EntityId>,
    /// Map results, in entity order.
    pub results: Vec<R>,
    /// Outcome of the sync stage.
    pub sync: SyncReport,
}

/// A find, map, and sync pipeline over a worker pool.
#[derive(Clone, Debug)]
pub struct Pipeline {
    pool: Arc<WorkerPool>,
    chunk_size: usize,
    abort: AbortHandle,
}

impl Pipeline {
    /// Creates a pipeline mapping `chunk_size` entities per task.
    #[must_use]
    pub fn new(pool: Arc<WorkerPool>, chunk_size: usize) -> Self {
        Self {
            pool,
            chunk_size: chunk_size.max(1),
            abort: AbortHandle::new(),
        }
    }

    /// Returns a handle that aborts this pipeline between stages.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Runs the three stages.
    ///
    /// # Errors
    ///
    /// Returns `Aborted` naming the stage that did not start, or the first
    /// error raised by a map task.
    pub fn run<R, F, M, S>(&self, find: F, map: M, sync: S) -> Result<PipelineOutcome<R>>
    where
        R: Send + 'static,
        F: FnOnce() -> Vec<EntityId>,
        M: Fn(EntityId) -> R + Send + Sync + 'static,
        S: FnOnce(&[EntityId], &[R]) -> SyncReport,
    {
        self.checkpoint(Stage::Find)?;
        let entities = find();
        debug!(entities = entities.len(), "pipeline find done");

        self.checkpoint(Stage::Map)?;
        let results: Vec<R> = self
            .pool
            .map_chunks(entities.clone(), self.chunk_size, move |chunk| {
                chunk.into_iter().map(&map).collect::<Vec<_>>()
            })?
            .into_iter()
            .flatten()
            .collect();

        self.checkpoint(Stage::Sync)?;
        let report = sync(&entities, &results);
        debug!(written = report.written, "pipeline sync done");

        Ok(PipelineOutcome {
            entities,
            results,
            sync: report,
        })
    }

    fn checkpoint(&self, stage: Stage) -> Result<()> {
        if self.abort.is_aborted() {
            debug!(%stage, "pipeline aborted");
            return Err(Error::new(ErrorKind::Aborted(stage.to_string())));
        }
        Ok(())
    }
}
