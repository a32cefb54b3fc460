//! Fixed-size worker pool.
//!
//! Workers drain a shared queue guarded by a mutex and condition variable.
//! Every submission returns a [`TaskHandle`] backed by a one-shot channel.
//! A panicking task is reported through its handle; the worker survives.
//!
//! Shutdown stops accepting work, lets the workers drain everything already
//! queued, then joins them. Dropping the pool shuts it down.
//!
//! Tasks must not block on other tasks of the same pool: with every worker
//! waiting, nothing is left to run what they wait for.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use quiver_foundation::{Error, ErrorKind, Result};
use tracing::{debug, info};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Queue {
    jobs: VecDeque<Job>,
    stopping: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
    completed: AtomicU64,
    panicked: AtomicU64,
}

// =============================================================================
// TaskHandle
// =============================================================================

/// Handle to a submitted task's result.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: Receiver<thread::Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task finishes and returns its result.
    ///
    /// # Errors
    ///
    /// Returns `TaskPanicked` if the task panicked, or `PoolShutdown` if the
    /// task was dropped without running.
    pub fn wait(self) -> Result<T> {
        match self.rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(Error::new(ErrorKind::TaskPanicked(panic_message(
                payload.as_ref(),
            )))),
            Err(_) => Err(Error::new(ErrorKind::PoolShutdown)),
        }
    }

    /// Returns true if the result is available without blocking.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.rx.is_empty()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// =============================================================================
// WorkerPool
// =============================================================================

/// Counter snapshot for a [`WorkerPool`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Tasks that ran to completion or panicked.
    pub completed: u64,
    /// Tasks that panicked.
    pub panicked: u64,
    /// Tasks waiting in the queue.
    pub pending: usize,
}

/// A fixed set of worker threads.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    threads: usize,
}

impl WorkerPool {
    /// Starts `threads` workers.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for zero threads, or `Internal` if a thread
    /// cannot be spawned.
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(Error::invalid_config("worker pool needs at least one thread"));
        }

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            available: Condvar::new(),
            completed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let shared = Arc::clone(&shared);
            let worker = thread::Builder::new()
                .name(format!("quiver-worker-{i}"))
                .spawn(move || worker_loop(&shared))
                .map_err(|e| Error::internal(format!("failed to spawn worker: {e}")))?;
            workers.push(worker);
        }

        info!(threads, "worker pool started");
        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            threads,
        })
    }

    /// Queues a task.
    ///
    /// # Errors
    ///
    /// Returns `PoolShutdown` once the pool has been shut down.
    pub fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx): (Sender<thread::Result<T>>, _) = crossbeam_channel::bounded(1);
        let shared = Arc::clone(&self.shared);
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(task));
            if result.is_err() {
                shared.panicked.fetch_add(1, Ordering::Relaxed);
            }
            shared.completed.fetch_add(1, Ordering::Relaxed);
            // The caller may have dropped the handle.
            let _ = tx.send(result);
        });

        let mut queue = self.shared.queue.lock();
        if queue.stopping {
            return Err(Error::new(ErrorKind::PoolShutdown));
        }
        queue.jobs.push_back(job);
        drop(queue);
        self.shared.available.notify_one();
        Ok(TaskHandle { rx })
    }

    /// Runs every task and waits for all of them (fork-join).
    ///
    /// Results come back in submission order.
    ///
    /// # Errors
    ///
    /// Returns the first failure after every task has finished.
    pub fn execute_all<F, T>(&self, tasks: impl IntoIterator<Item = F>) -> Result<Vec<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let handles = tasks
            .into_iter()
            .map(|task| self.submit(task))
            .collect::<Result<Vec<_>>>()?;

        let mut results = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for handle in handles {
            match handle.wait() {
                Ok(value) => results.push(value),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(results),
        }
    }

    /// Splits `items` into chunks of `chunk_size` and maps each chunk on the
    /// pool. Results come back in chunk order.
    ///
    /// # Errors
    ///
    /// As for [`execute_all`](Self::execute_all).
    pub fn map_chunks<I, R, F>(&self, items: Vec<I>, chunk_size: usize, f: F) -> Result<Vec<R>>
    where
        I: Send + 'static,
        R: Send + 'static,
        F: Fn(Vec<I>) -> R + Send + Sync + 'static,
    {
        let chunk_size = chunk_size.max(1);
        let f = Arc::new(f);
        let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size));
        let mut items = items.into_iter().peekable();
        while items.peek().is_some() {
            chunks.push(items.by_ref().take(chunk_size).collect::<Vec<_>>());
        }
        debug!(chunks = chunks.len(), chunk_size, "mapping chunks");

        self.execute_all(chunks.into_iter().map(|chunk| {
            let f = Arc::clone(&f);
            move || (*f)(chunk)
        }))
    }

    /// Stops accepting work, drains the queue, and joins every worker.
    ///
    /// Calling it again is a no-op.
    pub fn shutdown(&self) {
        self.shared.queue.lock().stopping = true;
        self.shared.available.notify_all();

        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }
        let current = thread::current().id();
        for worker in workers {
            // A task may drop the last owner of the pool on its own worker.
            if worker.thread().id() == current {
                continue;
            }
            // Workers catch task panics, so a join error is unexpected.
            let _ = worker.join();
        }
        info!(threads = self.threads, "worker pool shut down");
    }

    /// Returns true once shutdown has begun.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.queue.lock().stopping
    }

    /// Returns the number of worker threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads
    }

    /// Returns the number of queued tasks not yet picked up.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().jobs.len()
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            completed: self.shared.completed.load(Ordering::Relaxed),
            panicked: self.shared.panicked.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    break Some(job);
                }
                if queue.stopping {
                    break None;
                }
                shared.available.wait(&mut queue);
            }
        };
        match job {
            Some(job) => job(),
            None => return,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .field("stats", &self.stats())
            .finish()
    }
}
