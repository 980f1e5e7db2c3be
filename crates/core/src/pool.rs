//! Fixed-size worker pool fed by a [`BlockingQueue`].
//!
//! Each worker runs the same loop: block on the shared queue, run the task it
//! dequeued, repeat. Shutdown is signalled in-band with one `Job::Stop` per
//! worker rather than with an empty task, so a worker never confuses "stop"
//! with a task that happens to do nothing.
//!
//! # Example
//!
//! ```
//! use rpcpulse_core::{WorkerPool, WorkerPoolConfig};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let config = WorkerPoolConfig::builder().workers(2).build().unwrap();
//! let pool = WorkerPool::new(config).unwrap();
//!
//! let counter = Arc::new(AtomicUsize::new(0));
//! let c = counter.clone();
//! pool.submit(move || {
//!     c.fetch_add(1, Ordering::SeqCst);
//! })
//! .unwrap();
//!
//! pool.shutdown();
//! assert_eq!(counter.load(Ordering::SeqCst), 1);
//! ```

use crate::metrics;
use crate::queue::BlockingQueue;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Unit of work executed by a worker.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Errors from worker pool configuration and submission.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Worker pool is shut down; submission rejected")]
    ShutDown,
}

/// Configuration for a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads. Must be at least 1.
    pub workers: usize,

    /// Stack size for each worker thread (bytes). Default: 2MB.
    pub stack_size: usize,

    /// Thread name prefix; workers are named `<prefix>-<index>`.
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::auto()
    }
}

impl WorkerPoolConfig {
    /// One worker per available core.
    pub fn auto() -> Self {
        let available = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(4);

        Self::with_workers(available)
    }

    /// Configuration with an explicit worker count and default thread settings.
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            stack_size: 2 * 1024 * 1024, // 2MB
            thread_name: "rpc-worker".to_string(),
        }
    }

    /// A single worker, mostly for tests.
    pub fn minimal() -> Self {
        Self::with_workers(1)
    }

    /// Create a builder for custom configuration.
    pub fn builder() -> WorkerPoolConfigBuilder {
        WorkerPoolConfigBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.workers == 0 {
            return Err(PoolError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.stack_size == 0 {
            return Err(PoolError::InvalidConfig(
                "stack_size must be greater than 0".to_string(),
            ));
        }
        if self.thread_name.is_empty() {
            return Err(PoolError::InvalidConfig(
                "thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`WorkerPoolConfig`].
#[derive(Debug, Clone)]
pub struct WorkerPoolConfigBuilder {
    config: WorkerPoolConfig,
}

impl WorkerPoolConfigBuilder {
    /// Create a new builder with auto-detected defaults.
    pub fn new() -> Self {
        Self {
            config: WorkerPoolConfig::auto(),
        }
    }

    /// Set the number of worker threads.
    pub fn workers(mut self, count: usize) -> Self {
        self.config.workers = count;
        self
    }

    /// Set the stack size of each worker thread.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = size;
        self
    }

    /// Set the worker thread name prefix.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Build the configuration, validating it first.
    pub fn build(self) -> Result<WorkerPoolConfig, PoolError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for WorkerPoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue element: either work or the per-worker stop signal.
enum Job {
    Run(Task),
    Stop,
}

/// Fixed set of worker threads draining a shared task queue.
///
/// Submissions and the stop signal pass through one gate: a task accepted by
/// [`submit`](Self::submit) is always enqueued ahead of every stop signal, so
/// it runs before the workers exit. After shutdown starts, `submit` returns
/// [`PoolError::ShutDown`].
///
/// A panicking task is contained inside the worker: it is logged, counted and
/// the worker moves on to the next task.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    queue: Arc<BlockingQueue<Job>>,
    /// `true` while submissions are accepted.
    accepting: RwLock<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    /// Accepted tasks not yet finished (queued + running).
    pending: Arc<AtomicUsize>,
    panicked: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Start `config.workers` threads immediately.
    pub fn new(config: WorkerPoolConfig) -> Result<Self, PoolError> {
        config.validate()?;

        let pool = Self {
            queue: Arc::new(BlockingQueue::new()),
            accepting: RwLock::new(true),
            handles: Mutex::new(Vec::with_capacity(config.workers)),
            pending: Arc::new(AtomicUsize::new(0)),
            panicked: Arc::new(AtomicU64::new(0)),
            config,
        };

        for index in 0..pool.config.workers {
            let queue = pool.queue.clone();
            let pending = pool.pending.clone();
            let panicked = pool.panicked.clone();

            let spawned = thread::Builder::new()
                .name(format!("{}-{}", pool.config.thread_name, index))
                .stack_size(pool.config.stack_size)
                .spawn(move || worker_loop(index, &queue, &pending, &panicked));

            match spawned {
                Ok(handle) => pool.handles.lock().push(handle),
                Err(e) => {
                    warn!(worker = index, error = %e, "Failed to spawn worker, tearing pool down");
                    pool.stop_spawned();
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        info!(
            workers = pool.config.workers,
            thread_name = %pool.config.thread_name,
            "Worker pool started"
        );

        Ok(pool)
    }

    /// Enqueue `task` to run exactly once on some worker.
    ///
    /// Returns [`PoolError::ShutDown`] once [`shutdown`](Self::shutdown) has
    /// started; the task is dropped without running in that case.
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let accepting = self.accepting.read();
        if !*accepting {
            metrics::record_rejected_submission();
            return Err(PoolError::ShutDown);
        }

        let depth = self.pending.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::set_pool_queue_depth(depth);
        self.queue.enqueue(Job::Run(Box::new(task)));
        Ok(())
    }

    /// Stop accepting work, wake every worker with a stop signal and join them.
    ///
    /// Tasks accepted before this call still run. Blocks until every worker
    /// thread has exited; calling it again is a no-op once that has happened.
    /// Must not be called from inside a task running on this pool.
    pub fn shutdown(&self) {
        {
            let mut accepting = self.accepting.write();
            if *accepting {
                *accepting = false;
                for _ in 0..self.config.workers {
                    self.queue.enqueue(Job::Stop);
                }
                debug!(workers = self.config.workers, "Worker pool shutting down");
            }
        }

        // Held across the joins so a concurrent caller also waits for them.
        let mut handles = self.handles.lock();
        let joined = handles.len();
        for handle in handles.drain(..) {
            if handle.join().is_err() {
                warn!("Worker thread exited abnormally");
            }
        }
        if joined > 0 {
            info!(
                workers = joined,
                panicked_tasks = self.panicked_tasks(),
                "Worker pool stopped"
            );
        }
    }

    /// Stop whatever workers were spawned before a failed spawn.
    fn stop_spawned(&self) {
        *self.accepting.write() = false;
        let mut handles = self.handles.lock();
        for _ in 0..handles.len() {
            self.queue.enqueue(Job::Stop);
        }
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }

    /// Whether shutdown has been initiated.
    pub fn is_shut_down(&self) -> bool {
        !*self.accepting.read()
    }

    /// Number of worker threads this pool was started with.
    pub fn workers(&self) -> usize {
        self.config.workers
    }

    /// Get the configuration.
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Accepted tasks that have not finished yet (queued or running).
    pub fn queued_tasks(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Tasks whose body panicked since the pool started.
    pub fn panicked_tasks(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    index: usize,
    queue: &BlockingQueue<Job>,
    pending: &AtomicUsize,
    panicked: &AtomicU64,
) {
    debug!(worker = index, "Worker started");

    loop {
        match queue.dequeue_blocking() {
            Job::Stop => break,
            Job::Run(task) => {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                    panicked.fetch_add(1, Ordering::Relaxed);
                    metrics::record_worker_panic();
                    error!(
                        worker = index,
                        panic = %panic_message(payload.as_ref()),
                        "Task panicked; worker continues"
                    );
                }
                let depth = pending.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
                metrics::set_pool_queue_depth(depth);
            }
        }
    }

    debug!(worker = index, "Worker stopped");
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
