//! Event dispatcher: turns events into remote calls on the worker pool.
//!
//! ```text
//! dispatch(INVOKE) ─► WorkerPool ─► RemoteProcedure::invoke
//!                                        │
//!                                        ▼
//!                                  RequestResult ─┬─► LatencyWindow::record
//!                                                 └─► ResultLedger::push
//! ```
//!
//! Consumers read the ledger and the window concurrently with the workers
//! that feed them. No dispatcher lock is held while a remote call runs, so a
//! slow call only occupies its own worker.

use crate::clock::{Clock, SystemClock};
use crate::event::Event;
use crate::ledger::ResultLedger;
use crate::metrics;
use crate::pool::{panic_message, PoolError, WorkerPool, WorkerPoolConfig};
use crate::remote::{RemoteCall, RemoteError, RemoteProcedure};
use crate::result::RequestResult;
use crate::window::{LatencySnapshot, LatencyWindow};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors from building or driving the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("INVOKE rejected: dispatcher is shut down")]
    Rejected,
}

/// Configuration for an [`EventDispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Worker pool running the remote calls.
    pub pool: WorkerPoolConfig,

    /// Length of the rolling latency window.
    pub latency_window: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pool: WorkerPoolConfig::auto(),
            latency_window: Duration::from_secs(30),
        }
    }
}

impl DispatcherConfig {
    /// Set the number of worker threads.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.pool.workers = workers;
        self
    }

    /// Replace the whole pool configuration.
    pub fn with_pool(mut self, pool: WorkerPoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Set the rolling latency window length.
    pub fn with_latency_window(mut self, window: Duration) -> Self {
        self.latency_window = window;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), DispatchError> {
        self.pool.validate()?;
        if self.latency_window.is_zero() {
            return Err(DispatchError::InvalidConfig(
                "latency_window must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// What `dispatch` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// INVOKE accepted; a result with this id will reach the ledger.
    Submitted { request_id: u64 },
    /// ERROR logged; no work scheduled.
    Reported,
    /// NOTHING.
    Ignored,
}

/// State shared by every INVOKE task.
struct InvokeContext {
    procedure: Box<dyn RemoteProcedure>,
    call: RemoteCall,
    ledger: ResultLedger,
    window: LatencyWindow,
    clock: Arc<dyn Clock>,
}

impl InvokeContext {
    /// Body of an INVOKE task. Runs on a worker thread.
    fn invoke(&self, request_id: u64) {
        let start = self.clock.now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.procedure.invoke(&self.call.method, &self.call.params)
        }))
        .unwrap_or_else(|payload| Err(RemoteError::Panicked(panic_message(payload.as_ref()))));
        let end = self.clock.now();
        let latency = end.saturating_duration_since(start);

        match &outcome {
            Ok(_) => {
                metrics::record_invocation("success", latency);
                debug!(
                    request_id,
                    method = %self.call.method,
                    latency_ms = latency.as_millis() as u64,
                    "Remote call completed"
                );
            }
            Err(e) => {
                metrics::record_invocation(e.kind(), latency);
                warn!(
                    request_id,
                    method = %self.call.method,
                    latency_ms = latency.as_millis() as u64,
                    error = %e,
                    "Remote call failed"
                );
            }
        }

        let result = RequestResult::new(request_id, self.call.method.clone(), outcome, end, latency);
        // Window first, so a consumer that has taken a result always sees it in the stats.
        self.window.record(&result);
        self.ledger.push(result);
    }
}

/// Facade that routes events to the worker pool and exposes the results.
///
/// Owns the pool, the result ledger and the latency window; nothing is global
/// except the Prometheus metrics.
pub struct EventDispatcher {
    pool: WorkerPool,
    context: Arc<InvokeContext>,
    next_request_id: AtomicU64,
}

impl EventDispatcher {
    /// Start the worker pool and return a dispatcher that sends `call`
    /// through `procedure` on every INVOKE.
    pub fn new<P>(config: DispatcherConfig, procedure: P, call: RemoteCall) -> Result<Self, DispatchError>
    where
        P: RemoteProcedure,
    {
        Self::with_clock(config, procedure, call, Arc::new(SystemClock))
    }

    /// Same as [`new`](Self::new) with an explicit clock for timestamps and
    /// window eviction.
    pub fn with_clock<P>(
        config: DispatcherConfig,
        procedure: P,
        call: RemoteCall,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DispatchError>
    where
        P: RemoteProcedure,
    {
        config.validate()?;

        let context = Arc::new(InvokeContext {
            procedure: Box::new(procedure),
            ledger: ResultLedger::new(),
            window: LatencyWindow::with_clock(config.latency_window, clock.clone()),
            clock,
            call,
        });
        let pool = WorkerPool::new(config.pool.clone())?;

        info!(
            workers = pool.workers(),
            latency_window_ms = config.latency_window.as_millis() as u64,
            method = %context.call.method,
            "Event dispatcher ready"
        );

        Ok(Self {
            pool,
            context,
            next_request_id: AtomicU64::new(1),
        })
    }

    /// Handle one event.
    ///
    /// INVOKE schedules a remote call and returns its request id; after
    /// [`shutdown`](Self::shutdown) it fails with [`DispatchError::Rejected`].
    /// ERROR is logged, NOTHING is ignored.
    pub fn dispatch(&self, event: Event) -> Result<Dispatch, DispatchError> {
        match event {
            Event::Invoke => {
                let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
                let context = self.context.clone();

                match self.pool.submit(move || context.invoke(request_id)) {
                    Ok(()) => {
                        debug!(request_id, "INVOKE submitted");
                        Ok(Dispatch::Submitted { request_id })
                    }
                    Err(PoolError::ShutDown) => {
                        warn!(request_id, "INVOKE rejected after shutdown");
                        Err(DispatchError::Rejected)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Event::Error => {
                metrics::record_error_event();
                error!("ERROR event encountered");
                Ok(Dispatch::Reported)
            }
            Event::Nothing => Ok(Dispatch::Ignored),
        }
    }

    /// Remove the oldest completed result, blocking until one exists.
    ///
    /// Waits indefinitely if no INVOKE is in flight; callers needing a bound
    /// must arrange one themselves.
    pub fn take_oldest_result(&self) -> RequestResult {
        self.context.ledger.take_oldest()
    }

    /// Remove the oldest completed result if there is one.
    pub fn try_take_oldest_result(&self) -> Option<RequestResult> {
        self.context.ledger.try_take_oldest()
    }

    /// Whether the ledger holds at least one result (best-effort snapshot).
    pub fn has_pending_results(&self) -> bool {
        !self.context.ledger.is_empty()
    }

    /// Results waiting in the ledger.
    pub fn pending_results(&self) -> usize {
        self.context.ledger.len()
    }

    /// INVOKE tasks accepted but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.pool.queued_tasks()
    }

    /// Standard deviation of latencies in the window (ms).
    pub fn latency_std_dev(&self) -> f64 {
        self.context.window.std_dev()
    }

    /// Mean latency in the window (ms).
    pub fn latency_mean(&self) -> f64 {
        self.context.window.mean()
    }

    /// Sample count, mean and standard deviation read under one lock.
    pub fn latency_snapshot(&self) -> LatencySnapshot {
        self.context.window.snapshot()
    }

    /// The call every INVOKE performs.
    pub fn call(&self) -> &RemoteCall {
        &self.context.call
    }

    /// Stop accepting INVOKEs and join the workers.
    ///
    /// INVOKEs accepted before this call still complete and land in the
    /// ledger. Results already buffered stay readable.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Whether [`shutdown`](Self::shutdown) has started.
    pub fn is_shut_down(&self) -> bool {
        self.pool.is_shut_down()
    }
}
