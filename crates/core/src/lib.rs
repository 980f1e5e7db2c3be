//! Concurrency core of rpcpulse.
//!
//! Typed events are dispatched onto a fixed pool of worker threads; each INVOKE
//! performs one synchronous remote call and records the outcome twice:
//!
//! - in the [`ResultLedger`], a completion-ordered FIFO consumers drain with a
//!   blocking take;
//! - in the [`LatencyWindow`], which keeps running sums over a rolling time
//!   window and derives mean and standard deviation in O(1).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ EventDispatcher                                                  │
//! │                                                                  │
//! │  dispatch(event)                                                 │
//! │    ├─ INVOKE ──► WorkerPool (N threads, BlockingQueue<Job>)      │
//! │    │               └─ RemoteProcedure::invoke (no locks held)    │
//! │    │                    └─ RequestResult ─┬─► LatencyWindow      │
//! │    │                                      └─► ResultLedger       │
//! │    ├─ ERROR ───► tracing::error!                                 │
//! │    └─ NOTHING ─► no-op                                           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use rpcpulse_core::{DispatcherConfig, Event, EventDispatcher, RemoteCall, RemoteError};
//! use serde_json::{json, Value};
//! use std::time::Duration;
//!
//! let procedure = |_: &str, _: &Value| -> Result<Value, RemoteError> { Ok(json!({ "value": 1 })) };
//! let config = DispatcherConfig::default()
//!     .with_workers(2)
//!     .with_latency_window(Duration::from_secs(30));
//!
//! let dispatcher =
//!     EventDispatcher::new(config, procedure, RemoteCall::new("getBalance", json!([]))).unwrap();
//! dispatcher.dispatch(Event::Invoke).unwrap();
//!
//! let result = dispatcher.take_oldest_result();
//! assert!(result.is_success());
//! println!("std dev: {:.2}ms", dispatcher.latency_std_dev());
//! ```

pub mod clock;
mod dispatcher;
mod event;
mod ledger;
pub mod metrics;
mod pool;
mod queue;
mod remote;
mod result;
mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{Dispatch, DispatchError, DispatcherConfig, EventDispatcher};
pub use event::Event;
pub use ledger::ResultLedger;
pub use pool::{PoolError, Task, WorkerPool, WorkerPoolConfig, WorkerPoolConfigBuilder};
pub use queue::BlockingQueue;
pub use remote::{RemoteCall, RemoteError, RemoteProcedure};
pub use result::RequestResult;
pub use window::{LatencySnapshot, LatencyWindow, MAX_SAMPLE_LATENCY};
