//! JSON-RPC driver for the rpcpulse dispatcher.
//!
//! [`JsonRpcClient`] plugs a blocking HTTP JSON-RPC 2.0 client into
//! [`rpcpulse_core::EventDispatcher`] as its remote procedure, and [`Runner`]
//! replays an event script against it, draining every result into a
//! [`RunReport`].

pub mod config;
pub mod rpc;
pub mod runner;
pub mod telemetry;

pub use config::{ConfigError, RunConfig};
pub use rpc::{parse_response, ClientError, JsonRpcClient};
pub use runner::{wait_for_ready, ResultSummary, RunError, RunReport, Runner};
pub use telemetry::{init_tracing, render_metrics, TelemetryConfig, TelemetryError};
