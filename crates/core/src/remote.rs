//! Contract for the remote call performed by every INVOKE task.
//!
//! The dispatcher knows nothing about the transport behind a call. Anything
//! that can turn a method name plus parameters into a JSON payload, or fail
//! with a [`RemoteError`], can be plugged in. Closures implement the trait
//! directly, which keeps test stubs to one line.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Why a remote call did not complete.
///
/// Every variant is treated the same way by the dispatcher: the call becomes a
/// failed [`RequestResult`](crate::RequestResult) and still counts as a latency
/// sample.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The call never got a response: connect failure, timeout, DNS.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A response arrived but could not be accepted: non-success status,
    /// undecodable body, or an error object from the remote side.
    #[error("malformed response: {0}")]
    Protocol(String),

    /// The procedure panicked while running on a worker.
    #[error("remote procedure panicked: {0}")]
    Panicked(String),
}

impl RemoteError {
    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteError::Transport(_) => "transport",
            RemoteError::Protocol(_) => "protocol",
            RemoteError::Panicked(_) => "panicked",
        }
    }
}

/// Synchronous remote procedure invoked from a worker thread.
///
/// Implementations may block on I/O for as long as the call takes. No lock of
/// the dispatcher is held while `invoke` runs.
pub trait RemoteProcedure: Send + Sync + 'static {
    fn invoke(&self, method: &str, params: &Value) -> Result<Value, RemoteError>;
}

impl<F> RemoteProcedure for F
where
    F: Fn(&str, &Value) -> Result<Value, RemoteError> + Send + Sync + 'static,
{
    fn invoke(&self, method: &str, params: &Value) -> Result<Value, RemoteError> {
        self(method, params)
    }
}

/// Method and parameters sent on every INVOKE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCall {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RemoteCall {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}
