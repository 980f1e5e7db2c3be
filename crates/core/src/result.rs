//! Outcome of one remote call.

use crate::remote::RemoteError;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Immutable record of a completed remote call.
///
/// A failed call is still a result: `outcome` holds the failure instead of a
/// payload, and its latency (time to failure) counts toward window statistics.
#[derive(Debug, Clone)]
pub struct RequestResult {
    /// Sequence number assigned when the INVOKE was dispatched.
    pub request_id: u64,
    /// Method that was invoked.
    pub method: String,
    /// Payload on success, failure detail otherwise.
    pub outcome: Result<Value, RemoteError>,
    /// Monotonic completion time.
    pub completed_at: Instant,
    /// Time from task start to completion.
    pub latency: Duration,
}

impl RequestResult {
    pub fn new(
        request_id: u64,
        method: impl Into<String>,
        outcome: Result<Value, RemoteError>,
        completed_at: Instant,
        latency: Duration,
    ) -> Self {
        Self {
            request_id,
            method: method.into(),
            outcome,
            completed_at,
            latency,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Payload, if the call succeeded.
    pub fn response(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    /// Failure detail, if the call failed.
    pub fn error(&self) -> Option<&RemoteError> {
        self.outcome.as_ref().err()
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_accessors() {
        let result = RequestResult::new(
            1,
            "getBalance",
            Ok(json!({ "value": 5 })),
            Instant::now(),
            Duration::from_millis(12),
        );
        assert!(result.is_success());
        assert_eq!(result.response().unwrap()["value"], 5);
        assert!(result.error().is_none());
        assert!((result.latency_ms() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_failure_accessors() {
        let result = RequestResult::new(
            2,
            "getBalance",
            Err(RemoteError::Transport("connection refused".into())),
            Instant::now(),
            Duration::from_millis(3),
        );
        assert!(!result.is_success());
        assert!(result.response().is_none());
        assert_eq!(
            result.error(),
            Some(&RemoteError::Transport("connection refused".into()))
        );
    }
}
