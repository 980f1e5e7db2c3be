//! Configuration types for a dispatcher run.

use rpcpulse_core::{DispatcherConfig, Event, RemoteCall};
use serde_json::{json, Value};
use std::time::Duration;

/// Public Solana mainnet JSON-RPC endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.mainnet-beta.solana.com";

/// Account queried by the default `getBalance` call.
pub const DEFAULT_ACCOUNT: &str = "GPNmU6ShynWA6zoDLbb5uN1gbPqFgp1eB2pDSCnZaeo6";

/// Default method for INVOKE events.
pub const DEFAULT_METHOD: &str = "getBalance";

/// Configuration for one scripted run against a JSON-RPC endpoint.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// JSON-RPC endpoint URL.
    pub endpoint: String,

    /// Call performed by every INVOKE.
    pub call: RemoteCall,

    /// Number of worker threads.
    pub workers: usize,

    /// Span of the rolling latency window.
    pub latency_window: Duration,

    /// Per-request HTTP timeout.
    pub request_timeout: Duration,

    /// Event script replayed in order.
    pub events: Vec<Event>,

    /// Times the script is replayed.
    pub repeat: usize,

    /// Pause between consecutive events.
    pub event_interval: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            call: RemoteCall::new(DEFAULT_METHOD, default_params()),
            workers: 4,
            latency_window: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            events: vec![Event::Invoke, Event::Error, Event::Nothing, Event::Invoke],
            repeat: 1,
            event_interval: Duration::ZERO,
        }
    }
}

/// Params of the default `getBalance` call.
pub fn default_params() -> Value {
    json!([DEFAULT_ACCOUNT])
}

/// Parse a comma-separated event script such as `invoke,error,nothing`.
pub fn parse_event_script(script: &str) -> Result<Vec<Event>, ConfigError> {
    script
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Event>().map_err(ConfigError::InvalidEvent))
        .collect()
}

impl RunConfig {
    /// Create a configuration for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the call performed by INVOKE events.
    pub fn with_call(mut self, call: RemoteCall) -> Self {
        self.call = call;
        self
    }

    /// Set the number of worker threads.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the rolling latency window.
    pub fn with_latency_window(mut self, window: Duration) -> Self {
        self.latency_window = window;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the event script.
    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.events = events;
        self
    }

    /// Set how many times the script is replayed.
    pub fn with_repeat(mut self, repeat: usize) -> Self {
        self.repeat = repeat;
        self
    }

    /// Set the pause between events.
    pub fn with_event_interval(mut self, interval: Duration) -> Self {
        self.event_interval = interval;
        self
    }

    /// Number of INVOKE events the full run dispatches.
    pub fn invoke_count(&self) -> usize {
        self.events.iter().filter(|e| **e == Event::Invoke).count() * self.repeat
    }

    /// Dispatcher settings derived from this run.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::default()
            .with_workers(self.workers)
            .with_latency_window(self.latency_window)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::NoEndpoint);
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ConfigError::InvalidEndpoint(self.endpoint.clone()));
        }
        if self.call.method.is_empty() {
            return Err(ConfigError::EmptyMethod);
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkers);
        }
        if self.latency_window.is_zero() {
            return Err(ConfigError::InvalidWindow);
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.events.is_empty() || self.repeat == 0 {
            return Err(ConfigError::EmptyScript);
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No RPC endpoint configured")]
    NoEndpoint,

    #[error("Endpoint must be an http(s) URL: {0}")]
    InvalidEndpoint(String),

    #[error("Method name must not be empty")]
    EmptyMethod,

    #[error("Worker count must be at least 1")]
    InvalidWorkers,

    #[error("Latency window must be non-zero")]
    InvalidWindow,

    #[error("Request timeout must be non-zero")]
    InvalidTimeout,

    #[error("Event script is empty")]
    EmptyScript,

    #[error("{0}")]
    InvalidEvent(String),

    #[error("Invalid params JSON: {0}")]
    InvalidParams(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.call.method, "getBalance");
        assert_eq!(config.call.params, json!([DEFAULT_ACCOUNT]));
        assert_eq!(config.invoke_count(), 2);
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            RunConfig::new("").validate(),
            Err(ConfigError::NoEndpoint)
        ));
        assert!(matches!(
            RunConfig::new("localhost:8899").validate(),
            Err(ConfigError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            RunConfig::default().with_workers(0).validate(),
            Err(ConfigError::InvalidWorkers)
        ));
        assert!(matches!(
            RunConfig::default()
                .with_latency_window(Duration::ZERO)
                .validate(),
            Err(ConfigError::InvalidWindow)
        ));
        assert!(matches!(
            RunConfig::default()
                .with_request_timeout(Duration::ZERO)
                .validate(),
            Err(ConfigError::InvalidTimeout)
        ));
        assert!(matches!(
            RunConfig::default().with_events(vec![]).validate(),
            Err(ConfigError::EmptyScript)
        ));
        assert!(matches!(
            RunConfig::default().with_repeat(0).validate(),
            Err(ConfigError::EmptyScript)
        ));
        assert!(matches!(
            RunConfig::default()
                .with_call(RemoteCall::new("", Value::Null))
                .validate(),
            Err(ConfigError::EmptyMethod)
        ));
    }

    #[test]
    fn test_parse_event_script() {
        let events = parse_event_script("invoke, ERROR,nothing,,invoke").unwrap();
        assert_eq!(
            events,
            vec![Event::Invoke, Event::Error, Event::Nothing, Event::Invoke]
        );
        assert!(matches!(
            parse_event_script("invoke,explode"),
            Err(ConfigError::InvalidEvent(_))
        ));
    }

    #[test]
    fn test_invoke_count_scales_with_repeat() {
        let config = RunConfig::default()
            .with_events(vec![Event::Invoke, Event::Nothing, Event::Invoke, Event::Invoke])
            .with_repeat(5);
        assert_eq!(config.invoke_count(), 15);
    }

    #[test]
    fn test_dispatcher_config_carries_settings() {
        let config = RunConfig::default()
            .with_workers(3)
            .with_latency_window(Duration::from_secs(5));
        let dispatcher = config.dispatcher_config();
        assert_eq!(dispatcher.pool.workers, 3);
        assert_eq!(dispatcher.latency_window, Duration::from_secs(5));
    }
}
