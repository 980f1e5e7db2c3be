//! Scripted run: replay events through the dispatcher and drain every result.

use crate::config::{ConfigError, RunConfig};
use crate::rpc::{ClientError, JsonRpcClient};
use rpcpulse_core::{
    Dispatch, DispatchError, Event, EventDispatcher, LatencySnapshot, RemoteProcedure,
    RequestResult,
};
use serde::Serialize;
use serde_json::Value;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Poll period while waiting for the endpoint to report healthy.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Drives one [`RunConfig`] through an [`EventDispatcher`].
pub struct Runner {
    config: RunConfig,
    dispatcher: EventDispatcher,
}

impl Runner {
    /// Create a runner around an arbitrary remote procedure.
    pub fn new<P: RemoteProcedure>(config: RunConfig, procedure: P) -> Result<Self, RunError> {
        config.validate()?;
        let dispatcher =
            EventDispatcher::new(config.dispatcher_config(), procedure, config.call.clone())?;
        Ok(Self { config, dispatcher })
    }

    /// Create a runner that calls the configured JSON-RPC endpoint.
    pub fn connect(config: RunConfig) -> Result<Self, RunError> {
        config.validate()?;
        let client = JsonRpcClient::new(config.endpoint.clone(), config.request_timeout)?;
        Self::new(config, client)
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Replay the script, wait for every accepted INVOKE, then shut down.
    pub fn run(self) -> RunReport {
        let start = Instant::now();
        let mut tally = EventTally::default();

        info!(
            endpoint = %self.config.endpoint,
            method = %self.config.call.method,
            workers = self.config.workers,
            events = self.config.events.len(),
            repeat = self.config.repeat,
            "Starting run"
        );

        for round in 0..self.config.repeat {
            for event in &self.config.events {
                match self.dispatcher.dispatch(*event) {
                    Ok(Dispatch::Submitted { request_id }) => {
                        debug!(round, request_id, "INVOKE submitted");
                        tally.submitted += 1;
                    }
                    Ok(Dispatch::Reported) => tally.errors_reported += 1,
                    Ok(Dispatch::Ignored) => tally.ignored += 1,
                    Err(e) => {
                        warn!(round, event = %event, error = %e, "Dispatch rejected");
                        tally.rejected += 1;
                    }
                }

                if !self.config.event_interval.is_zero() {
                    thread::sleep(self.config.event_interval);
                }
            }
        }

        let expected = self.config.invoke_count();
        if tally.submitted != expected {
            warn!(
                expected,
                submitted = tally.submitted,
                rejected = tally.rejected,
                "Not every INVOKE was accepted"
            );
        }

        let results: Vec<ResultSummary> = (0..tally.submitted)
            .map(|_| {
                let result = self.dispatcher.take_oldest_result();
                debug!(
                    request_id = result.request_id,
                    latency_ms = result.latency_ms(),
                    success = result.is_success(),
                    "Result drained"
                );
                ResultSummary::from(&result)
            })
            .collect();

        let latency = self.dispatcher.latency_snapshot();
        self.dispatcher.shutdown();

        let succeeded = results.iter().filter(|r| r.success).count();
        let report = RunReport {
            endpoint: self.config.endpoint.clone(),
            method: self.config.call.method.clone(),
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            submitted: tally.submitted,
            succeeded,
            failed: results.len() - succeeded,
            errors_reported: tally.errors_reported,
            ignored: tally.ignored,
            rejected: tally.rejected,
            latency,
            results,
        };

        info!(
            submitted = report.submitted,
            succeeded = report.succeeded,
            failed = report.failed,
            std_dev_ms = report.latency.std_dev_ms,
            "Run complete"
        );
        report
    }
}

/// Block until `client` answers `getHealth`, or `timeout` elapses.
pub fn wait_for_ready(client: &JsonRpcClient, timeout: Duration) -> Result<(), RunError> {
    let start = Instant::now();

    while start.elapsed() < timeout {
        if client.check_health() {
            return Ok(());
        }
        thread::sleep(READY_POLL_INTERVAL);
    }

    Err(RunError::NotReady(client.endpoint().to_string()))
}

#[derive(Default)]
struct EventTally {
    submitted: usize,
    errors_reported: usize,
    ignored: usize,
    rejected: usize,
}

/// One drained result, in ledger order.
#[derive(Debug, Clone, Serialize)]
pub struct ResultSummary {
    pub request_id: u64,
    pub success: bool,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&RequestResult> for ResultSummary {
    fn from(result: &RequestResult) -> Self {
        Self {
            request_id: result.request_id,
            success: result.is_success(),
            latency_ms: result.latency_ms(),
            response: result.response().cloned(),
            error: result.error().map(ToString::to_string),
        }
    }
}

/// Report generated after a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub endpoint: String,
    pub method: String,
    /// Wall time from first dispatch to last drained result.
    pub duration_ms: f64,
    /// INVOKE events accepted by the pool.
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// ERROR events logged.
    pub errors_reported: usize,
    /// NOTHING events.
    pub ignored: usize,
    /// Events refused because the dispatcher was shut down.
    pub rejected: usize,
    /// Window statistics at the end of the run.
    pub latency: LatencySnapshot,
    /// Drained results, oldest first.
    pub results: Vec<ResultSummary>,
}

impl RunReport {
    /// Response of the first successful result in ledger order.
    pub fn oldest_response(&self) -> Option<&Value> {
        self.results.iter().find_map(|r| r.response.as_ref())
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        println!("\n=== rpcpulse Report ===");
        println!("Endpoint: {}", self.endpoint);
        println!("Method: {}", self.method);
        println!("Duration: {:.2}ms", self.duration_ms);
        println!("Invokes: {}", self.submitted);
        println!("Succeeded: {}", self.succeeded);
        println!("Failed: {}", self.failed);
        println!("Errors reported: {}", self.errors_reported);
        println!("Ignored: {}", self.ignored);
        println!("Rejected: {}", self.rejected);
        println!(
            "Latency: {} samples, mean {:.2}ms, std dev {:.2}ms",
            self.latency.samples, self.latency.mean_ms, self.latency.std_dev_ms
        );

        if !self.results.is_empty() {
            println!("\nResults (oldest first):");
            for result in &self.results {
                match &result.error {
                    None => println!("  #{:<4} {:>10.2}ms  ok", result.request_id, result.latency_ms),
                    Some(e) => println!(
                        "  #{:<4} {:>10.2}ms  {}",
                        result.request_id, result.latency_ms, e
                    ),
                }
            }
        }

        if let Some(response) = self.oldest_response() {
            println!("\nOldest response:");
            match serde_json::to_string_pretty(response) {
                Ok(pretty) => println!("{}", pretty),
                Err(_) => println!("{}", response),
            }
        }
    }
}

/// Errors that can occur while setting up a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Dispatcher error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Endpoint {0} not ready within timeout")]
    NotReady(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpcpulse_core::RemoteError;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing_test::traced_test;

    fn counting_procedure() -> impl Fn(&str, &Value) -> Result<Value, RemoteError> {
        let calls = AtomicU64::new(0);
        move |method: &str, _: &Value| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if method == "fail" {
                return Err(RemoteError::Transport("connection refused".into()));
            }
            Ok(json!({ "context": { "slot": n }, "value": 1500 }))
        }
    }

    #[test]
    #[traced_test]
    fn test_default_script_run() {
        let runner = Runner::new(RunConfig::default().with_workers(2), counting_procedure()).unwrap();
        let report = runner.run();

        assert_eq!(report.submitted, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.errors_reported, 1);
        assert_eq!(report.ignored, 1);
        assert_eq!(report.rejected, 0);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.latency.samples, 2);
        assert_eq!(report.oldest_response().unwrap()["value"], 1500);
        assert!(logs_contain("Run complete"));
    }

    #[test]
    fn test_repeat_drains_every_invoke() {
        let config = RunConfig::default()
            .with_workers(3)
            .with_events(vec![Event::Invoke, Event::Invoke, Event::Nothing])
            .with_repeat(10);
        let report = Runner::new(config, counting_procedure()).unwrap().run();

        assert_eq!(report.submitted, 20);
        assert_eq!(report.results.len(), 20);

        let mut ids: Vec<u64> = report.results.iter().map(|r| r.request_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=20).collect::<Vec<_>>());
    }

    #[test]
    fn test_failed_calls_are_reported() {
        let config = RunConfig::default()
            .with_call(rpcpulse_core::RemoteCall::new("fail", Value::Null))
            .with_events(vec![Event::Invoke]);
        let report = Runner::new(config, counting_procedure()).unwrap().run();

        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 1);
        assert!(report.oldest_response().is_none());
        let error = report.results[0].error.as_deref().unwrap();
        assert!(error.contains("connection refused"));
        assert_eq!(report.latency.samples, 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = Runner::new(RunConfig::default().with_workers(0), counting_procedure());
        assert!(matches!(
            result,
            Err(RunError::Config(ConfigError::InvalidWorkers))
        ));
    }

    #[test]
    fn test_report_serializes() {
        let report = Runner::new(RunConfig::default(), counting_procedure())
            .unwrap()
            .run();
        let encoded = serde_json::to_value(&report).unwrap();

        assert_eq!(encoded["submitted"], 2);
        assert_eq!(encoded["latency"]["samples"], 2);
        assert!(encoded["results"][0].get("error").is_none());
    }

    #[test]
    #[traced_test]
    fn test_rejected_invokes_are_flagged() {
        let runner = Runner::new(RunConfig::default(), counting_procedure()).unwrap();
        runner.dispatcher().shutdown();
        let report = runner.run();

        assert_eq!(report.submitted, 0);
        assert_eq!(report.rejected, 2);
        assert!(report.results.is_empty());
        assert!(logs_contain("Not every INVOKE was accepted"));
    }
}
