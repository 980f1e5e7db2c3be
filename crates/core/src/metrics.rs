//! Process-wide Prometheus metrics for the dispatcher.
//!
//! Metrics describe the invocation stream rather than individual calls.
//! Use logs for per-request detail.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Gauge, Histogram,
};
use std::sync::OnceLock;
use std::time::Duration;

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Dispatcher metrics registered in the default Prometheus registry.
pub struct Metrics {
    // === Invocations ===
    pub invocations: CounterVec,
    pub invocation_latency: Histogram,

    // === Events ===
    pub error_events: Counter,
    pub rejected_submissions: Counter,

    // === Worker Pool ===
    pub pool_queue_depth: Gauge,
    pub worker_panics: Counter,

    // === Latency Window ===
    pub window_samples: Gauge,
    pub window_std_dev: Gauge,
}

impl Metrics {
    fn new() -> Self {
        // Latency buckets: 1ms to 30s
        let latency_buckets = vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ];

        Self {
            invocations: register_counter_vec!(
                "rpcpulse_invocations_total",
                "Completed remote invocations by outcome",
                &["outcome"]
            )
            .unwrap(),

            invocation_latency: register_histogram!(
                "rpcpulse_invocation_latency_seconds",
                "Time from task start to remote call completion",
                latency_buckets
            )
            .unwrap(),

            error_events: register_counter!(
                "rpcpulse_error_events_total",
                "ERROR events received by the dispatcher"
            )
            .unwrap(),

            rejected_submissions: register_counter!(
                "rpcpulse_rejected_submissions_total",
                "Tasks rejected because the pool was shutting down"
            )
            .unwrap(),

            pool_queue_depth: register_gauge!(
                "rpcpulse_pool_queue_depth",
                "Tasks accepted by the worker pool and not yet finished"
            )
            .unwrap(),

            worker_panics: register_counter!(
                "rpcpulse_worker_panics_total",
                "Tasks whose body panicked inside a worker"
            )
            .unwrap(),

            window_samples: register_gauge!(
                "rpcpulse_latency_window_samples",
                "Samples retained by the rolling latency window"
            )
            .unwrap(),

            window_std_dev: register_gauge!(
                "rpcpulse_latency_window_stddev_ms",
                "Standard deviation of latencies in the rolling window (ms)"
            )
            .unwrap(),
        }
    }
}

/// Get or initialize the global metrics instance.
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Record a finished invocation.
///
/// `outcome` must be one of `"success"`, `"transport"`, `"protocol"`,
/// `"panicked"`. Dynamic strings would blow up label cardinality.
pub fn record_invocation(outcome: &str, latency: Duration) {
    debug_assert!(
        matches!(outcome, "success" | "transport" | "protocol" | "panicked"),
        "Unknown invocation outcome: {}",
        outcome
    );
    let m = metrics();
    m.invocations.with_label_values(&[outcome]).inc();
    m.invocation_latency.observe(latency.as_secs_f64());
}

/// Record an ERROR event.
pub fn record_error_event() {
    metrics().error_events.inc();
}

/// Record a submission rejected after shutdown.
pub fn record_rejected_submission() {
    metrics().rejected_submissions.inc();
}

/// Record a task that panicked inside a worker.
pub fn record_worker_panic() {
    metrics().worker_panics.inc();
}

/// Update the pool queue depth.
pub fn set_pool_queue_depth(depth: usize) {
    metrics().pool_queue_depth.set(depth as f64);
}

/// Update the rolling window gauges.
pub fn set_window_stats(samples: usize, std_dev_ms: f64) {
    let m = metrics();
    m.window_samples.set(samples as f64);
    m.window_std_dev.set(std_dev_ms);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        let a = metrics() as *const Metrics;
        let b = metrics() as *const Metrics;
        assert_eq!(a, b);
    }

    #[test]
    fn test_record_invocation_counts_by_outcome() {
        let before = metrics()
            .invocations
            .with_label_values(&["transport"])
            .get();
        record_invocation("transport", Duration::from_millis(5));
        let after = metrics()
            .invocations
            .with_label_values(&["transport"])
            .get();
        assert!(after >= before + 1.0);
    }
}
