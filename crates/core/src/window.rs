//! Rolling time window of call latencies.
//!
//! Keeps the `(completed_at, latency)` pairs of recent calls ordered by
//! completion time together with a running sum and sum of squares, so the
//! mean and standard deviation are O(1) to read. Samples normally arrive in
//! completion order and are appended in O(1); a sample that completed before
//! the newest retained one is inserted at its place, walking back from the tail.
//!
//! Eviction is lazy: expired samples are dropped only when a new sample is
//! recorded, never by a timer. A reader that only calls [`LatencyWindow::std_dev`]
//! between recordings keeps seeing samples that have aged out.
//!
//! Sums are kept in integer nanoseconds so that subtracting an evicted sample
//! restores them exactly. Latencies above [`MAX_SAMPLE_LATENCY`] are clamped
//! to it.

use crate::clock::{Clock, SystemClock};
use crate::metrics;
use crate::result::RequestResult;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Largest latency a single sample contributes.
pub const MAX_SAMPLE_LATENCY: Duration = Duration::from_secs(24 * 60 * 60);

const NANOS_PER_MS: f64 = 1_000_000.0;

/// Point-in-time view of the window statistics. Values in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySnapshot {
    /// Samples currently retained.
    pub samples: usize,
    /// Mean latency (ms), 0 when empty.
    pub mean_ms: f64,
    /// Population standard deviation (ms), 0 when empty.
    pub std_dev_ms: f64,
}

#[derive(Debug, Default)]
struct WindowState {
    /// (completed_at, latency in ns), sorted by `completed_at`, oldest first.
    samples: VecDeque<(Instant, u64)>,
    sum_ns: u128,
    sum_sq_ns: u128,
}

impl WindowState {
    /// Insert keeping `samples` sorted; equal timestamps keep arrival order.
    fn insert(&mut self, completed_at: Instant, latency_ns: u64) {
        let mut index = self.samples.len();
        while index > 0 && self.samples[index - 1].0 > completed_at {
            index -= 1;
        }
        self.samples.insert(index, (completed_at, latency_ns));

        let v = latency_ns as u128;
        self.sum_ns += v;
        self.sum_sq_ns += v * v;
    }

    /// Drop every sample strictly older than `now - window`.
    fn evict(&mut self, now: Instant, window: Duration) -> usize {
        let mut evicted = 0;
        while let Some(&(completed_at, latency_ns)) = self.samples.front() {
            if now.saturating_duration_since(completed_at) <= window {
                break;
            }
            let v = latency_ns as u128;
            self.sum_ns -= v;
            self.sum_sq_ns -= v * v;
            self.samples.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Mean in ns.
    fn mean_ns(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.sum_ns as f64 / self.samples.len() as f64
    }

    /// Population standard deviation in ns.
    fn std_dev_ns(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let n = self.samples.len() as u128;

        // n * sum(x^2) - sum(x)^2 is exact and never negative while it fits.
        let exact = n
            .checked_mul(self.sum_sq_ns)
            .zip(self.sum_ns.checked_mul(self.sum_ns))
            .map(|(scaled_sq, sq_of_sum)| scaled_sq - sq_of_sum);
        match exact {
            Some(numerator) => {
                let n = n as f64;
                (numerator as f64 / (n * n)).sqrt()
            }
            None => {
                let n = n as f64;
                let mean = self.sum_ns as f64 / n;
                let mean_of_squares = self.sum_sq_ns as f64 / n;
                // Rounding can push the difference a hair below zero.
                (mean_of_squares - mean * mean).max(0.0).sqrt()
            }
        }
    }
}

/// Thread-safe rolling latency statistics over the last `window` of time.
pub struct LatencyWindow {
    window: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<WindowState>,
}

impl LatencyWindow {
    /// Window over `window` of wall time, read from the system clock.
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    /// Window driven by an explicit clock.
    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// Record the latency of `result`, then evict expired samples.
    pub fn record(&self, result: &RequestResult) {
        self.record_sample(result.completed_at, result.latency);
    }

    /// Record a raw sample, then evict everything older than `now - window`.
    ///
    /// Samples may arrive out of completion order; one that is already older
    /// than the window is evicted by this same call.
    pub fn record_sample(&self, completed_at: Instant, latency: Duration) {
        if latency > MAX_SAMPLE_LATENCY {
            warn!(
                latency_ms = latency.as_millis() as u64,
                "Latency sample clamped to {:?}",
                MAX_SAMPLE_LATENCY
            );
        }
        // Fits in u64 after clamping.
        let latency_ns = latency.min(MAX_SAMPLE_LATENCY).as_nanos() as u64;
        let now = self.clock.now();

        let (samples, std_dev_ns, evicted) = {
            let mut state = self.state.lock();
            state.insert(completed_at, latency_ns);
            let evicted = state.evict(now, self.window);
            (state.samples.len(), state.std_dev_ns(), evicted)
        };

        metrics::set_window_stats(samples, std_dev_ns / NANOS_PER_MS);
        trace!(
            latency_ns,
            samples,
            evicted,
            "Recorded latency sample"
        );
    }

    /// Population standard deviation of retained latencies (ms). 0 when empty.
    pub fn std_dev(&self) -> f64 {
        self.state.lock().std_dev_ns() / NANOS_PER_MS
    }

    /// Mean of retained latencies (ms). 0 when empty.
    pub fn mean(&self) -> f64 {
        self.state.lock().mean_ns() / NANOS_PER_MS
    }

    /// Consistent view of count, mean and standard deviation.
    pub fn snapshot(&self) -> LatencySnapshot {
        let state = self.state.lock();
        LatencySnapshot {
            samples: state.samples.len(),
            mean_ms: state.mean_ns() / NANOS_PER_MS,
            std_dev_ms: state.std_dev_ns() / NANOS_PER_MS,
        }
    }

    /// Samples retained as of the last recording.
    pub fn len(&self) -> usize {
        self.state.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().samples.is_empty()
    }
}

impl std::fmt::Debug for LatencyWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyWindow")
            .field("window", &self.window)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn manual_window(window: Duration) -> (LatencyWindow, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (LatencyWindow::with_clock(window, clock.clone()), clock)
    }

    /// Record a sample completing at `t` with the clock moved to `t`.
    fn record_at(window: &LatencyWindow, clock: &ManualClock, t: Duration, latency: Duration) {
        clock.set(t);
        window.record_sample(clock.at(t), latency);
    }

    #[test]
    fn test_empty_window_reports_zero() {
        let window = LatencyWindow::new(Duration::from_secs(1));
        assert!(window.is_empty());
        assert_eq!(window.std_dev(), 0.0);
        assert_eq!(window.mean(), 0.0);
        assert_eq!(
            window.snapshot(),
            LatencySnapshot {
                samples: 0,
                mean_ms: 0.0,
                std_dev_ms: 0.0
            }
        );
    }

    #[test]
    fn test_single_sample_has_zero_std_dev() {
        let (window, clock) = manual_window(Duration::from_secs(1));
        record_at(&window, &clock, Duration::ZERO, ms(100));
        assert_eq!(window.len(), 1);
        assert_eq!(window.mean(), 100.0);
        assert_eq!(window.std_dev(), 0.0);
    }

    #[test]
    fn test_population_std_dev() {
        let (window, clock) = manual_window(Duration::from_secs(60));
        for latency in [2, 4, 4, 4, 5, 5, 7, 9] {
            record_at(&window, &clock, Duration::ZERO, ms(latency));
        }
        // Classic example: mean 5, population sd 2.
        assert!((window.mean() - 5.0).abs() < 1e-9);
        assert!((window.std_dev() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_expired_samples_evicted_on_record() {
        let (window, clock) = manual_window(Duration::from_secs(1));
        record_at(&window, &clock, Duration::ZERO, ms(100));
        record_at(&window, &clock, ms(500), ms(100));
        assert_eq!(window.len(), 2);

        record_at(&window, &clock, ms(1600), ms(100));
        assert_eq!(window.len(), 1);
        assert_eq!(window.std_dev(), 0.0);
        assert_eq!(window.mean(), 100.0);
    }

    #[test]
    fn test_sample_exactly_at_boundary_is_kept() {
        let (window, clock) = manual_window(Duration::from_secs(1));
        record_at(&window, &clock, Duration::ZERO, ms(10));
        record_at(&window, &clock, Duration::from_secs(1), ms(30));
        assert_eq!(window.len(), 2);
        assert!((window.mean() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_eviction_is_lazy() {
        let (window, clock) = manual_window(Duration::from_secs(1));
        record_at(&window, &clock, Duration::ZERO, ms(10));
        record_at(&window, &clock, ms(100), ms(30));

        // Time passes but nothing is recorded: stale samples still count.
        clock.advance(Duration::from_secs(10));
        assert_eq!(window.len(), 2);
        assert!((window.std_dev() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_sums_return_to_zero_after_full_eviction() {
        let (window, clock) = manual_window(ms(100));
        for i in 0..50u64 {
            record_at(&window, &clock, ms(i), ms(i * 7 + 1));
        }
        record_at(&window, &clock, Duration::from_secs(10), ms(42));

        let state = window.state.lock();
        assert_eq!(state.samples.len(), 1);
        assert_eq!(state.sum_ns, 42_000_000);
        assert_eq!(state.sum_sq_ns, 42_000_000 * 42_000_000);
    }

    #[test]
    fn test_near_identical_samples_never_negative() {
        let (window, clock) = manual_window(Duration::from_secs(3600));
        for i in 0..1000u64 {
            let latency = Duration::from_micros(987_654_321 + (i % 2));
            record_at(&window, &clock, Duration::ZERO, latency);
        }
        let sd = window.std_dev();
        assert!(sd >= 0.0);
        assert!(sd.is_finite());
    }

    #[test]
    fn test_late_sample_behind_newer_one_is_evicted() {
        let (window, clock) = manual_window(Duration::from_secs(1));
        record_at(&window, &clock, Duration::from_secs(2), ms(100));

        // Completed at t=0.5s but recorded at t=2s: already outside the window.
        let late = RequestResult::new(
            7,
            "getBalance",
            Ok(serde_json::Value::Null),
            clock.at(ms(500)),
            ms(400),
        );
        window.record(&late);
        assert_eq!(window.len(), 1);

        record_at(&window, &clock, ms(2900), ms(100));
        assert_eq!(window.len(), 2);
        assert_eq!(window.std_dev(), 0.0);
        assert_eq!(window.mean(), 100.0);
    }

    #[test]
    fn test_out_of_order_samples_kept_sorted() {
        let (window, clock) = manual_window(Duration::from_secs(1));
        clock.set(ms(300));
        for (at, latency) in [(300, 30), (100, 10), (200, 20), (100, 11)] {
            window.record_sample(clock.at(ms(at)), ms(latency));
        }

        let order: Vec<u64> = window
            .state
            .lock()
            .samples
            .iter()
            .map(|(_, ns)| ns / 1_000_000)
            .collect();
        assert_eq!(order, vec![10, 11, 20, 30]);

        // t=1.15s evicts both t=0.1s samples and nothing else.
        record_at(&window, &clock, ms(1150), ms(40));
        assert_eq!(window.len(), 3);
        assert!((window.mean() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_sub_microsecond_latency_counts() {
        let (window, clock) = manual_window(Duration::from_secs(1));
        record_at(&window, &clock, Duration::ZERO, Duration::from_nanos(400));
        record_at(&window, &clock, Duration::ZERO, Duration::from_nanos(600));
        assert!((window.mean() - 0.0005).abs() < 1e-12);
        assert!((window.std_dev() - 0.0001).abs() < 1e-12);
    }

    #[test]
    fn test_huge_latency_is_clamped() {
        let (window, clock) = manual_window(Duration::from_secs(1));
        record_at(&window, &clock, Duration::ZERO, Duration::MAX);
        let expected_ms = MAX_SAMPLE_LATENCY.as_secs_f64() * 1000.0;
        assert!((window.mean() - expected_ms).abs() < 1e-6);
        assert_eq!(window.std_dev(), 0.0);
    }
}
