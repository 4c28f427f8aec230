//! Per-method completion counters.
//!
//! One `MethodMetrics` is shared (behind an `Arc`) by every context created for the same method,
//! so all counters are plain atomics updated without locking.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time;

/// Counters for the calls of one RPC method.
#[derive(Debug)]
pub struct MethodMetrics {
    method: String,
    successes: AtomicU64,
    failures: AtomicU64,
    transmit_failures: AtomicU64,
    total_latency_us: AtomicU64,
    max_latency_us: AtomicU64,
}

/// A point-in-time copy of a [`MethodMetrics`](struct.MethodMetrics.html).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MetricsSnapshot {
    /// Calls completed with a success response.
    pub successes: u64,
    /// Calls completed with an error envelope.
    pub failures: u64,
    /// Completions whose response could not be handed to the connection.
    pub transmit_failures: u64,
    /// Sum of the handler latencies of all completed calls, in microseconds.
    pub total_latency_us: u64,
    /// Largest handler latency seen, in microseconds.
    pub max_latency_us: u64,
}

impl MetricsSnapshot {
    /// All completed calls, successful or not.
    pub fn completed(&self) -> u64 {
        self.successes + self.failures
    }

    /// Mean handler latency in microseconds, or zero when nothing has completed.
    pub fn mean_latency_us(&self) -> u64 {
        match self.completed() {
            0 => 0,
            completed => self.total_latency_us / completed,
        }
    }
}

impl MethodMetrics {
    /// Creates zeroed counters for `method`.
    pub fn new<S>(method: S) -> Self
    where
        S: Into<String>,
    {
        MethodMetrics {
            method: method.into(),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            transmit_failures: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            max_latency_us: AtomicU64::new(0),
        }
    }

    /// The fully qualified name of the method these counters belong to.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Counts a call that completed successfully after `latency`.
    pub fn record_success(&self, latency: time::Duration) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    /// Counts a call that completed with an error after `latency`.
    pub fn record_failure(&self, latency: time::Duration) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    /// Counts a response that could not be handed to the connection.
    pub fn record_transmit_failure(&self) {
        self.transmit_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters.
    ///
    /// Counters are read one at a time, so a snapshot taken while calls complete may mix values
    /// from before and after a completion.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            transmit_failures: self.transmit_failures.load(Ordering::Relaxed),
            total_latency_us: self.total_latency_us.load(Ordering::Relaxed),
            max_latency_us: self.max_latency_us.load(Ordering::Relaxed),
        }
    }

    fn record_latency(&self, latency: time::Duration) {
        let micros = latency.as_micros().min(u128::from(u64::MAX)) as u64;
        self.total_latency_us.fetch_add(micros, Ordering::Relaxed);
        self.max_latency_us.fetch_max(micros, Ordering::Relaxed);
    }
}
