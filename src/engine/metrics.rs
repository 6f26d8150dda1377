// src/engine/metrics.rs
//! Request metrics accumulation for a pagination run.
//!
//! Counters only ever increase for the lifetime of one run; snapshots
//! are immutable point-in-time reads computed on demand.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Elapsed times shorter than this are treated as zero when deriving
/// throughput, so a sub-millisecond first sample never produces an
/// infinite or NaN rate.
const MIN_MEASURABLE_ELAPSED: Duration = Duration::from_millis(1);

/// Outcome of a single fetch attempt.
#[derive(Debug, Clone, Copy)]
pub struct RequestOutcome {
    pub success: bool,
    /// Result items returned by a successful attempt; 0 on failure.
    pub items: usize,
    pub duration: Duration,
}

impl RequestOutcome {
    pub fn success(items: usize, duration: Duration) -> Self {
        Self {
            success: true,
            items,
            duration,
        }
    }

    pub fn failure(duration: Duration) -> Self {
        Self {
            success: false,
            items: 0,
            duration,
        }
    }
}

/// Immutable point-in-time view of the accumulated metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub request_count: u64,
    pub total_duration: Duration,
    pub average_duration: Duration,
    pub error_count: u64,
    /// Counts result items, not requests — a deliberate asymmetry with
    /// `error_count` so throughput reflects data volume.
    pub success_count: u64,
    /// Requests per second over the run's wall-clock lifetime.
    pub throughput: f64,
    pub timestamp: DateTime<Utc>,
}

/// Accumulates fetch outcomes into monotone counters.
#[derive(Debug)]
pub struct MetricsAggregator {
    request_count: u64,
    total_duration: Duration,
    error_count: u64,
    success_count: u64,
    start_time: Instant,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            request_count: 0,
            total_duration: Duration::ZERO,
            error_count: 0,
            success_count: 0,
            start_time: Instant::now(),
        }
    }

    /// Records one attempt. Every attempt counts toward `request_count`;
    /// a success adds its item count, a failure adds one error.
    pub fn add(&mut self, outcome: RequestOutcome) {
        self.request_count += 1;
        self.total_duration += outcome.duration;
        if outcome.success {
            self.success_count += outcome.items as u64;
        } else {
            self.error_count += 1;
        }
    }

    /// Derives an immutable snapshot of the current counters.
    ///
    /// Both derived rates guard the zero denominator: with no requests
    /// the average is zero, and with near-zero elapsed time the throughput
    /// is zero rather than infinite.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let average_duration = if self.request_count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.request_count as u32
        };

        let elapsed = self.start_time.elapsed();
        let throughput = if elapsed < MIN_MEASURABLE_ELAPSED {
            0.0
        } else {
            self.request_count as f64 / elapsed.as_secs_f64()
        };

        MetricsSnapshot {
            request_count: self.request_count,
            total_duration: self.total_duration,
            average_duration,
            error_count: self.error_count,
            success_count: self.success_count,
            throughput,
            timestamp: Utc::now(),
        }
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}
