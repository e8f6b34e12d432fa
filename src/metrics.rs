//! Evaluation and query metrics
//!
//! Lightweight, thread-safe counters shared by every knowledge base a
//! manager owns.
//!
//! # Overview
//!
//! - Evaluation count, total time and tuples derived
//! - Query latencies with percentiles (p50, p95, p99)
//! - The most recent slow queries
//!
//! Counters are `AtomicU64`; the latency window and the slow query buffer
//! are bounded and mutex-protected.
//!
//! # Example
//!
//! ```
//! use stratalog::metrics::Metrics;
//!
//! let metrics = Metrics::new();
//! metrics.record_query("?- path(?X, ?Y).", 15);
//!
//! let stats = metrics.snapshot();
//! assert_eq!(stats.query_count, 1);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::datalog::eval::EvaluationStats;

/// Number of query latencies kept for percentile calculation.
const LATENCY_WINDOW_SIZE: usize = 1000;

/// Number of slow queries kept for reporting.
const MAX_SLOW_QUERIES: usize = 10;

/// Default slow query threshold in milliseconds.
pub const SLOW_QUERY_THRESHOLD_MS: u64 = 100;

/// Thread-safe metrics collector.
///
/// Create one per manager and share it (wrapped in `Arc`) with every
/// knowledge base.
pub struct Metrics {
    // ========================================================================
    // Evaluation Metrics
    // ========================================================================
    evaluation_count: AtomicU64,
    evaluation_total_ms: AtomicU64,
    last_evaluation_ms: AtomicU64,
    tuples_derived: AtomicU64,
    rounds: AtomicU64,

    // ========================================================================
    // Query Metrics
    // ========================================================================
    query_count: AtomicU64,
    slow_query_count: AtomicU64,
    slow_threshold_ms: u64,

    /// Rolling window of recent query latencies
    latencies_ms: Mutex<VecDeque<u64>>,

    /// Sum of the latencies in the window
    latency_sum_ms: AtomicU64,

    /// Most recent slow queries, at most MAX_SLOW_QUERIES
    slow_queries: Mutex<VecDeque<SlowQuery>>,

    started_at: Instant,
}

/// A query that took at least the slow query threshold
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SlowQuery {
    /// The query text
    pub query: String,
    pub duration_ms: u64,
    /// When the query finished (ms since metrics started)
    pub timestamp_ms: u64,
}

/// Point-in-time copy of all metrics
#[derive(Clone, Debug, Default, Serialize)]
pub struct MetricsSnapshot {
    // Evaluation stats
    pub evaluation_count: u64,
    pub evaluation_avg_ms: u64,
    pub last_evaluation_ms: u64,
    pub tuples_derived: u64,
    pub rounds: u64,

    // Query stats
    pub query_count: u64,
    pub slow_query_count: u64,
    /// 50th percentile query latency (median)
    pub query_p50_ms: u64,
    pub query_p95_ms: u64,
    pub query_p99_ms: u64,
    /// Average query latency over the recent window
    pub query_avg_ms: u64,

    /// The most recent slow queries
    pub top_slow_queries: Vec<SlowQuery>,

    pub uptime_secs: u64,
}

impl MetricsSnapshot {
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Metrics {
    pub fn new() -> Self {
        Self::with_slow_threshold(SLOW_QUERY_THRESHOLD_MS)
    }

    /// Collector that counts queries taking at least `threshold_ms` as slow
    pub fn with_slow_threshold(threshold_ms: u64) -> Self {
        Self {
            evaluation_count: AtomicU64::new(0),
            evaluation_total_ms: AtomicU64::new(0),
            last_evaluation_ms: AtomicU64::new(0),
            tuples_derived: AtomicU64::new(0),
            rounds: AtomicU64::new(0),
            query_count: AtomicU64::new(0),
            slow_query_count: AtomicU64::new(0),
            slow_threshold_ms: threshold_ms,
            latencies_ms: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW_SIZE)),
            latency_sum_ms: AtomicU64::new(0),
            slow_queries: Mutex::new(VecDeque::with_capacity(MAX_SLOW_QUERIES)),
            started_at: Instant::now(),
        }
    }

    pub fn slow_threshold_ms(&self) -> u64 {
        self.slow_threshold_ms
    }

    /// Record a finished evaluation.
    pub fn record_evaluation(&self, stats: &EvaluationStats) {
        let ms = duration_ms(stats.duration);
        self.evaluation_count.fetch_add(1, Ordering::Relaxed);
        self.evaluation_total_ms.fetch_add(ms, Ordering::Relaxed);
        self.last_evaluation_ms.store(ms, Ordering::Relaxed);
        self.tuples_derived
            .fetch_add(stats.tuples_derived as u64, Ordering::Relaxed);
        self.rounds.fetch_add(stats.rounds as u64, Ordering::Relaxed);
    }

    /// Record a query execution.
    ///
    /// O(1) amortized: atomic increments plus bounded deque operations.
    pub fn record_query(&self, query: &str, duration_ms: u64) {
        self.query_count.fetch_add(1, Ordering::Relaxed);

        {
            let mut latencies = lock(&self.latencies_ms);
            if latencies.len() >= LATENCY_WINDOW_SIZE {
                if let Some(old) = latencies.pop_front() {
                    self.latency_sum_ms.fetch_sub(old, Ordering::Relaxed);
                }
            }
            latencies.push_back(duration_ms);
            self.latency_sum_ms.fetch_add(duration_ms, Ordering::Relaxed);
        }

        if duration_ms >= self.slow_threshold_ms {
            self.slow_query_count.fetch_add(1, Ordering::Relaxed);

            let slow_query = SlowQuery {
                query: query.to_string(),
                duration_ms,
                timestamp_ms: self.started_at.elapsed().as_millis() as u64,
            };

            let mut slow_queries = lock(&self.slow_queries);
            if slow_queries.len() >= MAX_SLOW_QUERIES {
                slow_queries.pop_front();
            }
            slow_queries.push_back(slow_query);
        }
    }

    /// Point-in-time copy of all metrics.
    ///
    /// Sorts the latency window, so O(LATENCY_WINDOW_SIZE).
    pub fn snapshot(&self) -> MetricsSnapshot {
        let (p50, p95, p99, avg) = {
            let latencies = lock(&self.latencies_ms);
            if latencies.is_empty() {
                (0, 0, 0, 0)
            } else {
                let mut sorted: Vec<u64> = latencies.iter().copied().collect();
                sorted.sort_unstable();

                let len = sorted.len();
                let p50 = sorted[len * 50 / 100];
                let p95 = sorted[len * 95 / 100];
                let p99 = sorted.get(len * 99 / 100).copied().unwrap_or(sorted[len - 1]);
                let avg = self.latency_sum_ms.load(Ordering::Relaxed) / len as u64;

                (p50, p95, p99, avg)
            }
        };

        let evaluation_count = self.evaluation_count.load(Ordering::Relaxed);
        let evaluation_avg_ms = if evaluation_count > 0 {
            self.evaluation_total_ms.load(Ordering::Relaxed) / evaluation_count
        } else {
            0
        };

        let top_slow_queries = lock(&self.slow_queries).iter().cloned().collect();

        MetricsSnapshot {
            evaluation_count,
            evaluation_avg_ms,
            last_evaluation_ms: self.last_evaluation_ms.load(Ordering::Relaxed),
            tuples_derived: self.tuples_derived.load(Ordering::Relaxed),
            rounds: self.rounds.load(Ordering::Relaxed),
            query_count: self.query_count.load(Ordering::Relaxed),
            slow_query_count: self.slow_query_count.load(Ordering::Relaxed),
            query_p50_ms: p50,
            query_p95_ms: p95,
            query_p99_ms: p99,
            query_avg_ms: avg,
            top_slow_queries,
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

// ============================================================================
// Unit Tests
// ============================================================================
