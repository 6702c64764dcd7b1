//! Dispatch and query metrics.
//!
//! Counters are plain atomics so the dispatcher task, the fanout, and query
//! batches can record without taking locks. Read them through
//! [`DispatchMetrics::snapshot`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Latency statistics for one kind of operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Total number of operations.
    pub count: u64,
    /// Operations that produced a result.
    pub success_count: u64,
    /// Operations that failed, timed out, or were cancelled.
    pub failure_count: u64,
    pub total_duration_ms: u64,
    pub min_duration_ms: Option<u64>,
    pub max_duration_ms: Option<u64>,
    pub avg_duration_ms: Option<f64>,
}

impl LatencyStats {
    /// Success ratio in `[0, 1]`, or `None` before the first operation.
    pub fn success_rate(&self) -> Option<f64> {
        (self.count > 0).then(|| self.success_count as f64 / self.count as f64)
    }
}

/// Lock-free latency recorder.
#[derive(Debug)]
pub struct LatencyRecorder {
    count: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    total_duration_ms: AtomicU64,
    min_duration_ms: AtomicU64,
    max_duration_ms: AtomicU64,
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            min_duration_ms: AtomicU64::new(u64::MAX),
            max_duration_ms: AtomicU64::new(0),
        }
    }

    /// Record one finished operation.
    pub fn record(&self, duration: Duration, success: bool) {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);
        self.min_duration_ms.fetch_min(ms, Ordering::Relaxed);
        self.max_duration_ms.fetch_max(ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LatencyStats {
        let count = self.count.load(Ordering::Relaxed);
        let total_duration_ms = self.total_duration_ms.load(Ordering::Relaxed);
        let min = self.min_duration_ms.load(Ordering::Relaxed);

        LatencyStats {
            count,
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            total_duration_ms,
            min_duration_ms: (min != u64::MAX).then_some(min),
            max_duration_ms: (count > 0).then(|| self.max_duration_ms.load(Ordering::Relaxed)),
            avg_duration_ms: (count > 0).then(|| total_duration_ms as f64 / count as f64),
        }
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.total_duration_ms.store(0, Ordering::Relaxed);
        self.min_duration_ms.store(u64::MAX, Ordering::Relaxed);
        self.max_duration_ms.store(0, Ordering::Relaxed);
    }
}

/// Counters for the event pipeline.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    events_handled: AtomicU64,
    events_dropped: AtomicU64,
    notifications_published: AtomicU64,
    listener_failures: AtomicU64,
    query_timeouts: AtomicU64,
    /// Per-query latency inside query batches.
    pub queries: LatencyRecorder,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create shared metrics.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn record_event(&self) {
        self.events_handled.fetch_add(1, Ordering::Relaxed);
    }

    /// An inbound event was malformed and discarded.
    pub fn record_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A notification went out, with the number of listeners that failed.
    pub fn record_publish(&self, failed: usize) {
        self.notifications_published.fetch_add(1, Ordering::Relaxed);
        self.listener_failures
            .fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub fn record_query_timeout(&self) {
        self.query_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            events_handled: self.events_handled.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            notifications_published: self.notifications_published.load(Ordering::Relaxed),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
            query_timeouts: self.query_timeouts.load(Ordering::Relaxed),
            queries: self.queries.snapshot(),
        }
    }

    pub fn reset(&self) {
        self.events_handled.store(0, Ordering::Relaxed);
        self.events_dropped.store(0, Ordering::Relaxed);
        self.notifications_published.store(0, Ordering::Relaxed);
        self.listener_failures.store(0, Ordering::Relaxed);
        self.query_timeouts.store(0, Ordering::Relaxed);
        self.queries.reset();
    }
}

/// Serializable view of [`DispatchMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub events_handled: u64,
    pub events_dropped: u64,
    pub notifications_published: u64,
    pub listener_failures: u64,
    pub query_timeouts: u64,
    pub queries: LatencyStats,
}
