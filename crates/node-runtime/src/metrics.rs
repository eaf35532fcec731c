//! Counters for reconciliation and error reporting.
//!
//! ```ignore
//! let metrics = ReconcilerMetrics::new();
//! let start = std::time::Instant::now();
//! // ... handle a connect event ...
//! metrics.record_event(EventKind::Connect, start.elapsed());
//! assert_eq!(metrics.snapshot().connects, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use shared_bus::{ChainEvent, EventSource};

/// Chain event kinds the reconciler distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Connect,
    Disconnect,
    Reorganize,
    Reset,
    Error,
}

impl From<&ChainEvent> for EventKind {
    fn from(event: &ChainEvent) -> Self {
        match event {
            ChainEvent::Connect { .. } => EventKind::Connect,
            ChainEvent::Disconnect { .. } => EventKind::Disconnect,
            ChainEvent::Reorganize { .. } => EventKind::Reorganize,
            ChainEvent::Reset { .. } => EventKind::Reset,
            ChainEvent::Error { .. } => EventKind::Error,
        }
    }
}

/// Thread-safe reconciler counters.
#[derive(Debug, Default)]
pub struct ReconcilerMetrics {
    pub connects: AtomicU64,
    pub disconnects: AtomicU64,
    pub reorganizations: AtomicU64,
    pub resets: AtomicU64,
    /// Chain errors forwarded to the error channel.
    pub chain_errors: AtomicU64,
    pub connect_failures: AtomicU64,
    pub disconnect_failures: AtomicU64,
    pub reorganize_failures: AtomicU64,
    pub reset_failures: AtomicU64,
    /// Pool transactions removed by connects, reorganizations and resets.
    pub pool_evictions: AtomicU64,
    pub txs_reinstated: AtomicU64,
    pub reinstate_failures: AtomicU64,
    /// Every report published on the error channel, from any source.
    pub errors_reported: AtomicU64,
    pub submission_errors: AtomicU64,
    /// Cumulative handling time in microseconds.
    pub handling_time_us: AtomicU64,
}

impl ReconcilerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self, kind: EventKind, duration: Duration) {
        let counter = match kind {
            EventKind::Connect => &self.connects,
            EventKind::Disconnect => &self.disconnects,
            EventKind::Reorganize => &self.reorganizations,
            EventKind::Reset => &self.resets,
            EventKind::Error => &self.chain_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.handling_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self, kind: EventKind) {
        let counter = match kind {
            EventKind::Connect => &self.connect_failures,
            EventKind::Disconnect => &self.disconnect_failures,
            EventKind::Reorganize => &self.reorganize_failures,
            EventKind::Reset => &self.reset_failures,
            EventKind::Error => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.pool_evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_reinstated(&self, reinstated: usize, failed: usize) {
        self.txs_reinstated
            .fetch_add(reinstated as u64, Ordering::Relaxed);
        self.reinstate_failures
            .fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub fn record_error_report(&self, source: EventSource) {
        self.errors_reported.fetch_add(1, Ordering::Relaxed);
        if source == EventSource::Submission {
            self.submission_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn events_processed(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
            + self.disconnects.load(Ordering::Relaxed)
            + self.reorganizations.load(Ordering::Relaxed)
            + self.resets.load(Ordering::Relaxed)
            + self.chain_errors.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.connect_failures.load(Ordering::Relaxed)
            + self.disconnect_failures.load(Ordering::Relaxed)
            + self.reorganize_failures.load(Ordering::Relaxed)
            + self.reset_failures.load(Ordering::Relaxed)
    }

    /// Average handling time per processed event, in microseconds.
    pub fn avg_handling_time_us(&self) -> u64 {
        let total = self.handling_time_us.load(Ordering::Relaxed);
        match self.events_processed() {
            0 => 0,
            count => total / count,
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_processed: self.events_processed(),
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            reorganizations: self.reorganizations.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            chain_errors: self.chain_errors.load(Ordering::Relaxed),
            failures: self.failures(),
            pool_evictions: self.pool_evictions.load(Ordering::Relaxed),
            txs_reinstated: self.txs_reinstated.load(Ordering::Relaxed),
            reinstate_failures: self.reinstate_failures.load(Ordering::Relaxed),
            errors_reported: self.errors_reported.load(Ordering::Relaxed),
            submission_errors: self.submission_errors.load(Ordering::Relaxed),
            avg_handling_us: self.avg_handling_time_us(),
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_processed: u64,
    pub connects: u64,
    pub disconnects: u64,
    pub reorganizations: u64,
    pub resets: u64,
    pub chain_errors: u64,
    pub failures: u64,
    pub pool_evictions: u64,
    pub txs_reinstated: u64,
    pub reinstate_failures: u64,
    pub errors_reported: u64,
    pub submission_errors: u64,
    pub avg_handling_us: u64,
}
