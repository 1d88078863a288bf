//! Dispatcher metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for a single dispatcher
#[derive(Debug, Default)]
pub struct DispatcherMetrics {
    /// Transaction events accepted
    events_pushed: AtomicU64,
    /// Transaction events whose commit ts was not above the watermark
    late_events: AtomicU64,
    /// Watermark advances
    resolved_updates: AtomicU64,
    /// Watermark updates rejected for going backwards
    resolved_regressions: AtomicU64,
    /// Sync points emitted
    sync_points: AtomicU64,
}

macro_rules! counter_accessors {
    ($($field:ident => $inc:ident),* $(,)?) => {
        $(
            pub fn $field(&self) -> u64 {
                self.$field.load(Ordering::Relaxed)
            }

            pub fn $inc(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl DispatcherMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    counter_accessors! {
        events_pushed => inc_events_pushed,
        late_events => inc_late_events,
        resolved_updates => inc_resolved_updates,
        resolved_regressions => inc_resolved_regressions,
        sync_points => inc_sync_points,
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_pushed: self.events_pushed(),
            late_events: self.late_events(),
            resolved_updates: self.resolved_updates(),
            resolved_regressions: self.resolved_regressions(),
            sync_points: self.sync_points(),
        }
    }
}

/// Snapshot of dispatcher metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_pushed: u64,
    pub late_events: u64,
    pub resolved_updates: u64,
    pub resolved_regressions: u64,
    pub sync_points: u64,
}

/// Metrics for the task draining a dispatcher into a sink
#[derive(Debug, Default)]
pub struct DrainMetrics {
    /// Successful sink writes
    write_count: AtomicU64,
    /// Sink write failures
    failure_count: AtomicU64,
    /// Sink flushes
    flush_count: AtomicU64,
}

impl DrainMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    counter_accessors! {
        write_count => inc_write_count,
        failure_count => inc_failure_count,
        flush_count => inc_flush_count,
    }
}
