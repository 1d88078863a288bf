//! Event collector metrics
//!
//! Thin recording helpers over the `metrics` facade; the exporter installed
//! by [`crate::init_with_config`] decides where they end up.

use std::time::Duration;

use contracts::MessageType;
use metrics::{counter, gauge, histogram};

/// Why an inbound feed was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedDropReason {
    /// Payload was not an event feed
    InvalidPayload,
    /// Dispatcher id did not parse
    InvalidDispatcherId,
    /// No dispatcher registered under the id
    UnknownDispatcher,
}

impl FeedDropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidPayload => "invalid_payload",
            Self::InvalidDispatcherId => "invalid_dispatcher_id",
            Self::UnknownDispatcher => "unknown_dispatcher",
        }
    }
}

/// Record an inbound feed applied to a dispatcher
pub fn record_feed_received(event_count: usize) {
    counter!("event_collector_feeds_total").increment(1);
    if event_count > 0 {
        counter!("event_collector_txn_events_total").increment(event_count as u64);
    }
    histogram!("event_collector_feed_size").record(event_count as f64);
}

/// Record an inbound feed that was rejected or dropped
pub fn record_feed_dropped(reason: FeedDropReason) {
    counter!(
        "event_collector_feeds_dropped_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record an outbound control message
pub fn record_control_message(message_type: MessageType, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "event_collector_control_messages_total",
        "type" => format!("{message_type:?}"),
        "status" => status
    )
    .increment(1);
}

/// Record the number of registered dispatchers
pub fn record_registered_dispatchers(count: usize) {
    gauge!("event_collector_registered_dispatchers").set(count as f64);
}

/// Record node-wide buffered event memory
pub fn record_global_memory(used_bytes: u64, quota_bytes: u64) {
    gauge!("event_collector_memory_used_bytes").set(used_bytes as f64);
    gauge!("event_collector_memory_quota_bytes").set(quota_bytes as f64);
}

/// Record entering / leaving the node-wide backpressure pause
pub fn record_backpressure(paused: bool) {
    gauge!("event_collector_paused").set(if paused { 1.0 } else { 0.0 });
    if paused {
        counter!("event_collector_pauses_total").increment(1);
    }
}

/// Record how long one inbound feed waited for memory
pub fn record_pause_duration(waited: Duration) {
    histogram!("event_collector_pause_duration_ms").record(waited.as_secs_f64() * 1000.0);
}

/// Record a speed ratio sent for one dispatcher
pub fn record_speed_ratio(dispatcher_id: &str, ratio: f32) {
    gauge!(
        "event_collector_dispatcher_speed_ratio",
        "dispatcher_id" => dispatcher_id.to_string()
    )
    .set(ratio as f64);
}
