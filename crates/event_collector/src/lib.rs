//! # Event Collector
//!
//! Node-local hub between the remote event service and the dispatchers.
//!
//! Responsibilities:
//! - Keep the registry of live dispatchers
//! - Ask the event service to start / stop feeding a dispatcher
//! - Route inbound event feeds to their dispatcher, in feed order
//! - Pause inbound delivery while buffered memory is over quota

mod collector;

pub use collector::EventCollector;
pub use contracts::{CollectorConfig, EventFeed, TargetMessage};
