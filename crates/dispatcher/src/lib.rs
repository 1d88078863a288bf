//! # Dispatcher
//!
//! Per-table consumers of change streams.
//!
//! Responsibilities:
//! - Accept transactions and watermarks in order, never moving a watermark back
//! - Inject sync points at fixed intervals of the commit-ts domain
//! - Account buffered bytes for node-wide flow control
//! - Drain the output stream into a sink

mod shared;
pub mod dispatcher;
pub mod handle;
pub mod memory;
pub mod metrics;
pub mod sinks;
mod stream;
mod sync_point;
mod table;
mod trigger;

pub use contracts::{DispatcherEvent, EventSink};
pub use dispatcher::{Dispatcher, DispatcherBuilder, SchemaInitializable};
pub use handle::{DrainHandle, DrainTask};
pub use memory::{GlobalMemoryUsage, MemoryUsage};
pub use metrics::{DispatcherMetrics, DrainMetrics, MetricsSnapshot};
pub use sinks::LogSink;
pub use stream::EventReceiver;
pub use table::TableEventDispatcher;
pub use trigger::TableTriggerEventDispatcher;
