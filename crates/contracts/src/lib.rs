//! # Contracts
//!
//! Frozen interface contracts shared by the event-distribution crates:
//! identity types, change-event payloads, the messaging envelope and the
//! capabilities every crate programs against.
//! Business crates depend on this crate only, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - `Ts` is a hybrid timestamp: physical milliseconds in the high bits and an
//!   18-bit logical counter in the low bits
//! - Resolved timestamps are watermarks: no transaction with a lower commit ts
//!   follows them on the same dispatcher

mod collector_config;
mod error;
mod event;
mod ids;
mod messaging;
mod sink;
mod span;
mod task;
mod ts;

pub use collector_config::*;
pub use error::*;
pub use event::*;
pub use ids::{DispatcherId, ServerId};
pub use messaging::*;
pub use sink::{DispatcherEvent, EventSink, LocalEventSink};
pub use span::{TableSpan, TRIGGER_TABLE_ID};
pub use task::{LocalTask, Task};
pub use ts::*;
