//! Sink implementations

mod log;

pub use log::LogSink;
