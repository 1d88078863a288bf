//! TableSpan - key range owned by one dispatcher

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Table id reserved for the whole-instance trigger span
pub const TRIGGER_TABLE_ID: i64 = 0;

/// Contiguous key range `[start_key, end_key)` of one table.
///
/// An empty `end_key` means unbounded. The trigger span (table id 0, both
/// keys empty) stands for the whole instance: DDL and the global watermark.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableSpan {
    pub table_id: i64,
    pub start_key: Bytes,
    pub end_key: Bytes,
}

impl TableSpan {
    /// Create a span over `[start_key, end_key)` of `table_id`
    pub fn new(table_id: i64, start_key: impl Into<Bytes>, end_key: impl Into<Bytes>) -> Self {
        Self {
            table_id,
            start_key: start_key.into(),
            end_key: end_key.into(),
        }
    }

    /// Span covering every key of `table_id`
    pub fn whole_table(table_id: i64) -> Self {
        Self::new(table_id, Bytes::new(), Bytes::new())
    }

    /// The synthetic whole-instance trigger span
    pub fn trigger() -> Self {
        Self::whole_table(TRIGGER_TABLE_ID)
    }

    pub fn is_trigger(&self) -> bool {
        self.table_id == TRIGGER_TABLE_ID && self.start_key.is_empty() && self.end_key.is_empty()
    }

    /// Whether `key` falls inside the span
    pub fn contains_key(&self, key: &[u8]) -> bool {
        key >= self.start_key.as_ref() && (self.end_key.is_empty() || key < self.end_key.as_ref())
    }
}

impl fmt::Display for TableSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "table {} [{}, {})",
            self.table_id,
            String::from_utf8_lossy(&self.start_key),
            String::from_utf8_lossy(&self.end_key)
        )
    }
}
