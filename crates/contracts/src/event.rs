//! Change-event payloads delivered on the event-feed topic.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::mem::size_of;

use crate::{DispatcherId, Ts};

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Database type name (e.g. "bigint", "varchar(255)")
    pub column_type: String,
    #[serde(default)]
    pub nullable: bool,
}

/// Table schema, sent with a feed when the consumer needs it before decoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub table_id: i64,
    pub schema_name: String,
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    /// Schema epoch; bumped by every DDL touching the table
    pub version: u64,
}

impl TableInfo {
    /// Fully qualified `schema.table` name
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.table_name)
    }
}

/// Row operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowOp {
    Insert,
    Update,
    Delete,
}

/// One changed row in raw key/value form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowChange {
    pub op: RowOp,
    pub key: Bytes,
    #[serde(default)]
    pub value: Option<Bytes>,
    #[serde(default)]
    pub old_value: Option<Bytes>,
}

impl RowChange {
    fn payload_len(&self) -> usize {
        self.key.len()
            + self.value.as_ref().map_or(0, Bytes::len)
            + self.old_value.as_ref().map_or(0, Bytes::len)
    }
}

/// A committed transaction on one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnEvent {
    pub table_id: i64,
    pub start_ts: Ts,
    pub commit_ts: Ts,
    pub rows: Vec<RowChange>,
}

impl TxnEvent {
    /// Estimated bytes this event occupies while buffered
    pub fn memory_cost(&self) -> u64 {
        let rows: usize = self
            .rows
            .iter()
            .map(|r| size_of::<RowChange>() + r.payload_len())
            .sum();
        (size_of::<Self>() + rows) as u64
    }
}

/// Inbound delivery unit for one dispatcher
///
/// `resolved_ts` is at least every `commit_ts` in `txn_events` and at least
/// the previous resolved ts delivered to the same dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFeed {
    /// String-encoded [`DispatcherId`]
    pub dispatcher_id: String,
    #[serde(default)]
    pub table_info: Option<TableInfo>,
    #[serde(default)]
    pub txn_events: Vec<TxnEvent>,
    pub resolved_ts: Ts,
}

impl EventFeed {
    /// Feed addressed to `dispatcher_id` carrying only a watermark
    pub fn resolved(dispatcher_id: DispatcherId, resolved_ts: Ts) -> Self {
        Self {
            dispatcher_id: dispatcher_id.to_string(),
            table_info: None,
            txn_events: Vec::new(),
            resolved_ts,
        }
    }

    pub fn with_events(mut self, txn_events: Vec<TxnEvent>) -> Self {
        self.txn_events = txn_events;
        self
    }

    pub fn with_table_info(mut self, table_info: TableInfo) -> Self {
        self.table_info = Some(table_info);
        self
    }

    /// Largest commit ts in the feed, if any
    pub fn max_commit_ts(&self) -> Option<Ts> {
        self.txn_events.iter().map(|e| e.commit_ts).max()
    }
}
