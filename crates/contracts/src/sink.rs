//! Downstream side of a dispatcher: the event stream and the sink interface.

use std::sync::Arc;

use crate::{ContractError, DispatcherId, TableInfo, Ts, TxnEvent};

/// Item of a dispatcher's output stream
#[derive(Debug, Clone, PartialEq)]
pub enum DispatcherEvent {
    /// A transaction, with the schema known when it was accepted
    Txn {
        event: TxnEvent,
        table_info: Option<Arc<TableInfo>>,
    },
    /// Synthetic consistency marker
    SyncPoint { ts: Ts },
    /// Watermark advanced
    ResolvedTs(Ts),
}

impl DispatcherEvent {
    /// Commit ts of a transaction, sync-point ts, or watermark
    pub fn ts(&self) -> Ts {
        match self {
            Self::Txn { event, .. } => event.commit_ts,
            Self::SyncPoint { ts } => *ts,
            Self::ResolvedTs(ts) => *ts,
        }
    }

    pub fn is_txn(&self) -> bool {
        matches!(self, Self::Txn { .. })
    }
}

/// Event output trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(EventSink: Send)]
pub trait LocalEventSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one event of `dispatcher_id`'s stream
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(
        &mut self,
        dispatcher_id: DispatcherId,
        event: &DispatcherEvent,
    ) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
