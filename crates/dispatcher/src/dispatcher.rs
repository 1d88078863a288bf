//! Dispatcher - capability interface and builder

use contracts::{DispatcherId, SyncPointConfig, TableInfo, TableSpan, Ts, TxnEvent};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::memory::MemoryUsage;
use crate::metrics::DispatcherMetrics;
use crate::shared::DispatcherCore;
use crate::stream::EventReceiver;
use crate::table::TableEventDispatcher;
use crate::trigger::TableTriggerEventDispatcher;

/// Consumer of one table span's change stream.
///
/// Methods take `&self`; implementations synchronize internally so a
/// dispatcher can sit in a shared registry. Callers that need several calls
/// to be applied as one unit (a whole feed) serialize them externally.
pub trait Dispatcher: Send + Sync {
    fn id(&self) -> DispatcherId;

    fn table_span(&self) -> &TableSpan;

    /// Accept a transaction into the output stream, in call order
    fn push_event(&self, event: TxnEvent);

    /// Advance the watermark; lower values than the current one are ignored
    fn update_resolved_ts(&self, ts: Ts);

    /// Current watermark
    fn resolved_ts(&self) -> Ts;

    fn memory_usage(&self) -> &MemoryUsage;

    fn metrics(&self) -> &DispatcherMetrics;

    /// Schema initialisation capability, if this dispatcher decodes rows
    fn as_schema_initializable(&self) -> Option<&dyn SchemaInitializable> {
        None
    }
}

/// Dispatchers that need a table schema before their events can be decoded
pub trait SchemaInitializable: Send + Sync {
    /// Install `table_info` unless an equal or newer schema epoch is present.
    ///
    /// Returns whether the schema was applied.
    fn init_table_info(&self, table_info: TableInfo) -> bool;

    /// Schema currently in effect
    fn table_info(&self) -> Option<Arc<TableInfo>>;
}

/// Builder for creating a dispatcher and its output stream
#[derive(Debug, Clone)]
pub struct DispatcherBuilder {
    id: DispatcherId,
    span: TableSpan,
    start_ts: Ts,
    sync_point: Option<SyncPointConfig>,
}

impl DispatcherBuilder {
    /// Builder for a dispatcher of `span` with a fresh random id
    pub fn new(span: TableSpan) -> Self {
        Self {
            id: DispatcherId::new(),
            span,
            start_ts: 0,
            sync_point: None,
        }
    }

    /// Builder for the whole-instance trigger dispatcher
    pub fn trigger() -> Self {
        Self::new(TableSpan::trigger())
    }

    pub fn with_id(mut self, id: DispatcherId) -> Self {
        self.id = id;
        self
    }

    /// Initial watermark, normally the ts the feed is registered from
    pub fn start_ts(mut self, start_ts: Ts) -> Self {
        self.start_ts = start_ts;
        self
    }

    /// Enable sync-point injection
    pub fn sync_point(mut self, config: SyncPointConfig) -> Self {
        self.sync_point = Some(config);
        self
    }

    /// Build a per-table dispatcher
    #[instrument(name = "dispatcher_build_table", skip(self), fields(dispatcher_id = %self.id, table_id = self.span.table_id))]
    pub fn build_table(self) -> (TableEventDispatcher, EventReceiver) {
        let (core, receiver) = self.into_core();
        debug!("Table dispatcher created");
        (TableEventDispatcher::from_core(core), receiver)
    }

    /// Build a table-trigger dispatcher; the span is forced to the trigger span
    #[instrument(name = "dispatcher_build_trigger", skip(self), fields(dispatcher_id = %self.id))]
    pub fn build_trigger(mut self) -> (TableTriggerEventDispatcher, EventReceiver) {
        self.span = TableSpan::trigger();
        let (core, receiver) = self.into_core();
        debug!("Table trigger dispatcher created");
        (TableTriggerEventDispatcher::from_core(core), receiver)
    }

    fn into_core(self) -> (DispatcherCore, EventReceiver) {
        DispatcherCore::new(self.id, self.span, self.start_ts, self.sync_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::{compose_ts, DispatcherEvent, RowChange, RowOp};
    use std::time::Duration;

    fn txn(commit_ts: Ts) -> TxnEvent {
        TxnEvent {
            table_id: 1,
            start_ts: commit_ts.saturating_sub(1),
            commit_ts,
            rows: vec![RowChange {
                op: RowOp::Insert,
                key: Bytes::from_static(b"k"),
                value: Some(Bytes::from_static(b"v")),
                old_value: None,
            }],
        }
    }

    fn drain(rx: &mut EventReceiver) -> Vec<DispatcherEvent> {
        let mut out = Vec::new();
        while let Some(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn test_events_keep_call_order() {
        let (d, mut rx) = DispatcherBuilder::new(TableSpan::whole_table(1))
            .start_ts(100)
            .build_table();
        d.push_event(txn(105));
        d.push_event(txn(110));
        d.update_resolved_ts(110);

        let ts: Vec<_> = drain(&mut rx).iter().map(DispatcherEvent::ts).collect();
        assert_eq!(ts, vec![105, 110, 110]);
        assert_eq!(d.resolved_ts(), 110);
        assert_eq!(d.metrics().events_pushed(), 2);
    }

    #[test]
    fn test_watermark_never_regresses() {
        let (d, mut rx) = DispatcherBuilder::trigger().start_ts(10).build_trigger();
        for ts in [20, 15, 30, 30, 25, 40] {
            d.update_resolved_ts(ts);
        }
        assert_eq!(d.resolved_ts(), 40);
        assert_eq!(d.metrics().resolved_regressions(), 2);

        let watermarks: Vec<_> = drain(&mut rx).iter().map(DispatcherEvent::ts).collect();
        assert_eq!(watermarks, vec![20, 30, 40]);
    }

    #[test]
    fn test_memory_accounted_until_released() {
        let (d, mut rx) = DispatcherBuilder::new(TableSpan::whole_table(1)).build_table();
        d.push_event(txn(5));
        let used = d.memory_usage().used_bytes();
        assert!(used > 0);

        let event = rx.try_recv().unwrap();
        assert_eq!(rx.release(&event), used);
        assert_eq!(d.memory_usage().used_bytes(), 0);
    }

    #[test]
    fn test_closed_stream_discards_and_frees() {
        let (d, rx) = DispatcherBuilder::new(TableSpan::whole_table(1)).build_table();
        drop(rx);
        d.push_event(txn(5));
        assert_eq!(d.memory_usage().used_bytes(), 0);
        assert_eq!(d.metrics().events_pushed(), 0);
    }

    #[test]
    fn test_dropping_receiver_frees_buffered_events() {
        let global = Arc::new(crate::GlobalMemoryUsage::new());
        let (d, rx) = DispatcherBuilder::new(TableSpan::whole_table(1)).build_table();
        assert!(d.memory_usage().attach(Arc::clone(&global)));
        d.push_event(txn(5));
        d.push_event(txn(6));
        assert!(global.used_bytes() > 0);

        drop(rx);
        assert_eq!(d.memory_usage().used_bytes(), 0);
        assert_eq!(global.used_bytes(), 0);

        // Later pushes are discarded without being accounted
        d.push_event(txn(7));
        assert_eq!(global.used_bytes(), 0);
    }

    #[test]
    fn test_late_event_is_delivered_and_counted() {
        let (d, mut rx) = DispatcherBuilder::new(TableSpan::whole_table(1))
            .start_ts(100)
            .build_table();
        d.push_event(txn(90));
        assert_eq!(d.metrics().late_events(), 1);
        assert!(rx.try_recv().unwrap().is_txn());
    }

    #[test]
    fn test_sync_point_precedes_crossing_transaction() {
        let interval = Duration::from_secs(1);
        let (d, mut rx) = DispatcherBuilder::new(TableSpan::whole_table(1))
            .start_ts(compose_ts(500, 0))
            .sync_point(SyncPointConfig::new(interval))
            .build_table();

        d.push_event(txn(compose_ts(900, 0)));
        d.push_event(txn(compose_ts(1_200, 0)));
        d.update_resolved_ts(compose_ts(1_200, 0));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], DispatcherEvent::Txn { .. }));
        assert_eq!(
            events[1],
            DispatcherEvent::SyncPoint {
                ts: compose_ts(1_000, 0)
            }
        );
        assert!(matches!(events[2], DispatcherEvent::Txn { .. }));
        assert_eq!(events[3], DispatcherEvent::ResolvedTs(compose_ts(1_200, 0)));
        assert_eq!(d.metrics().sync_points(), 1);
        assert_eq!(d.next_sync_point_ts(), Some(compose_ts(2_000, 0)));
    }

    #[test]
    fn test_sync_point_from_watermark_alone() {
        let (d, mut rx) = DispatcherBuilder::trigger()
            .start_ts(compose_ts(0, 0))
            .sync_point(SyncPointConfig::new(Duration::from_secs(1)))
            .build_trigger();

        d.update_resolved_ts(compose_ts(2_500, 0));

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                DispatcherEvent::SyncPoint {
                    ts: compose_ts(1_000, 0)
                },
                DispatcherEvent::SyncPoint {
                    ts: compose_ts(2_000, 0)
                },
                DispatcherEvent::ResolvedTs(compose_ts(2_500, 0)),
            ]
        );
    }

    #[test]
    fn test_trigger_builder_forces_trigger_span() {
        let (d, _rx) = DispatcherBuilder::new(TableSpan::whole_table(9)).build_trigger();
        assert!(d.table_span().is_trigger());
        assert!(d.as_schema_initializable().is_none());
        assert_eq!(d.next_sync_point_ts(), None);
    }

    #[test]
    fn test_builder_with_id() {
        let id = DispatcherId::new();
        let (d, rx) = DispatcherBuilder::new(TableSpan::whole_table(1))
            .with_id(id)
            .build_table();
        assert_eq!(d.id(), id);
        assert_eq!(rx.dispatcher_id(), id);
    }
}
