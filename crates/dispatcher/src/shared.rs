//! State shared by every dispatcher variant: watermark, sync points, output.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use contracts::{
    DispatcherEvent, DispatcherId, SyncPointConfig, TableInfo, TableSpan, Ts, TxnEvent,
};

use crate::memory::MemoryUsage;
use crate::metrics::DispatcherMetrics;
use crate::stream::EventReceiver;
use crate::sync_point::SyncPointState;

#[derive(Debug)]
struct CoreState {
    resolved_ts: Ts,
    sync_point: Option<SyncPointState>,
}

/// Ingestion core.
///
/// Every emission happens under `state`, so stream order equals call order.
#[derive(Debug)]
pub(crate) struct DispatcherCore {
    id: DispatcherId,
    span: TableSpan,
    state: Mutex<CoreState>,
    output: mpsc::UnboundedSender<DispatcherEvent>,
    memory: Arc<MemoryUsage>,
    metrics: DispatcherMetrics,
}

impl DispatcherCore {
    pub(crate) fn new(
        id: DispatcherId,
        span: TableSpan,
        start_ts: Ts,
        sync_point: Option<SyncPointConfig>,
    ) -> (Self, EventReceiver) {
        let (output, rx) = mpsc::unbounded_channel();
        let memory = Arc::new(MemoryUsage::new());
        let receiver = EventReceiver::new(id, rx, Arc::clone(&memory));
        let core = Self {
            id,
            span,
            state: Mutex::new(CoreState {
                resolved_ts: start_ts,
                sync_point: sync_point.map(|cfg| SyncPointState::new(cfg, start_ts)),
            }),
            output,
            memory,
            metrics: DispatcherMetrics::new(),
        };
        (core, receiver)
    }

    pub(crate) fn id(&self) -> DispatcherId {
        self.id
    }

    pub(crate) fn span(&self) -> &TableSpan {
        &self.span
    }

    pub(crate) fn memory(&self) -> &MemoryUsage {
        &self.memory
    }

    pub(crate) fn metrics(&self) -> &DispatcherMetrics {
        &self.metrics
    }

    pub(crate) fn resolved_ts(&self) -> Ts {
        self.state.lock().resolved_ts
    }

    pub(crate) fn next_sync_point_ts(&self) -> Option<Ts> {
        self.state.lock().sync_point.as_ref().map(SyncPointState::next_ts)
    }

    pub(crate) fn push_event(&self, event: TxnEvent, table_info: Option<Arc<TableInfo>>) {
        let mut state = self.state.lock();

        if let Some(sync_point) = state.sync_point.as_mut() {
            for ts in sync_point.due_before_commit(event.commit_ts) {
                self.emit_sync_point(ts);
            }
        }

        if event.commit_ts <= state.resolved_ts {
            self.metrics.inc_late_events();
            warn!(
                dispatcher_id = %self.id,
                commit_ts = event.commit_ts,
                resolved_ts = state.resolved_ts,
                "Transaction at or below watermark"
            );
        }

        let commit_ts = event.commit_ts;
        let cost = event.memory_cost();
        self.memory.add(commit_ts, cost);
        if self.emit(DispatcherEvent::Txn { event, table_info }) {
            self.metrics.inc_events_pushed();
        } else {
            self.memory.release(commit_ts, cost);
        }
        trace!(dispatcher_id = %self.id, commit_ts, cost, "Transaction pushed");
    }

    pub(crate) fn update_resolved_ts(&self, ts: Ts) {
        let mut state = self.state.lock();

        if ts < state.resolved_ts {
            self.metrics.inc_resolved_regressions();
            warn!(
                dispatcher_id = %self.id,
                resolved_ts = state.resolved_ts,
                rejected_ts = ts,
                "Resolved ts regression ignored"
            );
            return;
        }
        if ts == state.resolved_ts {
            return;
        }

        if let Some(sync_point) = state.sync_point.as_mut() {
            for sync_ts in sync_point.due_at_resolved(ts) {
                self.emit_sync_point(sync_ts);
            }
        }

        state.resolved_ts = ts;
        self.metrics.inc_resolved_updates();
        self.emit(DispatcherEvent::ResolvedTs(ts));
    }

    fn emit_sync_point(&self, ts: Ts) {
        if self.emit(DispatcherEvent::SyncPoint { ts }) {
            self.metrics.inc_sync_points();
            debug!(dispatcher_id = %self.id, sync_point_ts = ts, "Sync point emitted");
        }
    }

    fn emit(&self, event: DispatcherEvent) -> bool {
        match self.output.send(event) {
            Ok(()) => true,
            Err(_) => {
                debug!(dispatcher_id = %self.id, "Output stream closed, event discarded");
                false
            }
        }
    }
}
