//! TableTriggerEventDispatcher - whole-instance trigger stream

use contracts::{DispatcherId, TableSpan, Ts, TxnEvent};

use crate::dispatcher::Dispatcher;
use crate::memory::MemoryUsage;
use crate::metrics::DispatcherMetrics;
use crate::shared::DispatcherCore;

/// Dispatcher of the synthetic trigger span (DDL and the global watermark).
///
/// Has no table schema, so it does not offer schema initialisation.
#[derive(Debug)]
pub struct TableTriggerEventDispatcher {
    core: DispatcherCore,
}

impl TableTriggerEventDispatcher {
    pub(crate) fn from_core(core: DispatcherCore) -> Self {
        Self { core }
    }

    /// Next sync-point boundary, when sync points are enabled
    pub fn next_sync_point_ts(&self) -> Option<Ts> {
        self.core.next_sync_point_ts()
    }
}

impl Dispatcher for TableTriggerEventDispatcher {
    fn id(&self) -> DispatcherId {
        self.core.id()
    }

    fn table_span(&self) -> &TableSpan {
        self.core.span()
    }

    fn push_event(&self, event: TxnEvent) {
        self.core.push_event(event, None);
    }

    fn update_resolved_ts(&self, ts: Ts) {
        self.core.update_resolved_ts(ts);
    }

    fn resolved_ts(&self) -> Ts {
        self.core.resolved_ts()
    }

    fn memory_usage(&self) -> &MemoryUsage {
        self.core.memory()
    }

    fn metrics(&self) -> &DispatcherMetrics {
        self.core.metrics()
    }
}
