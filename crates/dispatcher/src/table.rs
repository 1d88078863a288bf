//! TableEventDispatcher - dispatcher of one table span

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use contracts::{DispatcherId, TableInfo, TableSpan, Ts, TxnEvent};

use crate::dispatcher::{Dispatcher, SchemaInitializable};
use crate::memory::MemoryUsage;
use crate::metrics::DispatcherMetrics;
use crate::shared::DispatcherCore;

/// Dispatcher for a single table span.
///
/// Transactions carry the schema in effect when they were accepted, so the
/// downstream consumer can decode rows without a catalog lookup.
#[derive(Debug)]
pub struct TableEventDispatcher {
    core: DispatcherCore,
    table_info: RwLock<Option<Arc<TableInfo>>>,
}

impl TableEventDispatcher {
    pub(crate) fn from_core(core: DispatcherCore) -> Self {
        Self {
            core,
            table_info: RwLock::new(None),
        }
    }

    /// Next sync-point boundary, when sync points are enabled
    pub fn next_sync_point_ts(&self) -> Option<Ts> {
        self.core.next_sync_point_ts()
    }
}

impl Dispatcher for TableEventDispatcher {
    fn id(&self) -> DispatcherId {
        self.core.id()
    }

    fn table_span(&self) -> &TableSpan {
        self.core.span()
    }

    fn push_event(&self, event: TxnEvent) {
        let table_info = self.table_info.read().clone();
        if table_info.is_none() {
            debug!(
                dispatcher_id = %self.core.id(),
                commit_ts = event.commit_ts,
                "Transaction accepted before table info"
            );
        }
        self.core.push_event(event, table_info);
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

    fn as_schema_initializable(&self) -> Option<&dyn SchemaInitializable> {
        Some(self)
    }
}

impl SchemaInitializable for TableEventDispatcher {
    fn init_table_info(&self, table_info: TableInfo) -> bool {
        let span = self.core.span();
        if table_info.table_id != span.table_id {
            warn!(
                dispatcher_id = %self.core.id(),
                span_table_id = span.table_id,
                table_id = table_info.table_id,
                "Table info for another table ignored"
            );
            return false;
        }

        let mut current = self.table_info.write();
        if let Some(existing) = current.as_ref() {
            if existing.version >= table_info.version {
                debug!(
                    dispatcher_id = %self.core.id(),
                    current_version = existing.version,
                    version = table_info.version,
                    "Table info already at this schema epoch"
                );
                return false;
            }
        }

        info!(
            dispatcher_id = %self.core.id(),
            table = %table_info.qualified_name(),
            version = table_info.version,
            "Table info initialized"
        );
        *current = Some(Arc::new(table_info));
        true
    }

    fn table_info(&self) -> Option<Arc<TableInfo>> {
        self.table_info.read().clone()
    }
}
