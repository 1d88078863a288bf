//! LogSink - logs event summaries via tracing

use contracts::{ContractError, DispatcherEvent, DispatcherId, EventSink};
use tracing::{info, instrument};

/// Sink that logs event summaries for debugging
pub struct LogSink {
    name: String,
    written: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            written: 0,
        }
    }

    /// Events logged so far
    pub fn written(&self) -> u64 {
        self.written
    }

    fn log_event_summary(&self, dispatcher_id: DispatcherId, event: &DispatcherEvent) {
        match event {
            DispatcherEvent::Txn { event, table_info } => info!(
                sink = %self.name,
                dispatcher_id = %dispatcher_id,
                table_id = event.table_id,
                commit_ts = event.commit_ts,
                rows = event.rows.len(),
                schema_version = table_info.as_ref().map(|t| t.version),
                "Transaction received"
            ),
            DispatcherEvent::SyncPoint { ts } => info!(
                sink = %self.name,
                dispatcher_id = %dispatcher_id,
                sync_point_ts = ts,
                "Sync point received"
            ),
            DispatcherEvent::ResolvedTs(ts) => info!(
                sink = %self.name,
                dispatcher_id = %dispatcher_id,
                resolved_ts = ts,
                "Resolved ts received"
            ),
        }
    }
}

impl EventSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, event),
        fields(sink = %self.name, ts = event.ts())
    )]
    async fn write(
        &mut self,
        dispatcher_id: DispatcherId,
        event: &DispatcherEvent,
    ) -> Result<(), ContractError> {
        self.log_event_summary(dispatcher_id, event);
        self.written += 1;
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, written = self.written, "LogSink closed");
        Ok(())
    }
}
