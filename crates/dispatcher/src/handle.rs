//! DrainTask / DrainHandle - drains a dispatcher stream into a sink

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use contracts::{ContractError, DispatcherEvent, DispatcherId, EventSink, Task};

use crate::metrics::DrainMetrics;
use crate::stream::EventReceiver;

/// Task that writes every event of one dispatcher to a sink.
///
/// Memory of a transaction is released once the sink has taken it (or failed
/// to). Every watermark triggers a flush. The task ends when the dispatcher
/// is dropped and the stream is empty.
pub struct DrainTask<S> {
    receiver: EventReceiver,
    sink: S,
    metrics: Arc<DrainMetrics>,
}

impl<S: EventSink> DrainTask<S> {
    pub fn new(receiver: EventReceiver, sink: S) -> Self {
        Self {
            receiver,
            sink,
            metrics: Arc::new(DrainMetrics::new()),
        }
    }

    pub fn metrics(&self) -> &Arc<DrainMetrics> {
        &self.metrics
    }

    async fn handle(&mut self, dispatcher_id: DispatcherId, event: DispatcherEvent) {
        match self.sink.write(dispatcher_id, &event).await {
            Ok(()) => self.metrics.inc_write_count(),
            Err(e) => {
                self.metrics.inc_failure_count();
                error!(
                    sink = %self.sink.name(),
                    dispatcher_id = %dispatcher_id,
                    ts = event.ts(),
                    error = %e,
                    "Write failed"
                );
                // Continue processing - don't crash on single failure
            }
        }
        self.receiver.release(&event);

        if matches!(event, DispatcherEvent::ResolvedTs(_)) {
            match self.sink.flush().await {
                Ok(()) => self.metrics.inc_flush_count(),
                Err(e) => error!(sink = %self.sink.name(), error = %e, "Flush failed"),
            }
        }
    }
}

impl<S: EventSink> Task for DrainTask<S> {
    #[instrument(
        name = "drain_task_execute",
        skip(self),
        fields(sink = %self.sink.name(), dispatcher_id = %self.receiver.dispatcher_id())
    )]
    async fn execute(&mut self) -> Result<(), ContractError> {
        let dispatcher_id = self.receiver.dispatcher_id();
        debug!("Drain task started");

        while let Some(event) = self.receiver.recv().await {
            self.handle(dispatcher_id, event).await;
        }

        // Cleanup
        if let Err(e) = self.sink.flush().await {
            error!(sink = %self.sink.name(), error = %e, "Flush failed on shutdown");
        }
        self.sink.close().await?;

        debug!("Drain task stopped");
        Ok(())
    }
}

/// Handle to a running drain task
pub struct DrainHandle {
    dispatcher_id: DispatcherId,
    metrics: Arc<DrainMetrics>,
    worker_handle: JoinHandle<Result<(), ContractError>>,
}

impl DrainHandle {
    /// Spawn a drain task for `receiver` on the tokio runtime
    pub fn spawn<S: EventSink + 'static>(receiver: EventReceiver, sink: S) -> Self {
        let dispatcher_id = receiver.dispatcher_id();
        let mut task = DrainTask::new(receiver, sink);
        let metrics = Arc::clone(task.metrics());
        let worker_handle = tokio::spawn(async move { task.execute().await });
        Self {
            dispatcher_id,
            metrics,
            worker_handle,
        }
    }

    pub fn dispatcher_id(&self) -> DispatcherId {
        self.dispatcher_id
    }

    pub fn metrics(&self) -> &Arc<DrainMetrics> {
        &self.metrics
    }

    /// Wait for the task to finish (the dispatcher must be dropped first)
    #[instrument(name = "drain_handle_join", skip(self), fields(dispatcher_id = %self.dispatcher_id))]
    pub async fn join(self) -> Result<(), ContractError> {
        match self.worker_handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = ?e, "Drain task panicked");
                Err(ContractError::Other(format!("drain task panicked: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dispatcher, DispatcherBuilder};
    use contracts::{TableSpan, TxnEvent};
    use parking_lot::Mutex;
    use tokio::time::{sleep, Duration};

    /// Mock sink for testing
    struct MockSink {
        name: String,
        written: Arc<Mutex<Vec<DispatcherEvent>>>,
        should_fail: bool,
        closed: Arc<Mutex<bool>>,
    }

    impl MockSink {
        fn new(should_fail: bool) -> Self {
            Self {
                name: "mock".into(),
                written: Arc::new(Mutex::new(Vec::new())),
                should_fail,
                closed: Arc::new(Mutex::new(false)),
            }
        }
    }

    impl EventSink for MockSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(
            &mut self,
            _dispatcher_id: DispatcherId,
            event: &DispatcherEvent,
        ) -> Result<(), ContractError> {
            if self.should_fail {
                return Err(ContractError::sink_write(&self.name, "mock failure"));
            }
            self.written.lock().push(event.clone());
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            *self.closed.lock() = true;
            Ok(())
        }
    }

    fn txn(commit_ts: u64) -> TxnEvent {
        TxnEvent {
            table_id: 1,
            start_ts: commit_ts - 1,
            commit_ts,
            rows: vec![],
        }
    }

    #[tokio::test]
    async fn test_drain_writes_in_order_and_releases_memory() {
        let (d, rx) = DispatcherBuilder::new(TableSpan::whole_table(1)).build_table();
        let sink = MockSink::new(false);
        let written = Arc::clone(&sink.written);
        let closed = Arc::clone(&sink.closed);
        let handle = DrainHandle::spawn(rx, sink);

        d.push_event(txn(10));
        d.push_event(txn(20));
        d.update_resolved_ts(20);

        for _ in 0..50 {
            if handle.metrics().write_count() == 3 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(d.memory_usage().used_bytes(), 0);

        drop(d);
        handle.join().await.unwrap();

        let ts: Vec<_> = written.lock().iter().map(DispatcherEvent::ts).collect();
        assert_eq!(ts, vec![10, 20, 20]);
        assert!(*closed.lock());
    }

    #[tokio::test]
    async fn test_drain_failure_isolation() {
        let (d, rx) = DispatcherBuilder::new(TableSpan::whole_table(1)).build_table();
        let handle = DrainHandle::spawn(rx, MockSink::new(true));

        d.push_event(txn(10));
        d.push_event(txn(11));
        drop(d);

        let metrics = Arc::clone(handle.metrics());
        handle.join().await.unwrap();
        assert_eq!(metrics.failure_count(), 2);
        assert_eq!(metrics.write_count(), 0);
    }
}
