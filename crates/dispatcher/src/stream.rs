//! EventReceiver - downstream end of a dispatcher's output stream

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use contracts::{DispatcherEvent, DispatcherId, Ts};

use crate::memory::MemoryUsage;

/// Receiving half of a dispatcher stream.
///
/// Transaction events keep their bytes accounted until the consumer calls
/// [`EventReceiver::release`], which is what lets the collector's quota see
/// a slow downstream. Dropping the receiver discards whatever is still
/// queued and frees all of the dispatcher's accounted bytes.
#[derive(Debug)]
pub struct EventReceiver {
    dispatcher_id: DispatcherId,
    rx: mpsc::UnboundedReceiver<DispatcherEvent>,
    memory: Arc<MemoryUsage>,
}

impl EventReceiver {
    pub(crate) fn new(
        dispatcher_id: DispatcherId,
        rx: mpsc::UnboundedReceiver<DispatcherEvent>,
        memory: Arc<MemoryUsage>,
    ) -> Self {
        Self {
            dispatcher_id,
            rx,
            memory,
        }
    }

    pub fn dispatcher_id(&self) -> DispatcherId {
        self.dispatcher_id
    }

    /// Next event; `None` once the dispatcher is gone and the stream is empty
    pub async fn recv(&mut self) -> Option<DispatcherEvent> {
        self.rx.recv().await
    }

    /// Next event if one is ready
    pub fn try_recv(&mut self) -> Option<DispatcherEvent> {
        self.rx.try_recv().ok()
    }

    /// Events waiting in the stream
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Free the memory accounted for `event`; returns bytes freed
    pub fn release(&self, event: &DispatcherEvent) -> u64 {
        match event {
            DispatcherEvent::Txn { event, .. } => {
                self.memory.release(event.commit_ts, event.memory_cost())
            }
            _ => 0,
        }
    }

    pub fn memory_usage(&self) -> &MemoryUsage {
        &self.memory
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        // Close first so no event is accounted after the final release
        self.rx.close();
        let mut discarded = 0usize;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        let freed = self.memory.release_up_to(Ts::MAX);
        if freed > 0 {
            debug!(
                dispatcher_id = %self.dispatcher_id,
                discarded,
                freed_bytes = freed,
                "Event stream dropped with undrained events"
            );
        }
    }
}
