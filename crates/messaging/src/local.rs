//! LocalMessageCenter - topic-addressed delivery inside one process

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use contracts::{ContractError, MessageCenter, MessageHandler, ServerId, TargetMessage, Topic};

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageCenterStats {
    /// Messages handed to a local handler
    pub delivered: u64,
    /// Messages forwarded to the outbox
    pub forwarded: u64,
    /// Sends rejected
    pub failed: u64,
    /// Local handler invocations that returned an error
    pub handler_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    forwarded: AtomicU64,
    failed: AtomicU64,
    handler_errors: AtomicU64,
}

/// Message center for a single node.
///
/// A message addressed to this node on a topic with a local handler is
/// delivered by spawning the handler on the current tokio runtime, so
/// independent messages are handled concurrently. Any other message goes to
/// the outbox when one is attached and fails otherwise.
pub struct LocalMessageCenter {
    server_id: ServerId,
    handlers: DashMap<Topic, MessageHandler>,
    outbox: Option<mpsc::UnboundedSender<TargetMessage>>,
    /// Topics whose sends fail (failure injection)
    failing_topics: Mutex<HashSet<Topic>>,
    counters: Arc<Counters>,
}

impl LocalMessageCenter {
    /// Create a center with no link to peers
    pub fn new(server_id: impl Into<ServerId>) -> Self {
        Self {
            server_id: server_id.into(),
            handlers: DashMap::new(),
            outbox: None,
            failing_topics: Mutex::new(HashSet::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Create a center whose non-local traffic lands in the returned receiver
    pub fn with_outbox(
        server_id: impl Into<ServerId>,
    ) -> (Self, mpsc::UnboundedReceiver<TargetMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut center = Self::new(server_id);
        center.outbox = Some(tx);
        (center, rx)
    }

    /// Make every send on `topic` fail until [`Self::heal`] is called
    pub fn fail_sends_on(&self, topic: Topic) {
        self.failing_topics.lock().insert(topic);
    }

    /// Stop injecting failures on `topic`
    pub fn heal(&self, topic: Topic) {
        self.failing_topics.lock().remove(&topic);
    }

    /// Whether a handler is bound to `topic`
    pub fn has_handler(&self, topic: Topic) -> bool {
        self.handlers.contains_key(&topic)
    }

    /// Snapshot of delivery counters
    pub fn stats(&self) -> MessageCenterStats {
        MessageCenterStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            forwarded: self.counters.forwarded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            handler_errors: self.counters.handler_errors.load(Ordering::Relaxed),
        }
    }

    fn reject(&self, msg: &TargetMessage, reason: &str) -> ContractError {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        warn!(
            to = %msg.to,
            topic = %msg.topic,
            message_type = ?msg.message_type,
            reason,
            "Send rejected"
        );
        ContractError::send(&msg.to, msg.topic, reason)
    }

    fn deliver_local(&self, handler: MessageHandler, msg: TargetMessage) -> Result<(), ContractError> {
        let runtime = Handle::try_current().map_err(|_| self.reject(&msg, "no tokio runtime"))?;
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);

        let topic = msg.topic;
        let message_type = msg.message_type;
        let counters = Arc::clone(&self.counters);
        runtime.spawn(async move {
            if let Err(e) = handler(msg).await {
                counters.handler_errors.fetch_add(1, Ordering::Relaxed);
                warn!(topic = %topic, message_type = ?message_type, error = %e, "Message handler failed");
            }
        });
        Ok(())
    }
}

impl MessageCenter for LocalMessageCenter {
    fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    #[instrument(name = "message_center_register_handler", skip(self, handler), fields(topic = %topic))]
    fn register_handler(&self, topic: Topic, handler: MessageHandler) -> Result<(), ContractError> {
        match self.handlers.entry(topic) {
            Entry::Occupied(_) => Err(ContractError::HandlerAlreadyRegistered { topic }),
            Entry::Vacant(vacant) => {
                vacant.insert(handler);
                debug!(topic = %topic, "Handler registered");
                Ok(())
            }
        }
    }

    fn deregister_handler(&self, topic: Topic) {
        if self.handlers.remove(&topic).is_some() {
            debug!(topic = %topic, "Handler deregistered");
        }
    }

    fn send_event(&self, msg: TargetMessage) -> Result<(), ContractError> {
        if self.failing_topics.lock().contains(&msg.topic) {
            return Err(self.reject(&msg, "injected send failure"));
        }

        if msg.to == self.server_id {
            // Clone the handler out so no shard guard outlives this call
            let handler = self.handlers.get(&msg.topic).map(|h| h.value().clone());
            if let Some(handler) = handler {
                return self.deliver_local(handler, msg);
            }
        }

        match &self.outbox {
            Some(outbox) => {
                if outbox.send(msg.clone()).is_err() {
                    return Err(self.reject(&msg, "outbox closed"));
                }
                self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None if msg.to == self.server_id => Err(self.reject(&msg, "no handler for topic")),
            None => Err(self.reject(&msg, "unknown peer")),
        }
    }
}
