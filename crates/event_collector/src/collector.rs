//! EventCollector - dispatcher registry and inbound feed routing

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use contracts::{
    CollectorConfig, ContractError, DispatcherId, DispatcherSpeedRatio, EventFeed, Message,
    MessageCenter, MessageHandler, RegisterDispatcherRequest, ServerId, TargetMessage, Ts,
    EVENT_FEED_TOPIC, EVENT_SERVICE_TOPIC,
};
use dispatcher::{Dispatcher, GlobalMemoryUsage};
use observability::metrics::{self, FeedDropReason};

/// Registry slot of one dispatcher
#[derive(Clone)]
struct DispatcherEntry {
    dispatcher: Arc<dyn Dispatcher>,
    /// Held while one feed is applied, so feeds never interleave
    feed_lock: Arc<Mutex<()>>,
}

impl DispatcherEntry {
    fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            dispatcher,
            feed_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Node-local hub routing event feeds to dispatchers.
///
/// Registration and removal talk to the event service through the injected
/// [`MessageCenter`]; inbound feeds arrive on [`EVENT_FEED_TOPIC`] through a
/// handler bound for the collector's lifetime.
///
/// Feeds for one dispatcher are applied one at a time in arrival order.
/// Feeds for different dispatchers proceed concurrently, except that all of
/// them wait while buffered memory across the node exceeds the quota.
pub struct EventCollector {
    server_id: ServerId,
    config: CollectorConfig,
    message_center: Arc<dyn MessageCenter>,
    dispatchers: DashMap<DispatcherId, DispatcherEntry>,
    global_memory: Arc<GlobalMemoryUsage>,
    paused: AtomicBool,
    handler_registered: AtomicBool,
}

impl EventCollector {
    /// Create a collector and bind its feed handler on `message_center`.
    ///
    /// # Errors
    /// `HandlerAlreadyRegistered` if another collector already listens on
    /// the center.
    #[instrument(name = "event_collector_new", skip_all, fields(server_id = %config.server_id))]
    pub fn new(
        config: CollectorConfig,
        message_center: Arc<dyn MessageCenter>,
    ) -> Result<Arc<Self>, ContractError> {
        if message_center.server_id() != &config.server_id {
            warn!(
                center = %message_center.server_id(),
                "Collector server id differs from the message center's"
            );
        }

        let collector = Arc::new(Self {
            server_id: config.server_id.clone(),
            config,
            message_center,
            dispatchers: DashMap::new(),
            global_memory: Arc::new(GlobalMemoryUsage::new()),
            paused: AtomicBool::new(false),
            handler_registered: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&collector);
        let handler: MessageHandler = Arc::new(move |msg: TargetMessage| {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(collector) => collector.recv_events_message(msg).await,
                    // Collector is shutting down
                    None => Ok(()),
                }
            }
            .boxed()
        });
        collector
            .message_center
            .register_handler(EVENT_FEED_TOPIC, handler)?;
        collector.handler_registered.store(true, Ordering::Release);

        info!(
            global_memory_quota = collector.config.global_memory_quota,
            dispatcher_memory_quota = ?collector.config.dispatcher_memory_quota,
            "Event collector started"
        );
        Ok(collector)
    }

    pub fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Number of registered dispatchers
    pub fn dispatcher_count(&self) -> usize {
        self.dispatchers.len()
    }

    pub fn contains(&self, id: DispatcherId) -> bool {
        self.dispatchers.contains_key(&id)
    }

    /// Node-wide buffered memory of registered dispatchers
    pub fn global_memory(&self) -> &Arc<GlobalMemoryUsage> {
        &self.global_memory
    }

    /// Whether inbound feeds are currently held back by the memory quota
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Register `dispatcher` and ask the event service to feed it from
    /// `start_ts`.
    ///
    /// The dispatcher is visible to inbound feeds before the request goes
    /// out, so the first feed cannot be missed. If the request cannot be
    /// sent the registration is undone.
    #[instrument(
        name = "event_collector_register",
        skip(self, dispatcher),
        fields(dispatcher_id = %dispatcher.id(), table_span = %dispatcher.table_span())
    )]
    pub fn register_dispatcher(
        &self,
        dispatcher: Arc<dyn Dispatcher>,
        start_ts: Ts,
    ) -> Result<(), ContractError> {
        let id = dispatcher.id();
        match self.dispatchers.entry(id) {
            Entry::Occupied(_) => {
                warn!("Dispatcher already registered");
                return Err(ContractError::DispatcherAlreadyRegistered { dispatcher_id: id });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(DispatcherEntry::new(Arc::clone(&dispatcher)));
            }
        }

        let request = RegisterDispatcherRequest {
            dispatcher_id: id.to_string(),
            table_span: dispatcher.table_span().clone(),
            remove: false,
            start_ts,
            server_id: self.server_id.clone(),
        };
        if let Err(e) = self.send_control(Message::RegisterDispatcherRequest(request)) {
            self.dispatchers.remove(&id);
            warn!(error = %e, "Register request not sent, registration rolled back");
            return Err(e);
        }

        if !dispatcher
            .memory_usage()
            .attach(Arc::clone(&self.global_memory))
        {
            warn!("Dispatcher memory already accounted by another collector");
        }

        metrics::record_registered_dispatchers(self.dispatchers.len());
        info!(start_ts, "Dispatcher registered");
        Ok(())
    }

    /// Unregister `dispatcher` and ask the event service to stop feeding it.
    ///
    /// Feeds arriving after this call are dropped even if the request fails.
    /// Bytes the dispatcher still buffers stop counting against the node
    /// quota.
    #[instrument(
        name = "event_collector_remove",
        skip(self, dispatcher),
        fields(dispatcher_id = %dispatcher.id(), table_span = %dispatcher.table_span())
    )]
    pub fn remove_dispatcher(&self, dispatcher: &dyn Dispatcher) -> Result<(), ContractError> {
        let id = dispatcher.id();
        match self.dispatchers.remove(&id) {
            Some((_, entry)) => {
                let detached = entry.dispatcher.memory_usage().detach();
                if detached > 0 {
                    debug!(detached_bytes = detached, "Buffered bytes left the node quota");
                }
            }
            None => debug!("Dispatcher was not registered"),
        }
        metrics::record_registered_dispatchers(self.dispatchers.len());

        let request = RegisterDispatcherRequest {
            dispatcher_id: id.to_string(),
            table_span: dispatcher.table_span().clone(),
            remove: true,
            start_ts: 0,
            server_id: self.server_id.clone(),
        };
        self.send_control(Message::RegisterDispatcherRequest(request))?;

        info!("Dispatcher removed");
        Ok(())
    }

    /// Apply one inbound event feed.
    ///
    /// # Errors
    /// `InvalidMessage` if the payload is not an event feed or its
    /// dispatcher id is malformed. Feeds for unknown dispatchers are dropped
    /// and reported as success.
    #[instrument(name = "event_collector_recv", skip_all, fields(message_type = ?msg.message_type))]
    pub async fn recv_events_message(&self, msg: TargetMessage) -> Result<(), ContractError> {
        let feed = match msg.message {
            Message::EventFeed(feed) => feed,
            other => {
                metrics::record_feed_dropped(FeedDropReason::InvalidPayload);
                return Err(ContractError::invalid_message(format!(
                    "expected EventFeed, got {:?}",
                    other.message_type()
                )));
            }
        };
        let dispatcher_id = DispatcherId::parse(&feed.dispatcher_id).inspect_err(|_| {
            metrics::record_feed_dropped(FeedDropReason::InvalidDispatcherId);
        })?;

        self.wait_for_memory().await;

        let Some(entry) = self.dispatchers.get(&dispatcher_id).map(|e| e.value().clone()) else {
            debug!(dispatcher_id = %dispatcher_id, "Feed for unknown dispatcher dropped");
            metrics::record_feed_dropped(FeedDropReason::UnknownDispatcher);
            return Ok(());
        };

        let _feed_guard = entry.feed_lock.lock().await;
        // An earlier feed for this dispatcher may have filled memory while
        // this one was queued
        self.wait_for_memory().await;
        if !self.dispatchers.contains_key(&dispatcher_id) {
            debug!(dispatcher_id = %dispatcher_id, "Dispatcher removed while feed was queued");
            metrics::record_feed_dropped(FeedDropReason::UnknownDispatcher);
            return Ok(());
        }
        self.apply_feed(entry.dispatcher.as_ref(), feed);
        Ok(())
    }

    fn apply_feed(&self, dispatcher: &dyn Dispatcher, feed: EventFeed) {
        let event_count = feed.txn_events.len();

        if let Some(table_info) = feed.table_info {
            match dispatcher.as_schema_initializable() {
                Some(schema) => {
                    let version = table_info.version;
                    if schema.init_table_info(table_info) {
                        debug!(dispatcher_id = %dispatcher.id(), version, "Table info applied");
                    }
                }
                None => warn!(
                    dispatcher_id = %dispatcher.id(),
                    "Dispatcher does not take table info, ignoring it"
                ),
            }
        }

        for event in feed.txn_events {
            dispatcher.push_event(event);
        }
        dispatcher.update_resolved_ts(feed.resolved_ts);

        metrics::record_feed_received(event_count);
        metrics::record_global_memory(
            self.global_memory.used_bytes(),
            self.config.global_memory_quota,
        );

        if let Some(limit) = self.config.dispatcher_memory_quota {
            if let Some(ratio) = dispatcher.memory_usage().update_speed_ratio(limit) {
                self.send_speed_ratio(dispatcher, ratio);
            }
        }
    }

    /// Hold the caller while node-wide memory is over quota
    async fn wait_for_memory(&self) {
        let quota = self.config.global_memory_quota;
        if !self.global_memory.exceeds(quota) {
            return;
        }

        let started = Instant::now();
        if !self.paused.swap(true, Ordering::AcqRel) {
            warn!(
                used_bytes = self.global_memory.used_bytes(),
                quota_bytes = quota,
                "Memory quota exceeded, pausing inbound feeds"
            );
            metrics::record_backpressure(true);
        }

        self.global_memory.wait_within(quota).await;

        if self.paused.swap(false, Ordering::AcqRel) {
            info!(
                used_bytes = self.global_memory.used_bytes(),
                waited_ms = started.elapsed().as_millis() as u64,
                "Memory back under quota, resuming inbound feeds"
            );
            metrics::record_backpressure(false);
        }
        metrics::record_pause_duration(started.elapsed());
    }

    fn send_speed_ratio(&self, dispatcher: &dyn Dispatcher, ratio: f32) {
        let dispatcher_id = dispatcher.id().to_string();
        metrics::record_speed_ratio(&dispatcher_id, ratio);
        let message = Message::DispatcherSpeedRatio(DispatcherSpeedRatio {
            dispatcher_id,
            table_span: dispatcher.table_span().clone(),
            ratio,
            server_id: self.server_id.clone(),
        });
        match self.send_control(message) {
            Ok(()) => debug!(dispatcher_id = %dispatcher.id(), ratio, "Speed ratio sent"),
            Err(e) => warn!(dispatcher_id = %dispatcher.id(), ratio, error = %e, "Speed ratio not sent"),
        }
    }

    /// Single attempt to deliver a control message to the event service
    fn send_control(&self, message: Message) -> Result<(), ContractError> {
        let message_type = message.message_type();
        let msg = TargetMessage::new(self.server_id.clone(), EVENT_SERVICE_TOPIC, message);
        let result = self.message_center.send_event(msg);
        metrics::record_control_message(message_type, result.is_ok());
        result
    }
}

impl Drop for EventCollector {
    fn drop(&mut self) {
        if self.handler_registered.load(Ordering::Acquire) {
            self.message_center.deregister_handler(EVENT_FEED_TOPIC);
            debug!(server_id = %self.server_id, "Event collector stopped");
        }
    }
}
