//! In-process demo event service
//!
//! Answers dispatcher registrations on the event-service topic by streaming
//! synthetic feeds back to the collector until the dispatcher is removed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use dashmap::DashMap;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use contracts::{
    compose_ts, ContractError, DispatcherId, EventFeed, Message, MessageCenter, MessageHandler,
    RegisterDispatcherRequest, RowChange, RowOp, TargetMessage, Ts, TxnEvent, EVENT_FEED_TOPIC,
    EVENT_SERVICE_TOPIC,
};
use messaging::LocalMessageCenter;

/// Synthetic producer bound to one message center
pub struct DemoEventService {
    producers: Arc<DashMap<String, JoinHandle<()>>>,
    feeds_sent: Arc<AtomicU64>,
}

impl DemoEventService {
    /// Bind the service to `center`'s event-service topic
    pub fn install(
        center: &Arc<LocalMessageCenter>,
        feed_interval: Duration,
    ) -> Result<Self, ContractError> {
        let producers: Arc<DashMap<String, JoinHandle<()>>> = Arc::new(DashMap::new());
        let feeds_sent = Arc::new(AtomicU64::new(0));

        let weak_center = Arc::downgrade(center);
        let handler_producers = Arc::clone(&producers);
        let handler_feeds = Arc::clone(&feeds_sent);
        let handler: MessageHandler = Arc::new(move |msg: TargetMessage| {
            let weak_center = weak_center.clone();
            let producers = Arc::clone(&handler_producers);
            let feeds_sent = Arc::clone(&handler_feeds);
            async move {
                let Message::RegisterDispatcherRequest(req) = msg.message else {
                    debug!(message_type = ?msg.message_type, "Demo service ignoring message");
                    return Ok(());
                };
                if req.remove {
                    if let Some((_, producer)) = producers.remove(&req.dispatcher_id) {
                        producer.abort();
                        info!(dispatcher_id = %req.dispatcher_id, "Demo producer stopped");
                    }
                    return Ok(());
                }

                let dispatcher_id = DispatcherId::parse(&req.dispatcher_id)?;
                info!(
                    dispatcher_id = %dispatcher_id,
                    table_span = %req.table_span,
                    start_ts = req.start_ts,
                    "Demo producer started"
                );
                let producer = tokio::spawn(produce(
                    weak_center,
                    req.clone(),
                    dispatcher_id,
                    feed_interval,
                    feeds_sent,
                ));
                if let Some(previous) = producers.insert(req.dispatcher_id, producer) {
                    previous.abort();
                }
                Ok::<(), ContractError>(())
            }
            .boxed()
        });
        center.register_handler(EVENT_SERVICE_TOPIC, handler)?;

        Ok(Self {
            producers,
            feeds_sent,
        })
    }

    pub fn feeds_sent(&self) -> u64 {
        self.feeds_sent.load(Ordering::Relaxed)
    }

    /// Stop every producer still running
    pub fn shutdown(&self) {
        self.producers.retain(|_, producer| {
            producer.abort();
            false
        });
    }
}

/// Stream feeds for one dispatcher until aborted or the center is gone
async fn produce(
    center: Weak<LocalMessageCenter>,
    req: RegisterDispatcherRequest,
    dispatcher_id: DispatcherId,
    feed_interval: Duration,
    feeds_sent: Arc<AtomicU64>,
) {
    let mut ticker = tokio::time::interval(feed_interval);
    let mut last_ts = req.start_ts;
    let mut seq: u64 = 0;

    loop {
        ticker.tick().await;
        let Some(center) = center.upgrade() else {
            return;
        };

        let commit_ts = now_ts().max(last_ts + 1);
        let mut feed = EventFeed::resolved(dispatcher_id, commit_ts);
        // Trigger spans only carry watermarks
        if !req.table_span.is_trigger() {
            feed = feed.with_events(vec![synthetic_txn(req.table_span.table_id, commit_ts, seq)]);
        }
        last_ts = commit_ts;
        seq += 1;

        let msg = TargetMessage::new(req.server_id.clone(), EVENT_FEED_TOPIC, Message::EventFeed(feed));
        match center.send_event(msg) {
            Ok(()) => {
                feeds_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!(dispatcher_id = %dispatcher_id, error = %e, "Demo feed not sent"),
        }
    }
}

fn synthetic_txn(table_id: i64, commit_ts: Ts, seq: u64) -> TxnEvent {
    TxnEvent {
        table_id,
        start_ts: commit_ts.saturating_sub(1),
        commit_ts,
        rows: vec![RowChange {
            op: RowOp::Insert,
            key: Bytes::from(seq.to_be_bytes().to_vec()),
            value: Some(Bytes::from(format!("row-{seq}"))),
            old_value: None,
        }],
    }
}

/// Wall-clock timestamp in the commit-ts domain
pub fn now_ts() -> Ts {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    compose_ts(ms, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::TableSpan;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_registration_starts_and_removal_stops_feeds() {
        let center = Arc::new(LocalMessageCenter::new("n1"));
        let service = DemoEventService::install(&center, Duration::from_millis(10)).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: MessageHandler = Arc::new(move |msg: TargetMessage| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(msg);
                Ok::<(), ContractError>(())
            }
            .boxed()
        });
        center.register_handler(EVENT_FEED_TOPIC, sink).unwrap();

        let id = DispatcherId::new();
        let mut req = RegisterDispatcherRequest {
            dispatcher_id: id.to_string(),
            table_span: TableSpan::whole_table(3),
            remove: false,
            start_ts: 0,
            server_id: "n1".into(),
        };
        center
            .send_event(TargetMessage::new(
                "n1".into(),
                EVENT_SERVICE_TOPIC,
                Message::RegisterDispatcherRequest(req.clone()),
            ))
            .unwrap();

        let msg = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        match msg.message {
            Message::EventFeed(feed) => {
                assert_eq!(feed.dispatcher_id, id.to_string());
                assert_eq!(feed.txn_events.len(), 1);
                assert_eq!(feed.txn_events[0].table_id, 3);
            }
            other => panic!("unexpected message {other:?}"),
        }

        req.remove = true;
        center
            .send_event(TargetMessage::new(
                "n1".into(),
                EVENT_SERVICE_TOPIC,
                Message::RegisterDispatcherRequest(req),
            ))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let sent = service.feeds_sent();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.feeds_sent(), sent);
    }
}
