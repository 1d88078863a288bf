//! # Integration Tests
//!
//! End-to-end tests over the in-process message center.
//!
//! - Contract smoke tests
//! - Collector + dispatcher + drain pipeline against a scripted event service
//! - Node-wide backpressure across dispatchers

#[cfg(test)]
mod contract_tests {
    use contracts::{DispatcherId, EVENT_FEED_TOPIC, EVENT_SERVICE_TOPIC};

    #[test]
    fn test_topics_are_distinct() {
        assert_ne!(EVENT_FEED_TOPIC, EVENT_SERVICE_TOPIC);
    }

    #[test]
    fn test_dispatcher_id_text_round_trip() {
        let id = DispatcherId::new();
        assert_eq!(DispatcherId::parse(&id.to_string()).unwrap(), id);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::{Arc, Weak};

    use bytes::Bytes;
    use futures::FutureExt;
    use parking_lot::Mutex;
    use tokio::time::{sleep, timeout, Duration};

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        compose_ts, physical_ms, ContractError, DispatcherEvent, DispatcherId, EventFeed,
        EventSink, Message, MessageCenter, MessageHandler, RegisterDispatcherRequest, RowChange,
        RowOp, TableSpan, TargetMessage, Ts, TxnEvent, EVENT_FEED_TOPIC, EVENT_SERVICE_TOPIC,
    };
    use dispatcher::{Dispatcher, DispatcherBuilder, DrainHandle, LogSink};
    use event_collector::EventCollector;
    use messaging::LocalMessageCenter;

    type Script = dyn Fn(&RegisterDispatcherRequest) -> Vec<EventFeed> + Send + Sync;

    /// Event service stand-in: records control requests and answers every
    /// registration with the feeds produced by its script.
    struct FakeEventService {
        requests: Arc<Mutex<Vec<RegisterDispatcherRequest>>>,
    }

    impl FakeEventService {
        fn install(center: &Arc<LocalMessageCenter>, script: Arc<Script>) -> Self {
            let requests = Arc::new(Mutex::new(Vec::new()));
            let weak_center: Weak<LocalMessageCenter> = Arc::downgrade(center);
            let recorded = Arc::clone(&requests);

            let handler: MessageHandler = Arc::new(move |msg: TargetMessage| {
                let weak_center = weak_center.clone();
                let recorded = Arc::clone(&recorded);
                let script = Arc::clone(&script);
                async move {
                    let Message::RegisterDispatcherRequest(req) = msg.message else {
                        return Ok(());
                    };
                    recorded.lock().push(req.clone());
                    if req.remove {
                        return Ok(());
                    }
                    let Some(center) = weak_center.upgrade() else {
                        return Ok(());
                    };
                    for feed in script(&req) {
                        center.send_event(TargetMessage::new(
                            req.server_id.clone(),
                            EVENT_FEED_TOPIC,
                            Message::EventFeed(feed),
                        ))?;
                    }
                    Ok::<(), ContractError>(())
                }
                .boxed()
            });
            center
                .register_handler(EVENT_SERVICE_TOPIC, handler)
                .expect("event service topic is free");

            Self { requests }
        }

        fn requests(&self) -> Vec<RegisterDispatcherRequest> {
            self.requests.lock().clone()
        }
    }

    /// Sink keeping every event it is given
    struct RecordingSink {
        events: Arc<Mutex<Vec<DispatcherEvent>>>,
    }

    impl EventSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn write(
            &mut self,
            _dispatcher_id: DispatcherId,
            event: &DispatcherEvent,
        ) -> Result<(), ContractError> {
            self.events.lock().push(event.clone());
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    fn txn(table_id: i64, commit_ts: Ts, payload: usize) -> TxnEvent {
        TxnEvent {
            table_id,
            start_ts: commit_ts - 1,
            commit_ts,
            rows: vec![RowChange {
                op: RowOp::Insert,
                key: Bytes::from_static(b"pk"),
                value: Some(Bytes::from(vec![0u8; payload])),
                old_value: None,
            }],
        }
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..100 {
            if done() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(done(), "condition not reached in time");
    }

    const NODE_TOML: &str = r#"
server_id = "n1"

[collector]
global_memory_quota = 1048576

[sync_point]
enabled = true
interval_secs = 1
"#;

    /// Config -> collector -> event service -> dispatcher -> sink
    #[tokio::test]
    async fn test_e2e_feed_pipeline() {
        let config = ConfigLoader::load_from_str(NODE_TOML, ConfigFormat::Toml).unwrap();
        let center = Arc::new(LocalMessageCenter::new(config.server_id.clone()));

        // Reply to each registration with two transactions around the next
        // sync-point boundary
        let service = FakeEventService::install(
            &center,
            Arc::new(|req: &RegisterDispatcherRequest| {
                let base = physical_ms(req.start_ts);
                let first = compose_ts(base + 500, 0);
                let second = compose_ts(base + 1_500, 0);
                let id = DispatcherId::parse(&req.dispatcher_id).unwrap();
                vec![EventFeed::resolved(id, second)
                    .with_events(vec![txn(1, first, 16), txn(1, second, 16)])]
            }),
        );

        let collector = EventCollector::new(
            config.collector_config(),
            Arc::clone(&center) as Arc<dyn MessageCenter>,
        )
        .unwrap();

        let start_ts = compose_ts(1_000, 0);
        let mut builder = DispatcherBuilder::new(TableSpan::whole_table(1)).start_ts(start_ts);
        if let Some(sync_point) = config.sync_point_config() {
            builder = builder.sync_point(sync_point);
        }
        let (d1, rx) = builder.build_table();
        let d1: Arc<dyn Dispatcher> = Arc::new(d1);

        let events = Arc::new(Mutex::new(Vec::new()));
        let drain = DrainHandle::spawn(
            rx,
            RecordingSink {
                events: Arc::clone(&events),
            },
        );

        collector.register_dispatcher(Arc::clone(&d1), start_ts).unwrap();
        wait_until(|| drain.metrics().write_count() == 4).await;

        assert_eq!(
            *events.lock(),
            vec![
                DispatcherEvent::Txn {
                    event: txn(1, compose_ts(1_500, 0), 16),
                    table_info: None
                },
                DispatcherEvent::SyncPoint {
                    ts: compose_ts(2_000, 0)
                },
                DispatcherEvent::Txn {
                    event: txn(1, compose_ts(2_500, 0), 16),
                    table_info: None
                },
                DispatcherEvent::ResolvedTs(compose_ts(2_500, 0)),
            ]
        );
        assert_eq!(d1.resolved_ts(), compose_ts(2_500, 0));
        wait_until(|| collector.global_memory().used_bytes() == 0).await;

        collector.remove_dispatcher(d1.as_ref()).unwrap();
        wait_until(|| service.requests().len() == 2).await;
        let requests = service.requests();
        assert!(!requests[0].remove);
        assert_eq!(requests[0].start_ts, start_ts);
        assert!(requests[1].remove);
        assert_eq!(requests[1].start_ts, 0);

        // The stream closes once the last owner lets go of the dispatcher
        drop(d1);
        timeout(Duration::from_secs(1), drain.join())
            .await
            .unwrap()
            .unwrap();
    }

    /// A feed for a slow dispatcher holds back feeds for every dispatcher
    /// until memory is drained.
    #[tokio::test]
    async fn test_e2e_backpressure_across_dispatchers() {
        let center = Arc::new(LocalMessageCenter::new("n1"));
        let service = FakeEventService::install(
            &center,
            Arc::new(|req: &RegisterDispatcherRequest| {
                let id = DispatcherId::parse(&req.dispatcher_id).unwrap();
                let commit_ts = req.start_ts + 10;
                vec![EventFeed::resolved(id, commit_ts)
                    .with_events(vec![txn(req.table_span.table_id, commit_ts, 4096)])]
            }),
        );

        let config = config_loader::NodeConfig {
            collector: config_loader::CollectorSection {
                global_memory_quota: 1024,
                dispatcher_memory_quota: None,
            },
            ..config_loader::NodeConfig::new("n1")
        };
        let collector = EventCollector::new(
            config.collector_config(),
            Arc::clone(&center) as Arc<dyn MessageCenter>,
        )
        .unwrap();

        let (slow, slow_rx) = DispatcherBuilder::new(TableSpan::whole_table(1)).build_table();
        let slow: Arc<dyn Dispatcher> = Arc::new(slow);
        collector.register_dispatcher(Arc::clone(&slow), 100).unwrap();
        wait_until(|| slow.resolved_ts() == 110).await;
        assert!(collector.global_memory().used_bytes() > 1024);

        let (fast, mut fast_rx) = DispatcherBuilder::new(TableSpan::whole_table(2)).build_table();
        let fast: Arc<dyn Dispatcher> = Arc::new(fast);
        collector.register_dispatcher(Arc::clone(&fast), 200).unwrap();
        wait_until(|| collector.is_paused()).await;
        assert!(fast_rx.try_recv().is_none());
        assert_eq!(service.requests().len(), 2);

        // Draining the slow dispatcher lifts the pause
        let drain = DrainHandle::spawn(slow_rx, LogSink::new("slow"));
        let first = timeout(Duration::from_secs(1), fast_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.ts(), 210);
        assert!(!collector.is_paused());

        collector.remove_dispatcher(slow.as_ref()).unwrap();
        drop(slow);
        drain.join().await.unwrap();
    }

    /// Feeds arriving after removal never reach the dispatcher
    #[tokio::test]
    async fn test_e2e_feed_after_removal_is_dropped() {
        let center = Arc::new(LocalMessageCenter::new("n1"));
        let _service = FakeEventService::install(&center, Arc::new(|_: &RegisterDispatcherRequest| vec![]));
        let collector = EventCollector::new(
            config_loader::NodeConfig::new("n1").collector_config(),
            Arc::clone(&center) as Arc<dyn MessageCenter>,
        )
        .unwrap();

        let (d1, mut rx) = DispatcherBuilder::trigger().start_ts(5).build_trigger();
        let d1: Arc<dyn Dispatcher> = Arc::new(d1);
        collector.register_dispatcher(Arc::clone(&d1), 5).unwrap();
        collector.remove_dispatcher(d1.as_ref()).unwrap();

        center
            .send_event(TargetMessage::new(
                "n1".into(),
                EVENT_FEED_TOPIC,
                Message::EventFeed(EventFeed::resolved(d1.id(), 50)),
            ))
            .unwrap();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(center.stats().handler_errors, 0);
        assert!(rx.try_recv().is_none());
        assert_eq!(d1.resolved_ts(), 5);
        assert_eq!(collector.dispatcher_count(), 0);
    }
}
