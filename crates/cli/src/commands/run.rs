//! `run` command implementation.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use config_loader::{ConfigLoader, NodeConfig};
use contracts::{MessageCenter, TableSpan, Ts};
use dispatcher::{Dispatcher, DispatcherBuilder, DrainHandle, EventReceiver, LogSink};
use event_collector::EventCollector;
use messaging::LocalMessageCenter;

use super::demo::{now_ts, DemoEventService};
use crate::cli::{Cli, RunArgs};

/// A registered dispatcher and the task draining it
struct Registered {
    dispatcher: Arc<dyn Dispatcher>,
    drain: DrainHandle,
}

impl std::fmt::Debug for Registered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registered").finish_non_exhaustive()
    }
}

/// Execute the `run` command
pub async fn run_collector(cli: &Cli, args: &RunArgs) -> Result<()> {
    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }
    let config = ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    init_observability(cli, args, &config)?;
    info!(
        server_id = %config.server_id,
        global_memory_quota = config.collector.global_memory_quota,
        tables = args.tables,
        "Configuration loaded"
    );

    let center = Arc::new(LocalMessageCenter::new(config.server_id.clone()));
    let service = DemoEventService::install(&center, Duration::from_millis(args.feed_interval_ms))
        .context("Failed to start demo event service")?;
    let collector = EventCollector::new(
        config.collector_config(),
        Arc::clone(&center) as Arc<dyn MessageCenter>,
    )
    .context("Failed to start event collector")?;

    let start_ts = now_ts();
    let dispatchers = build_dispatchers(&config, args, start_ts);
    let registered = match register_all(&collector, dispatchers, start_ts).await {
        Ok(registered) => registered,
        Err(e) => {
            service.shutdown();
            return Err(e);
        }
    };

    let shutdown_signal = setup_shutdown_signal();
    let timeout = async {
        match args.timeout {
            0 => std::future::pending::<()>().await,
            secs => tokio::time::sleep(Duration::from_secs(secs)).await,
        }
    };
    tokio::select! {
        _ = shutdown_signal => warn!("Received shutdown signal, stopping collector..."),
        _ = timeout => info!(timeout_secs = args.timeout, "Run time elapsed, stopping collector..."),
    }

    shutdown(&collector, &service, registered).await;
    info!(feeds_sent = service.feeds_sent(), "CDC collector finished");
    Ok(())
}

fn init_observability(cli: &Cli, args: &RunArgs, config: &NodeConfig) -> Result<()> {
    let mut obs = config.observability_config();
    if let Some(format) = cli.log_format {
        obs.log_format = format.into();
    }
    if let Some(level) = cli.log_level_override() {
        obs.default_log_level = level.to_string();
    }
    if let Some(port) = args.metrics_port {
        obs.metrics_port = (port != 0).then_some(port);
    }
    observability::init_with_config(obs)
}

/// Table dispatchers for `1..=tables`, plus the trigger dispatcher if asked
fn build_dispatchers(
    config: &NodeConfig,
    args: &RunArgs,
    start_ts: Ts,
) -> Vec<(Arc<dyn Dispatcher>, EventReceiver)> {
    let mut builders: Vec<(DispatcherBuilder, bool)> = (1..=i64::from(args.tables))
        .map(|table_id| (DispatcherBuilder::new(TableSpan::whole_table(table_id)), false))
        .collect();
    if args.with_trigger {
        builders.push((DispatcherBuilder::trigger(), true));
    }

    builders
        .into_iter()
        .map(|(mut builder, is_trigger)| {
            builder = builder.start_ts(start_ts);
            if let Some(sync_point) = config.sync_point_config() {
                builder = builder.sync_point(sync_point);
            }
            if is_trigger {
                let (d, rx) = builder.build_trigger();
                (Arc::new(d) as Arc<dyn Dispatcher>, rx)
            } else {
                let (d, rx) = builder.build_table();
                (Arc::new(d) as Arc<dyn Dispatcher>, rx)
            }
        })
        .collect()
}

/// Start a drain task per dispatcher and register it with `collector`.
///
/// On the first failure every dispatcher registered so far is removed again
/// and its drain task joined before the error is returned.
async fn register_all(
    collector: &EventCollector,
    dispatchers: Vec<(Arc<dyn Dispatcher>, EventReceiver)>,
    start_ts: Ts,
) -> Result<Vec<Registered>> {
    let mut registered = Vec::with_capacity(dispatchers.len());
    for (dispatcher, receiver) in dispatchers {
        let sink = LogSink::new(format!("log-{}", dispatcher.table_span().table_id));
        let drain = DrainHandle::spawn(receiver, sink);
        if let Err(e) = collector.register_dispatcher(Arc::clone(&dispatcher), start_ts) {
            let id = dispatcher.id();
            // Closes the stream so this drain task ends on its own
            drop(dispatcher);
            warn!(
                dispatcher_id = %id,
                error = %e,
                rolled_back = registered.len(),
                "Registration failed, removing dispatchers"
            );
            remove_all(collector, registered).await;
            if let Err(join_err) = drain.join().await {
                warn!(error = %join_err, "Drain task failed");
            }
            return Err(e).with_context(|| format!("Failed to register dispatcher {id}"));
        }
        registered.push(Registered { dispatcher, drain });
    }

    info!(count = registered.len(), "Dispatchers registered");
    Ok(registered)
}

async fn shutdown(collector: &EventCollector, service: &DemoEventService, registered: Vec<Registered>) {
    remove_all(collector, registered).await;
    service.shutdown();
}

/// Remove each dispatcher from `collector` and wait for its drain task
async fn remove_all(collector: &EventCollector, registered: Vec<Registered>) {
    for Registered { dispatcher, drain } in registered {
        if let Err(e) = collector.remove_dispatcher(dispatcher.as_ref()) {
            warn!(dispatcher_id = %dispatcher.id(), error = %e, "Remove request failed");
        }
        let snapshot = dispatcher.metrics().snapshot();
        let resolved_ts = dispatcher.resolved_ts();
        let metrics = Arc::clone(drain.metrics());
        drop(dispatcher);

        // Feeds already in flight may still hold the dispatcher briefly
        match tokio::time::timeout(Duration::from_secs(5), drain.join()).await {
            Ok(Ok(())) => info!(
                events_pushed = snapshot.events_pushed,
                sync_points = snapshot.sync_points,
                resolved_ts,
                written = metrics.write_count(),
                failed = metrics.failure_count(),
                "Dispatcher drained"
            ),
            Ok(Err(e)) => warn!(error = %e, "Drain task failed"),
            Err(_) => warn!(resolved_ts, "Drain task did not finish in time"),
        }
    }
}

/// Setup Ctrl+C and SIGTERM signal handlers
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Message, EVENT_SERVICE_TOPIC};
    use event_collector::CollectorConfig;

    #[tokio::test]
    async fn test_failed_registration_removes_earlier_dispatchers() {
        let (center, mut outbox) = LocalMessageCenter::with_outbox("n1");
        let center = Arc::new(center);
        let collector = EventCollector::new(
            CollectorConfig::new("n1", 1 << 20),
            Arc::clone(&center) as Arc<dyn MessageCenter>,
        )
        .unwrap();

        // The second dispatcher reuses the first one's id, so it is refused
        let (first, first_rx) = DispatcherBuilder::new(TableSpan::whole_table(1)).build_table();
        let (second, second_rx) = DispatcherBuilder::new(TableSpan::whole_table(2))
            .with_id(first.id())
            .build_table();
        let first_id = first.id();
        let dispatchers: Vec<(Arc<dyn Dispatcher>, EventReceiver)> =
            vec![(Arc::new(first), first_rx), (Arc::new(second), second_rx)];

        let err = register_all(&collector, dispatchers, 100).await.unwrap_err();
        assert!(err.to_string().contains(&first_id.to_string()));
        assert_eq!(collector.dispatcher_count(), 0);

        let requests: Vec<_> = std::iter::from_fn(|| outbox.try_recv().ok())
            .map(|msg| {
                assert_eq!(msg.topic, EVENT_SERVICE_TOPIC);
                match msg.message {
                    Message::RegisterDispatcherRequest(req) => req,
                    other => panic!("unexpected message {other:?}"),
                }
            })
            .collect();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].remove);
        assert!(requests[1].remove);
        assert_eq!(requests[1].dispatcher_id, first_id.to_string());
    }
}
