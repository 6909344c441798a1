//! Process entry point: loads configuration, wires venue adapters into the
//! ingestion orchestrator, starts the health scheduler and the metrics HTTP
//! endpoint, and runs until `Ctrl-C` or the ingestion plan completes.

mod config;

use anyhow::Context;
use config::{AppConfig, CheckpointConfig};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use xchange_core::shutdown::{self, Shutdown};
use xchange_core::time::now_ms;
use xchange_exchange::adapter::{binance::{BinanceAdapter, BinanceCredentials}, bybit::{BybitAdapter, BybitCredentials}, VenueAdapter};
use xchange_ingestion::{ColumnarCheckpointStore, InMemorySink, IngestionPlan, LocalFileCheckpointStore, Orchestrator};
use xchange_monitor::{AlertEngine, AlertEngineConfig, EventLoopDelayChecker, HealthChecker, HealthScheduler, MemoryHeapChecker, MetricRegistry, Notifier};
use xchange_schema::Symbol;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    xchange_core::logging::init_logging();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "xchange.toml".to_string());
    let config = AppConfig::load(std::path::Path::new(&config_path))
        .with_context(|| format!("loading configuration from {config_path}"))?;

    let (shutdown_handle, shutdown) = shutdown::channel();

    let adapters = build_adapters(&config)?;
    let checkpoints = build_checkpoint_store(&config.checkpoint).await?;
    let sink = Arc::new(InMemorySink::new());

    let metrics = Arc::new(MetricRegistry::new());
    let alerts = Arc::new(AlertEngine::new(AlertEngineConfig {
        dedupe_window_ms: config.monitor.dedupe_window_ms,
        max_alert_history: config.monitor.max_alert_history,
    }));
    let channels = config.notify.iter().cloned().map(Into::into).collect();
    let notifier = Arc::new(Notifier::new(channels));

    let health = Arc::new(HealthScheduler::new(
        vec![
            Arc::new(MemoryHeapChecker {
                warn_bytes: 1 << 30,
                crit_bytes: 2 << 30,
            }) as Arc<dyn HealthChecker>,
            Arc::new(EventLoopDelayChecker {
                warn_ms: 100,
                crit_ms: 1_000,
            }),
        ],
        Arc::clone(&alerts),
    ));

    let health_task = spawn_health_loop(
        Arc::clone(&health),
        Arc::clone(&notifier),
        Duration::from_millis(config.monitor.health_interval_ms),
        shutdown.clone(),
    );
    let metrics_task = spawn_metrics_endpoint(Arc::clone(&metrics), config.metrics_addr.clone(), shutdown.clone());

    let ctrl_c_handle = shutdown_handle;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            ctrl_c_handle.trigger();
        }
    });

    let orchestrator = Orchestrator::new(adapters, checkpoints, sink, shutdown.clone());
    let plan = build_plan(&config)?;
    info!(tasks = plan.tasks.len(), "starting ingestion");
    let events = orchestrator.run(plan).await;
    for event in &events {
        match event {
            xchange_ingestion::IngestionEvent::Complete { task, total } => {
                info!(venue = %task.venue, symbol = %task.symbol, total, "task complete")
            }
            xchange_ingestion::IngestionEvent::Error { task, message } => {
                error!(venue = %task.venue, symbol = %task.symbol, message = %message, "task failed")
            }
            _ => {}
        }
    }

    health_task.abort();
    metrics_task.abort();
    Ok(())
}

fn build_adapters(config: &AppConfig) -> anyhow::Result<IndexMap<SmolStr, Arc<dyn VenueAdapter>>> {
    let mut adapters: IndexMap<SmolStr, Arc<dyn VenueAdapter>> = IndexMap::new();
    for venue in &config.venues {
        let adapter: Arc<dyn VenueAdapter> = match venue.name.as_str() {
            "binance" => Arc::new(BinanceAdapter::new(
                venue
                    .api_key
                    .as_ref()
                    .zip(venue.api_secret.as_ref())
                    .map(|(api_key, api_secret)| BinanceCredentials {
                        api_key: api_key.clone(),
                        api_secret: api_secret.clone(),
                    }),
            )),
            "bybit" => Arc::new(BybitAdapter::new(
                venue
                    .api_key
                    .as_ref()
                    .zip(venue.api_secret.as_ref())
                    .map(|(api_key, api_secret)| BybitCredentials {
                        api_key: api_key.clone(),
                        api_secret: api_secret.clone(),
                    }),
            )),
            other => anyhow::bail!("unknown venue in configuration: {other}"),
        };
        adapters.insert(SmolStr::new(&venue.name), adapter);
    }
    Ok(adapters)
}

async fn build_checkpoint_store(
    config: &CheckpointConfig,
) -> anyhow::Result<Arc<dyn xchange_ingestion::CheckpointStore>> {
    match config {
        CheckpointConfig::LocalFile { dir } => {
            let store = LocalFileCheckpointStore::open(dir)
                .await
                .with_context(|| format!("opening checkpoint directory {dir}"))?;
            Ok(Arc::new(store))
        }
        CheckpointConfig::Columnar => Ok(Arc::new(ColumnarCheckpointStore::new())),
    }
}

fn build_plan(config: &AppConfig) -> anyhow::Result<IngestionPlan> {
    let venues: Vec<SmolStr> = config.venues.iter().map(|v| SmolStr::new(&v.name)).collect();
    let symbols: Vec<Symbol> = config
        .ingestion
        .symbols
        .iter()
        .map(|s| Symbol::new(s.as_str()))
        .collect();
    anyhow::ensure!(!venues.is_empty(), "configuration must list at least one venue");
    anyhow::ensure!(!symbols.is_empty(), "configuration must list at least one symbol");
    anyhow::ensure!(
        !config.ingestion.data_types.is_empty(),
        "configuration must list at least one data type"
    );
    Ok(IngestionPlan::cartesian(
        &venues,
        &symbols,
        &config.ingestion.data_types,
        config.ingestion.start_ms,
        config.ingestion.end_ms,
        config.ingestion.concurrency,
        config.ingestion.batch_size,
        Duration::from_millis(config.ingestion.request_delay_ms),
        config.ingestion.timeframe.clone(),
    ))
}

fn spawn_health_loop(
    health: Arc<HealthScheduler>,
    notifier: Arc<Notifier>,
    interval: Duration,
    mut shutdown: Shutdown,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = health.tick(now_ms()).await;
                    if let Some(alert) = &report.fired_alert {
                        let results = notifier.send(alert).await;
                        for (channel, ok) in results {
                            if !ok {
                                warn!(%channel, "alert notification failed");
                            }
                        }
                    }
                }
                _ = shutdown.triggered() => break,
            }
        }
    })
}

fn spawn_metrics_endpoint(
    metrics: Arc<MetricRegistry>,
    addr: String,
    mut shutdown: Shutdown,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(err) => {
                error!(%addr, error = %err, "failed to bind metrics endpoint");
                return;
            }
        };
        info!(%addr, "metrics endpoint listening");
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let Ok((mut stream, _)) = accepted else { continue };
                    let body = metrics.expose();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                }
                _ = shutdown.triggered() => break,
            }
        }
    })
}
