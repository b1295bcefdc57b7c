//! Entry point: parses configuration, wires up the orchestrator client,
//! descriptor cache, Alert Store, Event Broker, dispatcher worker pool and
//! job lifecycle observer, then runs the HTTP/metrics servers concurrently
//! with `tokio::join!` until a shutdown signal arrives (§5, §6, §9's
//! single-bootstrap-phase discipline).
//!
//! Grounded on `ph_operator::main`'s shape: telemetry init, client
//! construction, one `tokio::join!` driving every long-running task to
//! completion.

mod config;
mod dispatcher;
mod http;
mod metrics;
mod registry;
mod state;
mod telemetry;

use std::sync::Arc;

use alert_store::{local::LocalStore, replicated::{ReplicatedConfig, ReplicatedStore}, AlertStore};
use clap::Parser;
use config::{AlertStoreType, Config};
use event_broker::EventBroker;
use orchestrator_client::OrchestratorClient;
use state::AppState;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const DISPATCH_QUEUE_CAPACITY: usize = 256;

async fn build_alert_store(config: &Config) -> anyhow::Result<Arc<dyn AlertStore>> {
    let store: Arc<dyn AlertStore> = match config.alert_store_type {
        AlertStoreType::Local => Arc::new(LocalStore::new(config.alert_store_size)),
        AlertStoreType::Replicated => {
            let node_id = config
                .gossip_node_id
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--gossip-node-id is required for a replicated alert store"))?;
            let listen_addr = config
                .gossip_listen_addr
                .ok_or_else(|| anyhow::anyhow!("--gossip-listen-addr is required for a replicated alert store"))?;
            let advertise_addr = config.gossip_advertise_addr.unwrap_or(listen_addr);
            Arc::new(ReplicatedStore::new(ReplicatedConfig {
                node_id,
                cluster_id: config.gossip_cluster_id.clone(),
                listen_addr,
                advertise_addr,
                seed_nodes: config.gossip_seeds.clone(),
                capacity: config.alert_store_size,
            }))
        }
    };
    store.initialize().await?;
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::parse());
    let _telemetry = telemetry::init(&config.log_level)?;
    info!("openfero starting");

    let orchestrator = Arc::new(OrchestratorClient::connect(config.kubeconfig.as_deref()).await?);

    let descriptor_cache = orchestrator.start_descriptor_cache();
    OrchestratorClient::wait_for_cache_sync(&descriptor_cache, config.read_timeout()).await?;
    info!("descriptor cache synced");

    let store = build_alert_store(&config).await?;
    info!(store_type = ?config.alert_store_type, "alert store initialized");

    let broker = EventBroker::default();
    let metrics_broker = broker.clone();
    let (dispatch_tx, dispatch_rx) = mpsc::channel(DISPATCH_QUEUE_CAPACITY);

    let state = Arc::new(AppState::new(
        config.clone(),
        orchestrator.clone(),
        descriptor_cache,
        store.clone(),
        broker,
        dispatch_tx,
    ));
    state.mark_store_initialized();

    let registry = Arc::new(metrics::create_and_register_metrics()?);

    let shutdown = CancellationToken::new();

    let mut worker_handles = dispatcher::spawn_workers(
        state.clone(),
        dispatch_rx,
        config.worker_pool_size,
        shutdown.clone(),
    );

    let watch_handle = orchestrator.watch_jobs(&config.job_destination_namespace, config.label_selector.clone());
    let observer_handle = dispatcher::spawn_observer(state.clone(), watch_handle, shutdown.clone());

    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install ctrl-c handler");
            return;
        }
        info!("shutdown signal received");
        shutdown_for_signal.cancel();
    });

    let http_state = state.clone();
    let http_shutdown = shutdown.clone();
    let http_port = config.http_port;
    let http_server = async move {
        tokio::select! {
            _ = http::run_http_server(http_state, http_port) => {}
            _ = http_shutdown.cancelled() => {
                info!("stopping HTTP server");
            }
        }
    };

    let metrics_shutdown = shutdown.clone();
    let metrics_registry = registry.clone();
    let metrics_port = config.metrics_port;
    let metrics_server = async move {
        tokio::select! {
            _ = http::run_metrics_server(metrics_registry, metrics_broker, metrics_port) => {}
            _ = metrics_shutdown.cancelled() => {
                info!("stopping metrics server");
            }
        }
    };

    tokio::join!(http_server, metrics_server);

    info!(
        grace_seconds = config.shutdown_grace_seconds,
        "shutting down dispatch workers and job observer"
    );
    shutdown.cancel();
    drop(state);
    let grace = config.shutdown_grace();
    let drain = async {
        for handle in worker_handles.drain(..) {
            let _ = handle.await;
        }
        let _ = observer_handle.await;
    };
    if tokio::time::timeout(grace, drain).await.is_err() {
        error!("shutdown grace period elapsed with workers still draining");
    }

    store.close().await?;
    info!("openfero stopped");
    Ok(())
}
