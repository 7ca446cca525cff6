use anyhow::Result;
use faultline_alert::{AlertEvaluator, BandRule, ThresholdLimits, TrendConfig};
use faultline_common::types::DiagnosisResult;
use faultline_diagnosis::{fanout, DiagnosisConfig, DiagnosisEngine, FaultTreeConfig};
use faultline_ingest::{BusReceiver, Dispatcher, OrchestratorClient, Poller};
use faultline_recovery::{
    InMemoryStateManager, LaunchServiceAction, RecoveryConfig, RecoveryEngine, RuntimeStore,
    TrafficBreakerAction,
};
use faultline_server::app::{self, AppState};
use faultline_server::config::ServerConfig;
use faultline_state::{spawn_snapshot_task, SnapshotStore, StateStore};
use faultline_transport::AlertBus;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    faultline_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("faultline=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "configs/server.toml".to_string());
    let config = ServerConfig::load(&config_path)?;

    tracing::info!(
        http_port = config.http_port,
        fault_tree = %config.fault_tree_path,
        "faultline-server starting"
    );

    let cancel = CancellationToken::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // Metric/alert state, optionally restored from the last snapshot.
    let store = Arc::new(StateStore::with_ring_capacity(config.alert.ring_capacity));
    if config.snapshot.enabled {
        let snapshots = Arc::new(SnapshotStore::open(Path::new(&config.snapshot.path))?);
        match snapshots.restore(&store) {
            Ok(restored) => tracing::info!(restored, "Latest state restored from snapshot"),
            Err(e) => tracing::warn!(error = %e, "No snapshot restored"),
        }
        tasks.push(spawn_snapshot_task(
            store.clone(),
            snapshots,
            Duration::from_secs(config.snapshot.interval_secs),
            chrono::Duration::seconds(config.snapshot.retention_secs as i64),
            cancel.child_token(),
        ));
    }

    // Threshold + trend evaluation feeding the alert bus.
    let bands = if config.alert.band_rules.is_empty() {
        BandRule::default_rules()
    } else {
        config.alert.band_rules.clone()
    };
    let evaluator = AlertEvaluator::with_rules(
        store.clone(),
        ThresholdLimits::default(),
        bands,
        TrendConfig::default(),
    );
    let bus = Arc::new(AlertBus::new(config.alert.queue_capacity));

    // Fault-tree diagnosis.
    let tree = FaultTreeConfig::from_path(&config.fault_tree_path)?;
    let diagnosis = Arc::new(DiagnosisEngine::with_config(
        tree,
        DiagnosisConfig {
            state_ttl: config.diagnosis.state_ttl_secs.map(Duration::from_secs),
            sweep_interval: Duration::from_secs(config.diagnosis.sweep_interval_secs),
        },
    )?);
    if let Some(handle) = diagnosis.start_sweeper(cancel.child_token()) {
        tasks.push(handle);
    }

    // Recovery engine with actions registered from config.
    let state_manager = Arc::new(InMemoryStateManager::new());
    let runtime_store = Arc::new(RuntimeStore::new());
    let mut recovery = RecoveryEngine::new(
        state_manager,
        RecoveryConfig {
            queue_capacity: config.recovery.queue_capacity,
            action_timeout: Duration::from_millis(config.recovery.action_timeout_ms),
        },
    );
    let launcher = Arc::new(LaunchServiceAction::new(
        runtime_store.clone(),
        config.recovery.orchestrator_url.clone(),
        config.recovery.presets.clone(),
    ));
    for fault_code in config.recovery.presets.keys() {
        recovery.register_action(fault_code.clone(), launcher.clone());
    }
    let breaker = Arc::new(TrafficBreakerAction::new(
        runtime_store,
        config.recovery.orchestrator_url.clone(),
    ));
    for prefix in &config.recovery.breaker_prefixes {
        recovery.register_prefix_action(prefix.clone(), breaker.clone());
    }
    let recovery = Arc::new(recovery);
    tasks.push(recovery.start(cancel.child_token())?);

    // Diagnosis results go to the log and to recovery submission.
    let recovery_sink = recovery.clone();
    diagnosis.set_callback(fanout(vec![
        Arc::new(|result: &DiagnosisResult| {
            tracing::info!(
                diagnosis_id = %result.diagnosis_id,
                fault_code = %result.fault_code,
                source = %result.source,
                status = %result.status(),
                "Diagnosis emitted"
            );
        }),
        Arc::new(move |result: &DiagnosisResult| {
            if let Err(e) = recovery_sink.submit(result.clone()) {
                tracing::warn!(
                    diagnosis_id = %result.diagnosis_id,
                    error = %e,
                    "Recovery submission dropped"
                );
            }
        }),
    ]));

    // Alerts flow from the bus into the diagnosis engine.
    let diagnosis_handler = diagnosis.clone();
    bus.set_handler(move |alert| diagnosis_handler.process_alert(&alert));
    bus.start()?;

    // Ingest adapters.
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), evaluator, bus.clone()));
    let bus_receiver = Arc::new(BusReceiver::new(dispatcher.clone()));
    bus_receiver.start();
    if config.poll.enabled {
        let poller = Poller::new(
            OrchestratorClient::new(config.poll.base_url.clone()),
            dispatcher.clone(),
            Duration::from_secs(config.poll.interval_secs),
        );
        tasks.push(poller.spawn(cancel.child_token()));
    }

    // External HTTP surface.
    let router = app::build_router(AppState {
        recovery: recovery.clone(),
        bus: bus_receiver.clone(),
        store: store.clone(),
    });
    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "HTTP surface listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
        })
        .await?;

    tracing::info!("Shutting down");
    cancel.cancel();
    bus.stop().await;
    bus_receiver.stop().await;
    for task in tasks {
        task.abort();
    }
    tracing::info!("Server stopped");

    Ok(())
}
