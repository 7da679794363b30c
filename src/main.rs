use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use guardian_recovery::admin::{self, AdminService};
use guardian_recovery::alephium::{
    AlephiumClient, AlephiumWatcher, ConfirmedEvents, ConfirmedEventsHandler, MainChainClassifier,
};
use guardian_recovery::api::{self, AppState};
use guardian_recovery::bounded_cache::BoundedHashCache;
use guardian_recovery::codec::Vaa;
use guardian_recovery::config::Config;
use guardian_recovery::governance::GovernanceInjector;
use guardian_recovery::hash::bytes32_to_hex;
use guardian_recovery::ingest::{IngestWorker, SignedVaaWithQuorum};
use guardian_recovery::recovery::{BackfillClient, RecoveryService, RecoveryStores};
use guardian_recovery::store::{self, PgStore};

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("Starting guardian recovery service");

    let config = Config::load()?;
    tracing::info!(
        node_url = %config.alephium.node_url,
        contracts = config.alephium.contracts.len(),
        min_confirmations = config.alephium.min_confirmations,
        local_chain = %config.recovery.local_chain(),
        backfill_nodes = config.recovery.backfill_nodes.len(),
        guardian_set_index = config.guardian.guardian_set_index,
        "Configuration loaded"
    );

    let pool = store::postgres::create_pool(&config.database.url).await?;
    tracing::info!("Database connected");

    store::postgres::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let store = Arc::new(PgStore::new(pool));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signal_token.cancel();
    });

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // Signed VAA ingestion: backfilled VAAs are verified here before storage
    let (ingest_tx, ingest_rx) =
        mpsc::channel::<SignedVaaWithQuorum>(config.guardian.ingest_queue_size);
    let worker = IngestWorker::new(
        store.clone(),
        config.guardian.guardian_set()?,
        BoundedHashCache::new(
            config.guardian.dedupe_cache_size,
            config.guardian.dedupe_cache_ttl(),
        ),
    );
    tasks.push(tokio::spawn(worker.run(ingest_rx, shutdown.clone())));

    // Governance VAAs go to the external signing pipeline; here they are logged
    let (governance_tx, governance_rx) = mpsc::channel::<Vaa>(config.guardian.ingest_queue_size);
    tasks.push(tokio::spawn(log_governance_vaas(
        governance_rx,
        shutdown.clone(),
    )));

    let recovery = RecoveryService::new(
        RecoveryStores::from_single(store.clone()),
        BackfillClient::new(Arc::new(ingest_tx), config.recovery.backfill_timeout()),
        config.recovery.poll_config(),
        config.recovery.local_chain(),
    );
    let admin_service = Arc::new(AdminService::new(
        recovery,
        GovernanceInjector::new(Arc::new(governance_tx)),
        config.guardian.guardian_set_index,
        config.recovery.backfill_nodes.clone(),
        shutdown.clone(),
    ));
    let admin_addr = config.api.admin_listen_addr;
    let admin_token = shutdown.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = admin::start_admin_server(admin_addr, admin_service, admin_token).await {
            tracing::error!(error = %e, "Admin server error");
        }
    }));

    // One watcher task per contract so cycles never overlap for a contract
    let client = AlephiumClient::new(
        &config.alephium.node_url,
        config.alephium.api_key.clone(),
        config.alephium.request_timeout(),
    )?;
    let watcher = Arc::new(AlephiumWatcher::new(
        client,
        config.alephium.confirmation_policy(),
        config.alephium.event_batch_size,
    ));
    for contract in config.alephium.contracts.clone() {
        let watcher = watcher.clone();
        let store = store.clone();
        let token = shutdown.clone();
        let poll_interval = config.alephium.poll_interval();
        tasks.push(tokio::spawn(async move {
            watcher
                .run(
                    &contract,
                    store.as_ref(),
                    &MainChainClassifier,
                    &EventLogger,
                    poll_interval,
                    token,
                )
                .await;
        }));
    }
    if config.alephium.contracts.is_empty() {
        tracing::warn!("ALEPHIUM_CONTRACTS is empty, no event watchers started");
    }

    let api_addr = config.api.listen_addr;
    let api_state = AppState::new(config.alephium.contracts.clone(), store.clone());
    let api_token = shutdown.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = api::start_api_server(api_addr, api_state, api_token).await {
            tracing::error!(error = %e, "API server error");
        }
    }));

    tracing::info!(tasks = tasks.len(), "Services started");

    shutdown.cancelled().await;
    for result in futures::future::join_all(tasks).await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Task panicked during shutdown");
        }
    }

    tracing::info!("Guardian recovery service stopped");
    Ok(())
}

/// Hands confirmed events to the message-construction path. That path lives
/// outside this service, so events are logged.
struct EventLogger;

#[async_trait]
impl ConfirmedEventsHandler for EventLogger {
    async fn handle(&self, confirmed: &ConfirmedEvents) -> eyre::Result<()> {
        for event in &confirmed.events {
            tracing::info!(
                contract = %confirmed.contract_address,
                index = event.index,
                tx_id = %event.event.tx_id,
                block_hash = %event.event.block_hash,
                event_index = event.event.event_index,
                fields = event.event.fields.len(),
                "Confirmed event"
            );
        }
        Ok(())
    }
}

async fn log_governance_vaas(mut receiver: mpsc::Receiver<Vaa>, cancel: CancellationToken) {
    loop {
        let vaa = tokio::select! {
            _ = cancel.cancelled() => break,
            vaa = receiver.recv() => match vaa {
                Some(vaa) => vaa,
                None => break,
            },
        };
        tracing::info!(
            sequence = vaa.sequence,
            nonce = vaa.nonce,
            guardian_set_index = vaa.guardian_set_index,
            digest = %bytes32_to_hex(&vaa.signing_digest()),
            vaa = %hex::encode(vaa.serialize()),
            "Governance VAA ready for signing"
        );
    }
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,guardian_recovery=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .with(filter)
            .init();
    }
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
