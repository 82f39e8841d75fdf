use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use eyre::WrapErr;

use lockmint_relayer::api::{self, new_stats};
use lockmint_relayer::config::{Config, StorageConfig};
use lockmint_relayer::contracts::lock_event_filter;
use lockmint_relayer::orchestrator::RelayOrchestrator;
use lockmint_relayer::reader::EvmChainReader;
use lockmint_relayer::scanner::EventScanner;
use lockmint_relayer::sink::{DryRunSink, EvmRelaySink, RelaySink};
use lockmint_relayer::state::{
    load_or_init, JsonFileStateStore, MemoryStateStore, PgStateStore, StateStore,
};

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    // Run the async main
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    // Load configuration first so LOG_FORMAT can pick the formatter
    let config = Config::load()?;
    init_logging(config.json_logs());

    tracing::info!("Starting lock-and-mint relayer");
    tracing::info!(
        source_rpc = %config.source.rpc_url,
        source_fallbacks = config.source.rpc_fallback_urls.len(),
        source_bridge = %config.source.bridge_address,
        dest_rpc = %config.destination.rpc_url,
        dest_bridge = %config.destination.bridge_address,
        start_block = config.relay.start_block,
        reorg_safety_margin = config.relay.reorg_safety_margin,
        max_chunk_size = config.relay.max_chunk_size,
        dry_run = config.relay.dry_run,
        "Configuration loaded"
    );

    // Source chain
    let reader = Arc::new(EvmChainReader::new(
        &config.source.all_rpc_urls(),
        config.relay.rpc_timeout(),
    )?);
    let source_chain_id = reader
        .check_connectivity()
        .await
        .wrap_err("Source chain unreachable")?;
    tracing::info!(chain_id = source_chain_id, "Source chain connected");

    // Destination chain
    let evm_sink = EvmRelaySink::new(
        &config.destination.rpc_url,
        &config.destination.bridge_address,
        &config.destination.private_key,
        config.relay.rpc_timeout(),
        config.relay.receipt_timeout(),
    )?;
    let dest_chain_id = evm_sink
        .check_connectivity()
        .await
        .wrap_err("Destination chain unreachable")?;
    tracing::info!(
        chain_id = dest_chain_id,
        relayer = %evm_sink.relayer_address(),
        "Destination chain connected"
    );

    let sink: Arc<dyn RelaySink> = if config.relay.dry_run {
        tracing::warn!("RELAY_DRY_RUN enabled: mints are logged, not submitted");
        Arc::new(DryRunSink)
    } else {
        Arc::new(evm_sink)
    };

    // Relay state
    let store: Arc<dyn StateStore> = match &config.storage {
        StorageConfig::Memory => {
            tracing::warn!("No STATE_FILE or DATABASE_URL set; progress is not persisted");
            Arc::new(MemoryStateStore::new())
        }
        StorageConfig::File(path) => Arc::new(JsonFileStateStore::new(path.clone())),
        StorageConfig::Postgres { url } => {
            let store = PgStateStore::connect(url, &config.relay.relayer_id).await?;
            tracing::info!("Database connected");
            Arc::new(store)
        }
    };
    let state = load_or_init(store.as_ref(), config.relay.start_block)
        .await
        .wrap_err_with(|| format!("Failed to load relay state from {}", store.describe()))?;
    tracing::info!(
        last_processed_block = state.last_processed_block(),
        processed_nonces = state.processed_nonces().len(),
        store = %store.describe(),
        "Relay state loaded"
    );

    let source_bridge = Address::from_str(&config.source.bridge_address)
        .wrap_err("Invalid source bridge address")?;
    let scanner = EventScanner::new(
        reader,
        lock_event_filter(source_bridge),
        config.relay.max_chunk_size,
    );

    let stats = new_stats(&config.relay.relayer_id, config.relay.dry_run);
    let mut orchestrator =
        RelayOrchestrator::new(scanner, sink, store, state, config.relay.settings())
            .with_stats(stats.clone());

    // Start metrics/API server
    let bind_address = config.api.bind_address.clone();
    let port = config.api.port;
    tokio::spawn(async move {
        if let Err(e) = api::start_server(&bind_address, port, stats).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    // Setup signal handler
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    orchestrator.run(shutdown_rx).await;

    tracing::info!("Lock-and-mint relayer stopped");
    Ok(())
}

/// Initialize tracing/logging with structured output
fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lockmint_relayer=debug"));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
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
