use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mosaic_core::{
    executor::{BuildVrtStage, ExecutableStage, TranslateStage},
    kill_running_jobs, load_config, spawn_monitor_timer, validate_config, ArtifactPublisher,
    Catalog, ComputeCluster, ComputeMonitor, FsArtifactStore, HttpCatalog, HttpImageDownloader,
    ImageFetcher, ImageStaging, JobLayout, JobStore, LocalCommandCluster, ProcessChain,
    ProcessSupervisor, SqliteJobStore, WorkflowCoordinator, WorkflowParts,
};
use mosaic_server::api::create_router;
use mosaic_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long in-flight workflow work may run before the shutdown sweep
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("mosaicd {} starting", VERSION);

    // Determine config path
    let config_path = std::env::var("MOSAIC_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Staging root: {:?}", config.workspace.staging_root);

    // Create SQLite job store
    let job_store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::new(&config.database.path).context("Failed to create job store")?,
    );
    info!("Job store initialized");

    // Jobs left running by a previous process cannot be resumed
    let killed = kill_running_jobs(job_store.as_ref()).context("Startup recovery sweep failed")?;
    if killed > 0 {
        warn!("Startup recovery sweep killed {} job(s)", killed);
    }

    let layout = JobLayout::new(&config.workspace.staging_root);

    // Catalog
    let catalog: Arc<dyn Catalog> =
        Arc::new(HttpCatalog::new(&config.catalog).context("Failed to create catalog client")?);
    info!("Catalog client at {}", config.catalog.url);

    // Image fetching
    let downloader = Arc::new(
        HttpImageDownloader::new(&config.fetcher).context("Failed to create image downloader")?,
    );
    let fetcher = Arc::new(ImageFetcher::new(downloader));
    fetcher.start();
    info!(
        "Image fetcher started (cache {:?}, {} per host, {} total)",
        config.fetcher.cache_dir,
        config.fetcher.max_connections_per_host,
        config.fetcher.max_connections_total
    );

    let staging = ImageStaging::new(&config.workspace.pic_dir, &config.workspace.part_file_name);

    // Compute backend
    let cluster: Arc<dyn ComputeCluster> = Arc::new(LocalCommandCluster::new(
        config.compute.clone(),
        layout.clone(),
    ));
    info!("Compute backend: {}", cluster.name());

    // Post-process chain
    let supervisor = Arc::new(ProcessSupervisor::new(Duration::from_millis(
        config.executor.tick_interval_ms,
    )));
    supervisor.start();
    let stages: Vec<Arc<dyn ExecutableStage>> = vec![
        Arc::new(BuildVrtStage::new(
            config.executor.buildvrt_path.clone(),
            layout.clone(),
        )),
        Arc::new(TranslateStage::new(
            config.executor.translate_path.clone(),
            layout.clone(),
        )),
    ];
    let (chain_tx, chain_rx) = mpsc::unbounded_channel();
    let chain = Arc::new(ProcessChain::new(stages, Arc::clone(&supervisor), chain_tx));
    chain.start();
    info!("Post-process chain: {}", chain.stage_names().join(" -> "));

    // Artifact store
    let publisher: Arc<dyn ArtifactPublisher> =
        Arc::new(FsArtifactStore::new(config.publish.clone(), layout.clone()));

    // Compute monitor
    let (shutdown_tx, _) = broadcast::channel(1);
    let (compute_tx, compute_rx) = mpsc::unbounded_channel();
    let monitor = Arc::new(ComputeMonitor::new(
        Arc::clone(&job_store),
        Arc::clone(&cluster),
        staging.clone(),
        compute_tx,
    ));
    let monitor_handle = spawn_monitor_timer(
        monitor,
        Duration::from_millis(config.monitor.poll_interval_ms),
        shutdown_tx.subscribe(),
    );

    // Workflow coordinator
    let coordinator = Arc::new(WorkflowCoordinator::new(
        WorkflowParts {
            store: Arc::clone(&job_store),
            catalog,
            fetcher: Arc::clone(&fetcher),
            staging,
            cluster,
            chain: Arc::clone(&chain),
            publisher: Arc::clone(&publisher),
            page_size: config.catalog.page_size,
        },
        chain_rx,
        compute_rx,
    ));
    coordinator.start();

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&job_store),
        Arc::clone(&coordinator),
        publisher,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    // Stop background work before the final sweep
    let _ = shutdown_tx.send(());
    let _ = monitor_handle.await;
    if !coordinator.shutdown(SHUTDOWN_GRACE).await {
        warn!("Workflow coordinator did not stop within {:?}", SHUTDOWN_GRACE);
    }
    chain.stop();
    supervisor.stop();
    fetcher.stop();

    let killed =
        kill_running_jobs(job_store.as_ref()).context("Shutdown recovery sweep failed")?;
    if killed > 0 {
        warn!("Shutdown recovery sweep killed {} job(s)", killed);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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
