use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use patient_queue_cell::{
    BroadcastNotifier, InMemoryDoctorDirectory, QueueEngine, QueueEngineConfig, QueueState,
    RebalanceWorker, RebalanceWorkerConfig,
};
use shared_config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic queue API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());

    // Queue engine and collaborators
    let directory = InMemoryDoctorDirectory::new();
    let notifier = BroadcastNotifier::new(config.event_channel_capacity);
    let engine = Arc::new(QueueEngine::new(
        QueueEngineConfig::from(config.as_ref()),
        Arc::new(directory.clone()),
        Arc::new(notifier.clone()),
    ));

    let worker = Arc::new(RebalanceWorker::new(
        RebalanceWorkerConfig::from(config.as_ref()),
        engine.clone(),
    ));
    let worker_handle = worker.clone().spawn();

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create shared state
    let state = Arc::new(QueueState {
        engine,
        directory,
        notifier,
        triage: None,
        config: config.clone(),
    });

    // Build the application router
    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    worker.shutdown().await;
    if let Err(e) = worker_handle.await {
        warn!("Rebalance worker exited abnormally: {}", e);
    }

    info!("Clinic queue API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
