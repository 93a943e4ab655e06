use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cadence_api::config::ServerConfig;
use cadence_api::router::build_app_router;
use cadence_api::state::AppState;
use cadence_engine::{
    EngineConfig, GenerationQueue, HttpAssetFetcher, HttpAutomationDriver, HttpGenerationProvider,
    ImageQueue, PublishQueue, Scheduler,
};
use cadence_store::{Ledger, PgLedger};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence_api=debug,cadence_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let engine_config = EngineConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = cadence_store::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    cadence_store::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    cadence_store::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let ledger: Arc<dyn Ledger> = Arc::new(PgLedger::new(pool.clone()));

    // --- Collaborators ---
    let provider = Arc::new(HttpGenerationProvider::new(
        engine_config.provider_url.clone(),
        engine_config.provider_timeout,
    ));
    let driver = Arc::new(HttpAutomationDriver::new(
        engine_config.driver_url.clone(),
        engine_config.driver_timeout,
    ));
    let fetcher = Arc::new(HttpAssetFetcher::new(engine_config.download_timeout));

    // --- Queues ---
    let generation = GenerationQueue::new(
        Arc::clone(&ledger),
        provider,
        engine_config.provider_timeout,
        engine_config.asset_root.clone(),
    );
    let publish = PublishQueue::new(
        Arc::clone(&ledger),
        driver,
        engine_config.driver_timeout,
        engine_config.publish_retry_policy(),
    );
    let images = ImageQueue::new(
        Arc::clone(&ledger),
        fetcher,
        engine_config.asset_root.clone(),
        engine_config.image_batch_size,
        engine_config.image_max_attempts,
    );

    // --- Scheduler ---
    let scheduler = Scheduler::new(
        Arc::clone(&ledger),
        generation.clone(),
        publish.clone(),
        images.clone(),
        engine_config,
    );
    scheduler.start().await;
    tracing::info!("Scheduler started");

    // --- App state ---
    let state = AppState {
        ledger,
        scheduler: scheduler.clone(),
        generation,
        publish,
        images,
        config: Arc::new(config.clone()),
        pool: Some(pool),
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    tokio::time::timeout(Duration::from_secs(5), scheduler.stop())
        .await
        .ok();
    tracing::info!("Scheduler stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
