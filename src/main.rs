use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lease_manager::config::{Config, StorageBackend};
use lease_manager::lease::LeaseManager;
use lease_manager::storage::{Database, InMemoryStore, LeaseStore};
use lease_manager::{api, expiration, pool, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "lease-manager starting");

    // Load configuration
    let config = Config::load()?;

    let store: Arc<dyn LeaseStore> = match config.storage.backend {
        StorageBackend::Redb => {
            let db = Database::open(&config.storage.data_dir)?;
            info!("Database opened at: {}", config.storage.data_dir);
            Arc::new(db)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; leases will not survive a restart");
            Arc::new(InMemoryStore::new())
        }
    };

    // Expand and seed the identifier pool
    let identifiers = pool::expand_patterns(&config.pool.patterns);
    if identifiers.is_empty() {
        anyhow::bail!("IDENTIFIER_PATTERNS expanded to an empty pool");
    }

    let leases = LeaseManager::new(store, config.leases.stale_timeout());
    leases.seed(&identifiers)?;

    let state = Arc::new(AppState {
        config: config.clone(),
        leases,
    });

    // Start background tasks
    let sweeper_handle = expiration::start_sweeper(Arc::clone(&state));

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!("Listening on: {}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down background tasks");
    sweeper_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, draining connections");
}
