//! transfer_service - account ledger backend
//!
//! Serves the ledger engine over HTTP, backed by PostgreSQL when
//! `DATABASE_URL` is set and by memory otherwise.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transfer_service::api::{self, AppState};
use transfer_service::db;
use transfer_service::events::{
    DynEventPublisher, EventDispatcher, HttpEventPublisher, LogEventPublisher,
};
use transfer_service::store::{MemoryStore, PgStore};
use transfer_service::{Config, LedgerEngine, LogFormat};

/// Initialize tracing/logging
fn init_tracing(format: LogFormat) {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "transfer_service=debug,tower_http=debug".into()),
    );

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn build_publisher(config: &Config) -> anyhow::Result<DynEventPublisher> {
    match config.event_sink_url.as_deref() {
        Some(url) => {
            tracing::info!("Publishing events to {}", url);
            Ok(Arc::new(HttpEventPublisher::new(url, config.publish_timeout())?))
        }
        None => {
            tracing::info!("EVENT_SINK_URL not set, events will only be logged");
            Ok(Arc::new(LogEventPublisher))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting transfer service");

    let dispatcher = EventDispatcher::new(build_publisher(&config)?, config.retry_policy());

    let (engine, pool) = match config.database_url.as_deref() {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = db::connect(url, config.database_max_connections).await?;
            db::verify_connection(&pool).await?;

            if !db::check_schema(&pool).await? {
                tracing::error!("Database schema is not complete. Please run migrations.");
                return Err(anyhow::anyhow!("Database schema incomplete"));
            }

            tracing::info!("Database connected successfully");
            let store = Arc::new(PgStore::new(pool.clone()));
            (
                LedgerEngine::with_store(store, dispatcher, config.ledger_options()),
                Some(pool),
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store; data will not persist");
            let store = Arc::new(MemoryStore::new());
            (
                LedgerEngine::with_store(store, dispatcher, config.ledger_options()),
                None,
            )
        }
    };

    let app = api::build_router(AppState::new(engine));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutting down...");
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed");
    }
    tracing::info!("Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
