//! duva REST API server
//!
//! Serves the management API and, unless disabled, runs the scheduler
//! worker in the same process.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use duva_client::ObjectStoreStorage;
use duva_core::{
    SchedulerWorker, SecretCipher, StorageConfig, TracingFailureSink, TracingWorkerReporter,
    WorkerConfig,
};
use duva_db::run_migrations;

use duva_server::{AppState, ServerConfig, StackSettings, build_sync_service, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ServerConfig::parse();

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool)
        .await
        .context("Failed to apply migrations")?;
    info!("Database ready");

    let cipher =
        SecretCipher::from_secret_key(&config.secret_key).context("Invalid DUVA_SECRET_KEY")?;
    let storage_config = StorageConfig::from_env().context("Object storage is not configured")?;
    let storage =
        ObjectStoreStorage::from_config(&storage_config).context("Failed to open object storage")?;

    let sync_service = build_sync_service(
        pool.clone(),
        cipher.clone(),
        storage,
        Arc::new(TracingFailureSink::new()),
        StackSettings::from_env(),
    )
    .context("Failed to build sync service")?;

    let shutdown_token = CancellationToken::new();

    let worker_handle = if config.embedded_worker {
        let worker = SchedulerWorker::new(
            sync_service.clone(),
            WorkerConfig::default().with_worker_id(format!("server-{}", std::process::id())),
        );
        let token = shutdown_token.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = worker.run(token, &TracingWorkerReporter).await {
                error!(error = %e, "Scheduler worker stopped with an error");
            }
        }))
    } else {
        info!("Embedded worker disabled");
        None
    };

    let app_state = AppState::new(
        pool,
        sync_service.clone(),
        cipher,
        config.admin_token.clone(),
        shutdown_token.clone(),
    );
    if app_state.admin_token.is_none() {
        info!("DUVA_ADMIN_TOKEN not set, only /api/v1/health is served");
    }

    let app = create_router(app_state, &config)?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid address")?;
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("Starting duva API server on http://{}", addr);
    info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_token))
    .await
    .context("Server error")?;

    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Worker task panicked");
        }
    }
    sync_service.engine().shutdown();

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");

    shutdown_token.cancel();

    // Let in-flight requests drain before the listener closes.
    tokio::time::sleep(Duration::from_secs(2)).await;
}
