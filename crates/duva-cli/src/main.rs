mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use duva_client::ObjectStoreStorage;
use duva_core::{
    DbConfig, SchedulerWorker, SecretCipher, StorageConfig, SyncOutcome, SyncStats,
    TracingFailureSink, TracingWorkerReporter, WorkerConfig,
};
use duva_db::{TrackedFileRepository, run_migrations};
use duva_server::{PgStack, StackSettings, build_sync_service};

use crate::config::{Command, Config};

type Service = duva_core::SyncService<PgStack>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::parse();

    if config.command.is_offline() {
        println!("{}", SecretCipher::generate_secret_key());
        return Ok(());
    }

    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is required for this command")?;

    info!("Connecting to database...");
    let db_config = DbConfig::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    if config.command == Command::Migrate {
        run_migrations(&pool).await.context("Migration failed")?;
        info!("Migrations applied");
        return Ok(());
    }

    let service = build_service(pool.clone(), config.secret_key.as_deref())?;

    match config.command {
        Command::Worker {
            worker_id,
            poll_interval_secs,
            batch_size,
            no_schedule,
        } => {
            let mut worker_config = WorkerConfig::default()
                .with_poll_interval(Duration::from_secs(poll_interval_secs.max(1)))
                .with_batch_size(batch_size);
            if let Some(id) = worker_id {
                worker_config = worker_config.with_worker_id(id);
            }
            if no_schedule {
                worker_config = worker_config.without_startup_scheduling();
            }
            run_worker(&service, worker_config).await?;
        }
        Command::Sync { file_id } => {
            let outcome = service.run_sync(file_id).await?;
            print_outcome(file_id, &outcome);
            if outcome.is_failure() {
                anyhow::bail!("sync of file {} failed", file_id);
            }
        }
        Command::ScheduleAll => {
            let scheduled = service.lifecycle().schedule_all_active().await?;
            let active = TrackedFileRepository::new(pool).count(true).await?;
            println!("Scheduled {} of {} active files", scheduled, active);
        }
        Command::Migrate | Command::GenKey => {}
    }

    service.engine().shutdown();
    Ok(())
}

fn build_service(pool: PgPool, secret_key: Option<&str>) -> anyhow::Result<Service> {
    let secret_key = secret_key.context("DUVA_SECRET_KEY is required for this command")?;
    let cipher = SecretCipher::from_secret_key(secret_key).context("Invalid DUVA_SECRET_KEY")?;
    let storage_config = StorageConfig::from_env()?;
    let storage = ObjectStoreStorage::from_config(&storage_config)
        .context("Failed to open object storage")?;

    let service = build_sync_service(
        pool,
        cipher,
        storage,
        Arc::new(TracingFailureSink::new()),
        StackSettings::from_env(),
    )?;
    Ok(service)
}

async fn run_worker(service: &Service, worker_config: WorkerConfig) -> anyhow::Result<()> {
    let worker = SchedulerWorker::new(service.clone(), worker_config);
    let cancel_token = CancellationToken::new();

    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C received, finishing running jobs..."),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C"),
        }
        signal_token.cancel();
    });

    let stats = worker.run(cancel_token, &TracingWorkerReporter).await?;
    print_stats(&stats);
    Ok(())
}

fn print_outcome(file_id: i64, outcome: &SyncOutcome) {
    println!();
    println!("File {}: {}", file_id, outcome);
    if let Some(status) = outcome.status() {
        println!("  Status: {}", status);
    }
    println!();
}

fn print_stats(stats: &SyncStats) {
    info!("");
    info!("═══════════════════════════════════════════");
    info!("WORKER STOPPED");
    info!("═══════════════════════════════════════════");
    info!("  Available:           {}", stats.available);
    info!("  Unavailable (empty): {}", stats.unavailable);
    info!("  Failed:              {}", stats.failed);
    info!("  Skipped (locked):    {}", stats.skipped);
    info!("───────────────────────────────────────────");
    info!("  Total runs:          {}", stats.total());
    info!("  Rows stored:         {}", stats.rows);
    info!("═══════════════════════════════════════════");
}
