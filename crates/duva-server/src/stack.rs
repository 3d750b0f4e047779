//! Production wiring of the sync pipeline.
//!
//! [`PgStack`] binds every collaborator trait to its PostgreSQL, HTTP or
//! object-store implementation. Both the server and the CLI build their
//! [`SyncService`] through [`build_sync_service`].

use std::sync::Arc;

use duva_client::{ObjectStoreStorage, OnaDataClient, OnaTokenBroker, TableauClient};
use duva_core::{
    AppError, EngineHandle, ExportPoller, FailureSink, HttpConfig, JobLifecycle, LifecycleConfig,
    ParquetEngine, PollerConfig, SecretCipher, SyncConfig, SyncParts, SyncService, SyncStack,
};
use duva_db::{
    AccountRepository, PgJobScheduler, PgSyncLock, PublishTargetRepository, TrackedFileRepository,
};
use sqlx::PgPool;

/// PostgreSQL + OnaData + Tableau + object store.
pub struct PgStack;

impl SyncStack for PgStack {
    type Files = TrackedFileRepository;
    type Targets = PublishTargetRepository;
    type Accounts = AccountRepository;
    type Upstream = OnaDataClient;
    type Broker = OnaTokenBroker<AccountRepository>;
    type Storage = ObjectStoreStorage;
    type Publisher = TableauClient;
    type Engine = ParquetEngine;
    type Lock = PgSyncLock;
    type Scheduler = PgJobScheduler;
}

/// Tunables read from the environment when the service is built.
#[derive(Debug, Clone, Default)]
pub struct StackSettings {
    pub http: HttpConfig,
    pub poller: PollerConfig,
    pub lifecycle: LifecycleConfig,
    pub sync: SyncConfig,
}

impl StackSettings {
    pub fn from_env() -> Self {
        Self {
            http: HttpConfig::from_env(),
            poller: PollerConfig::from_env(),
            lifecycle: LifecycleConfig::from_env(),
            sync: SyncConfig::from_env(),
        }
    }
}

/// Assemble a [`SyncService`] over `pool`.
///
/// # Errors
///
/// Returns `AppError::ClientError` if an HTTP client cannot be built.
pub fn build_sync_service(
    pool: PgPool,
    cipher: SecretCipher,
    storage: ObjectStoreStorage,
    sink: Arc<dyn FailureSink>,
    settings: StackSettings,
) -> Result<SyncService<PgStack>, AppError> {
    let files = TrackedFileRepository::new(pool.clone());
    let accounts = AccountRepository::new(pool.clone());

    let upstream = OnaDataClient::with_config(&settings.http)?;
    let broker = OnaTokenBroker::with_config(accounts.clone(), cipher.clone(), &settings.http)?;
    let publisher = TableauClient::with_config(cipher, &settings.http)?;

    let lifecycle = JobLifecycle::new(
        files.clone(),
        PgJobScheduler::new(pool.clone()),
        settings.lifecycle,
    );

    let parts = SyncParts::<PgStack> {
        files,
        targets: PublishTargetRepository::new(pool.clone()),
        accounts,
        poller: ExportPoller::new(upstream, broker, settings.poller),
        storage,
        publisher,
        engine: EngineHandle::new(),
        lock: PgSyncLock::new(pool),
        lifecycle,
        sink,
    };

    Ok(SyncService::new(parts, settings.sync))
}
