//! Duva Core - Domain types, the sync pipeline, and its services.
//!
//! This crate provides the core functionality for Duva, including:
//!
//! - **Domain models**: [`TrackedFile`], [`PublishTarget`], [`JobMetadata`], etc.
//! - **Pipeline stages**: [`ExportPoller`], [`normalize()`], [`EngineHandle`]
//! - **Services**: [`SyncService`] runs and manages syncs, [`JobLifecycle`]
//!   owns recurring schedules, [`SchedulerWorker`] executes due jobs
//! - **Traits**: [`FileStore`], [`UpstreamApi`], [`ObjectStorage`],
//!   [`PublishClient`], [`JobScheduler`], [`SyncLock`] for dependency injection
//! - **Side channels**: [`FailureSink`] and [`WorkerReporter`]
//!
//! # Architecture
//!
//! Business logic is decoupled from I/O through traits. PostgreSQL
//! implementations live in `duva-db`, HTTP and object storage
//! implementations in `duva-client`:
//!
//! ```text
//! SchedulerWorker ─► SyncService::run_sync ─► SyncLock
//!                          │                 ExportPoller ─► UpstreamApi, CredentialBroker
//!                          │                 normalize / EngineHandle
//!                          │                 ObjectStorage, PublishClient
//!                          └──────────────► JobLifecycle ─► FileStore, JobScheduler
//! ```
//!
//! # Example
//!
//! ```ignore
//! use duva_core::{SchedulerWorker, SyncService, TracingWorkerReporter, WorkerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let service = SyncService::new(parts, SyncConfig::from_env());
//! let outcome = service.run_sync(file_id).await?;
//!
//! let worker = SchedulerWorker::new(service, WorkerConfig::default());
//! worker.run(CancellationToken::new(), &TracingWorkerReporter).await?;
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod extract;
pub mod job;
pub mod lifecycle;
pub mod lock;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod poller;
pub mod scheduler;
pub mod sync;
pub mod traits;
pub mod worker;

// Configuration
pub use config::{
    DbConfig, HttpConfig, LifecycleConfig, PollerConfig, StorageConfig, SyncConfig,
};

// Error handling
pub use error::AppError;

// Secrets
pub use crypto::{EncryptedSecret, SecretCipher, SecretString};

// Domain models
pub use models::{
    ExportOptions, FileStatus, FormInfo, JobMetadata, NewPublishTarget, NewTrackedFile,
    PublishTarget, ServerRecord, TrackedFile, UpstreamCredential, UserAccount,
};

// Pipeline stages
pub use extract::{CopyOptions, EngineHandle, ExtractEngine, ParquetEngine, TableDefinition};
pub use normalize::{Column, ColumnType, NormalizedCsv, normalize};
pub use poller::{ExportOutcome, ExportPoller};

// Sync types
pub use sync::{SyncOutcome, SyncRequest, SyncStats};

// Traits for dependency injection
pub use lock::{LocalSyncLock, LockGuard, SyncLock, sync_lock_key};
pub use scheduler::JobScheduler;
pub use traits::{
    AccountStore, CredentialBroker, ExportJobStatus, FileStore, ObjectStorage, PublishClient,
    PublishTargetStore, UpstreamApi, UpstreamResponse,
};

// Services
pub use lifecycle::{Completion, JobLifecycle};
pub use orchestrator::{DownloadLink, FileUpdate, SyncParts, SyncService, SyncStack};

// Failure reporting
pub use metrics::{FailureSink, SilentFailureSink, SinkCounters, TracingFailureSink};

// Scheduler types
pub use job::{ONE_SHOT_SYNC_JOB, RECURRING_SYNC_JOB, ScheduledJob, WorkerConfig};

// Worker service
pub use worker::{
    SchedulerWorker, SilentWorkerReporter, TracingWorkerReporter, WorkerEvent, WorkerReporter,
};
