//! Integration tests for SchedulerWorker.

use std::sync::Mutex;
use std::time::Duration;

use crate::integration::common::TestEnv;
use duva_core::{
    FileStatus, JobScheduler, ScheduledJob, SchedulerWorker, SilentWorkerReporter, WorkerConfig,
    WorkerEvent, WorkerReporter,
};
use tokio_util::sync::CancellationToken;

/// Records event names in order.
#[derive(Default)]
struct RecordingReporter {
    events: Mutex<Vec<String>>,
}

impl WorkerReporter for RecordingReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        let name = match event {
            WorkerEvent::Started { .. } => "started",
            WorkerEvent::Scheduled { .. } => "scheduled",
            WorkerEvent::Polling => return,
            WorkerEvent::JobClaimed { .. } => "claimed",
            WorkerEvent::JobCompleted { .. } => "completed",
            WorkerEvent::JobFailed { .. } => "failed",
            WorkerEvent::ShuttingDown { .. } => "shutting_down",
            WorkerEvent::Stopped { .. } => "stopped",
        };
        self.events.lock().unwrap().push(name.to_string());
    }
}

fn config() -> WorkerConfig {
    WorkerConfig::default()
        .with_worker_id("test-worker")
        .with_poll_interval(Duration::from_millis(10))
}

#[tokio::test]
async fn test_run_once_processes_due_jobs() {
    let env = TestEnv::new();
    let file = env.files.seed(FileStatus::Queued);
    env.scheduler.enqueue_once(file.id).await.unwrap();
    let worker = SchedulerWorker::new(env.service(), config());

    let stats = worker.run_once(&SilentWorkerReporter).await.unwrap();

    assert_eq!(stats.available, 1);
    assert_eq!(stats.rows, 3);
    assert_eq!(env.files.get(file.id).unwrap().status, FileStatus::Available);
    assert!(env.scheduler.jobs_for(file.id).is_empty(), "one-shot job consumed");
}

#[tokio::test]
async fn test_run_once_rearms_recurring_jobs() {
    let env = TestEnv::new();
    let file = env.files.seed(FileStatus::Available);
    let lifecycle = env.lifecycle();
    lifecycle.schedule(file.id).await.unwrap();
    env.scheduler.make_due(file.id);
    let worker = SchedulerWorker::new(env.service(), config());

    let stats = worker.run_once(&SilentWorkerReporter).await.unwrap();

    assert_eq!(stats.total(), 1);
    let jobs = env.scheduler.jobs_for(file.id);
    assert_eq!(jobs.len(), 1);
    assert!(!jobs[0].is_due(chrono::Utc::now()));
}

#[tokio::test]
async fn test_nothing_due_is_empty_batch() {
    let env = TestEnv::new();
    let file = env.files.seed(FileStatus::Available);
    env.lifecycle().schedule(file.id).await.unwrap();
    let worker = SchedulerWorker::new(env.service(), config());

    let stats = worker.run_once(&SilentWorkerReporter).await.unwrap();

    assert_eq!(stats.total(), 0);
    assert!(env.upstream.export_calls().is_empty());
}

#[tokio::test]
async fn test_orphaned_job_is_cancelled() {
    let env = TestEnv::new();
    let mut job = ScheduledJob::recurring(99, Duration::from_secs(900));
    job.next_run_at = chrono::Utc::now() - chrono::Duration::seconds(1);
    env.scheduler.insert(job);
    let worker = SchedulerWorker::new(env.service(), config());
    let reporter = RecordingReporter::default();

    let stats = worker.run_once(&reporter).await.unwrap();

    assert_eq!(stats.total(), 0);
    assert_eq!(env.scheduler.len(), 0);
    assert_eq!(
        *reporter.events.lock().unwrap(),
        vec!["claimed".to_string(), "failed".to_string()]
    );
}

#[tokio::test]
async fn test_run_schedules_active_files_and_stops_on_cancel() {
    let env = TestEnv::new();
    let file = env.files.seed(FileStatus::Unavailable);
    env.scheduler.enqueue_once(file.id).await.unwrap();
    let worker = SchedulerWorker::new(env.service(), config());
    let reporter = RecordingReporter::default();
    let cancel = CancellationToken::new();

    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        stopper.cancel();
    });

    let stats = worker.run(cancel, &reporter).await.unwrap();

    assert_eq!(stats.available, 1);
    let stored = env.files.get(file.id).unwrap();
    assert_eq!(stored.status, FileStatus::Available);
    assert!(stored.metadata.is_scheduled(), "scheduled at start-up");

    let events = reporter.events.lock().unwrap();
    assert_eq!(events.first().map(String::as_str), Some("started"));
    assert_eq!(events.get(1).map(String::as_str), Some("scheduled"));
    assert_eq!(events.last().map(String::as_str), Some("stopped"));
}

#[tokio::test]
async fn test_run_without_startup_scheduling() {
    let env = TestEnv::new();
    let file = env.files.seed(FileStatus::Unavailable);
    let worker = SchedulerWorker::new(env.service(), config().without_startup_scheduling());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let stats = worker.run(cancel, &SilentWorkerReporter).await.unwrap();

    assert_eq!(stats.total(), 0);
    assert!(!env.files.get(file.id).unwrap().metadata.is_scheduled());
}
