//! Integration tests for JobLifecycle.

use std::time::Duration;

use crate::integration::common::TestEnv;
use duva_core::{Completion, FileStatus, LifecycleConfig, ScheduledJob};

#[tokio::test]
async fn test_schedule_is_idempotent() {
    let env = TestEnv::new();
    let file = env.files.seed(FileStatus::Queued);
    let lifecycle = env.lifecycle();

    let first = lifecycle.schedule(file.id).await.unwrap().unwrap();
    let second = lifecycle.schedule(file.id).await.unwrap().unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(env.scheduler.len(), 1);
    assert_eq!(env.files.get(file.id).unwrap().metadata.job_id, first.id);
}

#[tokio::test]
async fn test_schedule_uses_configured_interval() {
    let mut env = TestEnv::new();
    env.lifecycle_config = LifecycleConfig::default().with_sync_interval(Duration::from_secs(60));
    let file = env.files.seed(FileStatus::Queued);

    let job = env.lifecycle().schedule(file.id).await.unwrap().unwrap();

    assert_eq!(job.interval, Some(Duration::from_secs(60)));
}

#[tokio::test]
async fn test_schedule_skips_inactive_file() {
    let env = TestEnv::new();
    let file = env.files.seed(FileStatus::Unavailable);
    env.files.update(file.id, |f| f.is_active = false);

    let job = env.lifecycle().schedule(file.id).await.unwrap();

    assert!(job.is_none());
    assert_eq!(env.scheduler.len(), 0);
}

#[tokio::test]
async fn test_schedule_replaces_stale_handle() {
    let env = TestEnv::new();
    let file = env.files.seed(FileStatus::Available);
    env.files.update(file.id, |f| {
        f.metadata.job_id = "gone".to_string();
        f.metadata.sync_failures = 2;
    });

    let job = env.lifecycle().schedule(file.id).await.unwrap().unwrap();

    let stored = env.files.get(file.id).unwrap();
    assert_eq!(stored.metadata.job_id, job.id);
    assert_eq!(stored.metadata.sync_failures, 0);
}

#[tokio::test]
async fn test_three_failures_deactivate_file() {
    let env = TestEnv::new();
    let file = env.files.seed(FileStatus::Available);
    let lifecycle = env.lifecycle();
    lifecycle.schedule(file.id).await.unwrap();

    for n in 1..=2 {
        let stored = lifecycle
            .report_completion(file.id, Completion::failed("timeout"))
            .await
            .unwrap();
        assert_eq!(stored.metadata.sync_failures, n);
        assert!(stored.is_active);
    }
    let stored = lifecycle
        .report_completion(file.id, Completion::failed("timeout"))
        .await
        .unwrap();

    assert!(!stored.is_active);
    assert_eq!(stored.metadata.job_id, "");
    assert_eq!(stored.metadata.sync_failures, 0);
    assert_eq!(stored.status, FileStatus::SyncFailed);
    assert!(env.scheduler.jobs_for(file.id).is_empty());

    let persisted = serde_json::to_value(&stored.metadata).unwrap();
    assert_eq!(persisted["job-id"], "");
    assert_eq!(persisted["sync-failures"], 0);
}

#[tokio::test]
async fn test_inactive_file_keeps_counting() {
    let env = TestEnv::new();
    let file = env.files.seed(FileStatus::SyncFailed);
    env.files.update(file.id, |f| {
        f.is_active = false;
        f.metadata.sync_failures = 5;
    });

    let stored = env
        .lifecycle()
        .report_completion(file.id, Completion::failed("still broken"))
        .await
        .unwrap();

    assert_eq!(stored.metadata.sync_failures, 6);
    assert!(!stored.is_active);
}

#[tokio::test]
async fn test_success_resets_counter_and_reason() {
    let env = TestEnv::new();
    let file = env.files.seed(FileStatus::Syncing);
    let lifecycle = env.lifecycle();
    lifecycle
        .report_completion(file.id, Completion::failed("timeout"))
        .await
        .unwrap();

    let stored = lifecycle
        .report_completion(file.id, Completion::updated())
        .await
        .unwrap();

    assert_eq!(stored.metadata.sync_failures, 0);
    assert_eq!(stored.metadata.failure_reason, None);
    assert_eq!(stored.status, FileStatus::Available);
    assert!(stored.last_updated.is_some());
}

#[tokio::test]
async fn test_empty_run_does_not_touch_last_updated() {
    let env = TestEnv::new();
    let file = env.files.seed(FileStatus::Syncing);

    let stored = env
        .lifecycle()
        .report_completion(file.id, Completion::no_content())
        .await
        .unwrap();

    assert_eq!(stored.status, FileStatus::Unavailable);
    assert!(stored.last_updated.is_none());
    assert!(stored.last_synced.is_some());
}

#[tokio::test]
async fn test_cancel_clears_handle_and_counter() {
    let env = TestEnv::new();
    let file = env.files.seed(FileStatus::Available);
    let lifecycle = env.lifecycle();
    lifecycle.schedule(file.id).await.unwrap();
    env.files.update(file.id, |f| f.metadata.sync_failures = 2);

    lifecycle.cancel(file.id).await.unwrap();

    let stored = env.files.get(file.id).unwrap();
    assert!(!stored.metadata.is_scheduled());
    assert_eq!(stored.metadata.sync_failures, 0);
    assert_eq!(env.scheduler.len(), 0);
}

#[tokio::test]
async fn test_schedule_all_active_only_fills_gaps() {
    let env = TestEnv::new();
    let scheduled = env.files.seed(FileStatus::Available);
    let missing = env.files.seed(FileStatus::Available);
    let inactive = env.files.seed(FileStatus::SyncFailed);
    env.files.update(inactive.id, |f| f.is_active = false);

    let job = ScheduledJob::recurring(scheduled.id, Duration::from_secs(900));
    env.scheduler.insert(job.clone());
    env.files
        .update(scheduled.id, |f| f.metadata.job_id = job.id.clone());

    let count = env.lifecycle().schedule_all_active().await.unwrap();

    assert_eq!(count, 1);
    assert_eq!(env.scheduler.jobs_for(scheduled.id), vec![job]);
    assert_eq!(env.scheduler.jobs_for(missing.id).len(), 1);
    assert!(env.scheduler.jobs_for(inactive.id).is_empty());
}
