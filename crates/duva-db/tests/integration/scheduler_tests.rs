//! Integration tests for PgJobScheduler.

use std::time::Duration;

use duva_core::scheduler::JobScheduler;
use duva_core::{ONE_SHOT_SYNC_JOB, RECURRING_SYNC_JOB};
use duva_db::PgJobScheduler;

use crate::integration::common::setup_test_db;

async fn make_due(pool: &sqlx::PgPool, job_id: &str) {
    sqlx::query("UPDATE scheduled_jobs SET next_run_at = NOW() - INTERVAL '1 second' WHERE id = $1::uuid")
        .bind(job_id)
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_register_recurring_is_idempotent() {
    let (pool, _container) = setup_test_db().await;
    let scheduler = PgJobScheduler::new(pool);

    let first = scheduler
        .register_recurring(1, Duration::from_secs(900))
        .await
        .unwrap();
    let second = scheduler
        .register_recurring(1, Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.interval, Some(Duration::from_secs(900)));
    assert_eq!(first.job_name, RECURRING_SYNC_JOB);
    assert_eq!(scheduler.jobs_for_file(1).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_one_shot_and_recurring_coexist() {
    let (pool, _container) = setup_test_db().await;
    let scheduler = PgJobScheduler::new(pool);

    scheduler
        .register_recurring(1, Duration::from_secs(900))
        .await
        .unwrap();
    let once = scheduler.enqueue_once(1).await.unwrap();
    let again = scheduler.enqueue_once(1).await.unwrap();

    assert_eq!(once.id, again.id);
    assert_eq!(once.job_name, ONE_SHOT_SYNC_JOB);
    assert_eq!(scheduler.jobs_for_file(1).await.unwrap().len(), 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_claim_due_rearms_recurring_and_removes_one_shot() {
    let (pool, _container) = setup_test_db().await;
    let scheduler = PgJobScheduler::new(pool.clone());

    let recurring = scheduler
        .register_recurring(1, Duration::from_secs(900))
        .await
        .unwrap();
    make_due(&pool, &recurring.id).await;
    scheduler.enqueue_once(2).await.unwrap();

    let claimed = scheduler.claim_due(10).await.unwrap();

    assert_eq!(claimed.len(), 2);
    assert!(scheduler.claim_due(10).await.unwrap().is_empty());

    let remaining = scheduler.get_job(&recurring.id).await.unwrap().unwrap();
    assert!(remaining.next_run_at > chrono::Utc::now() + chrono::Duration::seconds(800));
    assert!(scheduler.jobs_for_file(2).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_claim_due_respects_limit() {
    let (pool, _container) = setup_test_db().await;
    let scheduler = PgJobScheduler::new(pool);

    for file_id in 1..=5 {
        scheduler.enqueue_once(file_id).await.unwrap();
    }

    assert_eq!(scheduler.claim_due(3).await.unwrap().len(), 3);
    assert_eq!(scheduler.claim_due(3).await.unwrap().len(), 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_concurrent_claims_never_overlap() {
    let (pool, _container) = setup_test_db().await;
    let scheduler = PgJobScheduler::new(pool);
    for file_id in 1..=20 {
        scheduler.enqueue_once(file_id).await.unwrap();
    }

    let (a, b) = tokio::join!(scheduler.claim_due(15), scheduler.claim_due(15));
    let mut ids: Vec<i64> = a
        .unwrap()
        .into_iter()
        .chain(b.unwrap())
        .map(|job| job.file_id)
        .collect();
    ids.sort_unstable();

    assert_eq!(ids, (1..=20).collect::<Vec<_>>());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_cancel_and_unknown_handles() {
    let (pool, _container) = setup_test_db().await;
    let scheduler = PgJobScheduler::new(pool);
    let job = scheduler
        .register_recurring(1, Duration::from_secs(900))
        .await
        .unwrap();

    assert!(scheduler.cancel(&job.id).await.unwrap());
    assert!(!scheduler.cancel(&job.id).await.unwrap());
    assert!(scheduler.get_job(&job.id).await.unwrap().is_none());
    assert!(scheduler.get_job("not-a-uuid").await.unwrap().is_none());
    assert!(!scheduler.cancel("").await.unwrap());
}
