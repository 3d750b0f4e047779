//! Integration tests for ExportPoller.
//!
//! The upstream API is scripted through `MockUpstream`; anything not
//! scripted succeeds immediately.

use std::time::Duration;

use crate::integration::common::{EXPORT_URL, FORM_ID, TEMP_TOKEN, TestEnv, account, public_form};
use duva_core::{
    AppError, ExportJobStatus, ExportOptions, ExportOutcome, FormInfo, PollerConfig,
    UpstreamResponse,
};

async fn export(env: &TestEnv, dir: &tempfile::TempDir) -> Result<ExportOutcome, AppError> {
    env.poller()
        .request_export(&account(), FORM_ID, &ExportOptions::default(), dir.path())
        .await
}

#[tokio::test]
async fn test_pending_then_success_downloads_csv() {
    let env = TestEnv::new();
    env.upstream.push_pending(Some("job-abc"));
    let dir = tempfile::tempdir().unwrap();

    let outcome = export(&env, &dir).await.unwrap();

    let expected = dir.path().join(format!("{}.csv", FORM_ID));
    assert_eq!(outcome, ExportOutcome::Success(expected.clone()));
    assert!(std::fs::read_to_string(expected).unwrap().starts_with("name,age"));
    assert_eq!(env.upstream.download_urls(), vec![EXPORT_URL.to_string()]);
}

#[tokio::test]
async fn test_job_uuid_is_sent_on_later_polls() {
    let env = TestEnv::new();
    env.upstream.push_pending(Some("job-abc"));
    env.upstream.push_pending(None);
    let dir = tempfile::tempdir().unwrap();

    export(&env, &dir).await.unwrap();

    let uuids: Vec<_> = env
        .upstream
        .export_calls()
        .into_iter()
        .map(|(_, uuid)| uuid)
        .collect();
    assert_eq!(
        uuids,
        vec![
            None,
            Some("job-abc".to_string()),
            Some("job-abc".to_string())
        ],
        "a pending poll without a uuid must keep the earlier one"
    );
}

#[tokio::test]
async fn test_unauthorized_refreshes_once_and_retries() {
    let env = TestEnv::new();
    env.upstream.push_export(UpstreamResponse::Unauthorized);
    let dir = tempfile::tempdir().unwrap();

    let outcome = export(&env, &dir).await.unwrap();

    assert!(matches!(outcome, ExportOutcome::Success(_)));
    assert_eq!(env.broker.refreshes(), 1);
    let tokens: Vec<_> = env
        .upstream
        .export_calls()
        .into_iter()
        .map(|(token, _)| token)
        .collect();
    assert_eq!(tokens, vec!["token-0".to_string(), "token-1".to_string()]);
}

#[tokio::test]
async fn test_repeated_unauthorized_propagates() {
    let env = TestEnv::new();
    env.upstream.push_export(UpstreamResponse::Unauthorized);
    env.upstream.push_export(UpstreamResponse::Unauthorized);
    let dir = tempfile::tempdir().unwrap();

    let result = export(&env, &dir).await;

    assert!(matches!(result, Err(AppError::Unauthorized(_))));
    assert_eq!(env.broker.refreshes(), 1, "only one refresh per request");
    assert_eq!(env.upstream.export_calls().len(), 2);
}

#[tokio::test]
async fn test_still_pending_after_four_attempts_times_out() {
    let env = TestEnv::new();
    for _ in 0..4 {
        env.upstream.push_pending(Some("job-abc"));
    }
    let dir = tempfile::tempdir().unwrap();

    let outcome = export(&env, &dir).await.unwrap();

    assert_eq!(outcome, ExportOutcome::TimedOut);
    assert_eq!(env.upstream.export_calls().len(), 4);
    assert!(env.upstream.download_urls().is_empty());
    assert!(matches!(
        outcome.into_path(),
        Err(AppError::ConnectionRequest(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_linear_backoff_between_polls() {
    let mut env = TestEnv::new();
    env.poller_config = PollerConfig::default();
    for _ in 0..4 {
        env.upstream.push_pending(None);
    }
    let dir = tempfile::tempdir().unwrap();

    let start = tokio::time::Instant::now();
    export(&env, &dir).await.unwrap();
    let elapsed = start.elapsed();

    // 30s + 60s + 90s, no sleep after the last attempt.
    assert!(elapsed >= Duration::from_secs(180), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(181), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_upstream_failure_carries_reason() {
    let env = TestEnv::new();
    env.upstream.push_failure("Form has no submissions");
    let dir = tempfile::tempdir().unwrap();

    let outcome = export(&env, &dir).await.unwrap();

    assert_eq!(
        outcome,
        ExportOutcome::Failure("Form has no submissions".to_string())
    );
    match outcome.into_path() {
        Err(AppError::CsvExportFailure(reason)) => assert_eq!(reason, "Form has no submissions"),
        other => panic!("expected CsvExportFailure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unexpected_status_fails_without_retry() {
    let env = TestEnv::new();
    env.upstream.push_export(UpstreamResponse::Status(500));
    let dir = tempfile::tempdir().unwrap();

    let result = export(&env, &dir).await;

    assert!(matches!(result, Err(AppError::ConnectionRequest(_))));
    assert_eq!(env.upstream.export_calls().len(), 1);
}

#[tokio::test]
async fn test_download_is_retried_three_times() {
    let env = TestEnv::new();
    for _ in 0..3 {
        env.upstream.push_download(UpstreamResponse::Status(502));
    }
    let dir = tempfile::tempdir().unwrap();

    let outcome = export(&env, &dir).await.unwrap();

    assert!(matches!(outcome, ExportOutcome::Success(_)));
    assert_eq!(env.upstream.download_urls().len(), 4);
}

#[tokio::test]
async fn test_download_gives_up_after_retries() {
    let env = TestEnv::new();
    for _ in 0..4 {
        env.upstream.push_download(UpstreamResponse::Status(502));
    }
    let dir = tempfile::tempdir().unwrap();

    let result = export(&env, &dir).await;

    assert!(matches!(result, Err(AppError::ConnectionRequest(_))));
    assert_eq!(env.upstream.download_urls().len(), 4);
}

#[tokio::test]
async fn test_private_form_appends_temp_token() {
    let env = TestEnv::new();
    env.upstream.set_form_response(UpstreamResponse::Ok(FormInfo {
        public: false,
        ..public_form()
    }));
    let dir = tempfile::tempdir().unwrap();

    export(&env, &dir).await.unwrap();

    assert_eq!(
        env.upstream.download_urls(),
        vec![format!("{}&temp_token={}", EXPORT_URL, TEMP_TOKEN)]
    );
}

#[tokio::test]
async fn test_temp_token_starts_query_and_is_encoded() {
    let env = TestEnv::new();
    env.upstream.set_form_response(UpstreamResponse::Ok(FormInfo {
        public: false,
        ..public_form()
    }));
    env.upstream.set_temp_token("a b&c");
    env.upstream
        .push_export(UpstreamResponse::Ok(ExportJobStatus::Success {
            export_url: "https://ona.example.com/exports/7.csv".to_string(),
        }));
    let dir = tempfile::tempdir().unwrap();

    export(&env, &dir).await.unwrap();

    assert_eq!(
        env.upstream.download_urls(),
        vec!["https://ona.example.com/exports/7.csv?temp_token=a+b%26c".to_string()]
    );
}

#[tokio::test]
async fn test_missing_form_is_not_found() {
    let env = TestEnv::new();
    env.upstream.set_form_response(UpstreamResponse::Status(404));

    let result = env.poller().fetch_form(&account(), FORM_ID).await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}
