//! Embedded schema migrations.
//!
//! Statements are idempotent (`IF NOT EXISTS`) and applied in order on every
//! start-up. Each statement runs separately because the extended query
//! protocol rejects multi-statement strings.

use duva_core::error::AppError;
use sqlx::PgPool;

/// Schema statements, in application order.
pub const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS servers (
        id BIGSERIAL PRIMARY KEY,
        url TEXT NOT NULL UNIQUE,
        client_id TEXT NOT NULL,
        client_secret_enc TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        server_id BIGINT NOT NULL REFERENCES servers(id) ON DELETE CASCADE,
        username TEXT NOT NULL,
        refresh_token_enc TEXT NOT NULL,
        access_token_enc TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT uk_users_server_username UNIQUE (server_id, username)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS publish_targets (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        server_address TEXT NOT NULL,
        site_name TEXT NOT NULL DEFAULT '',
        token_name TEXT NOT NULL,
        token_value_enc TEXT NOT NULL,
        project_name TEXT NOT NULL DEFAULT 'default',
        export_settings JSONB NOT NULL DEFAULT '{}'::jsonb
    )"#,
    r#"CREATE TABLE IF NOT EXISTS tracked_files (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        form_id BIGINT NOT NULL,
        filename TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'File unavailable',
        metadata JSONB NOT NULL DEFAULT '{"job-id": "", "sync-failures": 0}'::jsonb,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        last_updated TIMESTAMPTZ,
        last_synced TIMESTAMPTZ,
        publish_target_id BIGINT REFERENCES publish_targets(id) ON DELETE SET NULL,
        CONSTRAINT uk_tracked_files_user_form UNIQUE (user_id, form_id)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_tracked_files_active ON tracked_files(is_active) WHERE is_active",
    r#"CREATE TABLE IF NOT EXISTS scheduled_jobs (
        id UUID PRIMARY KEY,
        job_name TEXT NOT NULL,
        file_id BIGINT NOT NULL,
        interval_secs BIGINT,
        next_run_at TIMESTAMPTZ NOT NULL,
        CONSTRAINT uk_scheduled_jobs_name_file UNIQUE (job_name, file_id)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_due ON scheduled_jobs(next_run_at)",
];

/// Apply [`MIGRATIONS`] to `pool`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    for statement in MIGRATIONS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!(statements = MIGRATIONS.len(), "Migrations applied");
    Ok(())
}
