//! Job scheduler store for PostgreSQL with SELECT FOR UPDATE SKIP LOCKED.
//!
//! Implements [`JobScheduler`] on the `scheduled_jobs` table. Registrations
//! are unique on `(job_name, file_id)`, so registering twice returns the
//! existing row.

use std::time::Duration;

use chrono::{DateTime, Utc};
use duva_core::error::AppError;
use duva_core::job::ScheduledJob;
use duva_core::scheduler::JobScheduler;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, job_name, file_id, interval_secs, next_run_at";

/// PostgreSQL implementation of the job scheduler.
///
/// Several workers may poll the same table; `claim_due` locks the rows it
/// takes with `FOR UPDATE SKIP LOCKED` and re-arms or deletes them in the
/// same transaction, so each due registration is handed out once.
#[derive(Clone)]
pub struct PgJobScheduler {
    pool: Pool<Postgres>,
}

impl PgJobScheduler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Every registration for `file_id`.
    pub async fn jobs_for_file(&self, file_id: i64) -> Result<Vec<ScheduledJob>, AppError> {
        let query = format!(
            "SELECT {} FROM scheduled_jobs WHERE file_id = $1 ORDER BY job_name",
            JOB_COLUMNS
        );
        let rows: Vec<JobRow> = sqlx::query_as(&query)
            .bind(file_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_or_existing(&self, job: ScheduledJob) -> Result<ScheduledJob, AppError> {
        let id = Uuid::parse_str(&job.id).map_err(|e| AppError::Generic(e.to_string()))?;
        let interval_secs = job.interval.map(|d| d.as_secs() as i64);

        // The no-op update makes RETURNING yield the existing row on conflict.
        let query = format!(
            r#"
            INSERT INTO scheduled_jobs (id, job_name, file_id, interval_secs, next_run_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_name, file_id)
            DO UPDATE SET job_name = scheduled_jobs.job_name
            RETURNING {}
            "#,
            JOB_COLUMNS
        );
        let row: JobRow = sqlx::query_as(&query)
            .bind(id)
            .bind(&job.job_name)
            .bind(job.file_id)
            .bind(interval_secs)
            .bind(job.next_run_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }
}

// =============================================================================
// Helper Types for Database Mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    job_name: String,
    file_id: i64,
    interval_secs: Option<i64>,
    next_run_at: DateTime<Utc>,
}

impl From<JobRow> for ScheduledJob {
    fn from(row: JobRow) -> Self {
        Self {
            id: row.id.to_string(),
            job_name: row.job_name,
            file_id: row.file_id,
            interval: row
                .interval_secs
                .map(|secs| Duration::from_secs(secs.max(0) as u64)),
            next_run_at: row.next_run_at,
        }
    }
}

// =============================================================================
// JobScheduler Trait Implementation
// =============================================================================

impl JobScheduler for PgJobScheduler {
    async fn register_recurring(
        &self,
        file_id: i64,
        interval: Duration,
    ) -> Result<ScheduledJob, AppError> {
        self.insert_or_existing(ScheduledJob::recurring(file_id, interval))
            .await
    }

    async fn enqueue_once(&self, file_id: i64) -> Result<ScheduledJob, AppError> {
        self.insert_or_existing(ScheduledJob::once(file_id)).await
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<ScheduledJob>, AppError> {
        let Ok(id) = Uuid::parse_str(job_id) else {
            return Ok(None);
        };
        let query = format!("SELECT {} FROM scheduled_jobs WHERE id = $1", JOB_COLUMNS);
        let row: Option<JobRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn cancel(&self, job_id: &str) -> Result<bool, AppError> {
        let Ok(id) = Uuid::parse_str(job_id) else {
            return Ok(false);
        };
        let result = sqlx::query("DELETE FROM scheduled_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn claim_due(&self, limit: u32) -> Result<Vec<ScheduledJob>, AppError> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            r#"
            SELECT {} FROM scheduled_jobs
            WHERE next_run_at <= NOW()
            ORDER BY next_run_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT $1
            "#,
            JOB_COLUMNS
        );
        let rows: Vec<JobRow> = sqlx::query_as(&query)
            .bind(i64::from(limit))
            .fetch_all(&mut *tx)
            .await?;

        if rows.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        sqlx::query(
            r#"
            UPDATE scheduled_jobs
            SET next_run_at = NOW() + interval_secs * INTERVAL '1 second'
            WHERE id = ANY($1) AND interval_secs IS NOT NULL
            "#,
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM scheduled_jobs WHERE id = ANY($1) AND interval_secs IS NULL")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(claimed = rows.len(), "Claimed due jobs");
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
