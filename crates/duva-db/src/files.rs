//! Tracked file repository.

use chrono::{DateTime, Utc};
use duva_core::error::AppError;
use duva_core::models::{FileStatus, JobMetadata, NewTrackedFile, TrackedFile};
use duva_core::traits::FileStore;
use sqlx::types::Json;
use sqlx::postgres::PgQueryResult;
use sqlx::{PgPool, Pool, Postgres};

/// Column list for SELECT queries. Must remain a const literal since
/// `format!()` bypasses sqlx query validation.
const FILE_COLUMNS: &str = "id, user_id, form_id, filename, status, metadata, is_active, last_updated, last_synced, publish_target_id";

/// Repository for [`TrackedFile`] rows.
///
/// # Examples
///
/// ```no_run
/// use sqlx::postgres::PgPoolOptions;
/// use duva_db::TrackedFileRepository;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgPoolOptions::new()
///     .max_connections(5)
///     .connect("postgresql://localhost/duva")
///     .await?;
///
/// let repo = TrackedFileRepository::new(pool);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TrackedFileRepository {
    pool: Pool<Postgres>,
}

impl TrackedFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Number of tracked files, optionally only active ones.
    pub async fn count(&self, active_only: bool) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tracked_files WHERE is_active OR NOT $1")
                .bind(active_only)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

// =============================================================================
// Helper Types for Database Mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct FileRow {
    id: i64,
    user_id: i64,
    form_id: i64,
    filename: String,
    status: String,
    metadata: Json<JobMetadata>,
    is_active: bool,
    last_updated: Option<DateTime<Utc>>,
    last_synced: Option<DateTime<Utc>>,
    publish_target_id: Option<i64>,
}

impl From<FileRow> for TrackedFile {
    fn from(row: FileRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            form_id: row.form_id,
            filename: row.filename,
            status: row.status.parse().unwrap_or(FileStatus::Unavailable),
            metadata: row.metadata.0,
            is_active: row.is_active,
            last_updated: row.last_updated,
            last_synced: row.last_synced,
            publish_target_id: row.publish_target_id,
        }
    }
}

// =============================================================================
// FileStore Trait Implementation
// =============================================================================

fn require_row(result: PgQueryResult, id: i64) -> Result<(), AppError> {
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("file {}", id)));
    }
    Ok(())
}

impl FileStore for TrackedFileRepository {
    async fn get_file(&self, id: i64) -> Result<Option<TrackedFile>, AppError> {
        let query = format!("SELECT {} FROM tracked_files WHERE id = $1", FILE_COLUMNS);
        let row: Option<FileRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn list_files(
        &self,
        user_id: i64,
        form_id: Option<i64>,
    ) -> Result<Vec<TrackedFile>, AppError> {
        let query = format!(
            "SELECT {} FROM tracked_files WHERE user_id = $1 AND ($2::BIGINT IS NULL OR form_id = $2) ORDER BY id",
            FILE_COLUMNS
        );
        let rows: Vec<FileRow> = sqlx::query_as(&query)
            .bind(user_id)
            .bind(form_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_active(&self) -> Result<Vec<TrackedFile>, AppError> {
        let query = format!(
            "SELECT {} FROM tracked_files WHERE is_active ORDER BY id",
            FILE_COLUMNS
        );
        let rows: Vec<FileRow> = sqlx::query_as(&query).fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_by_form(
        &self,
        user_id: i64,
        form_id: i64,
    ) -> Result<Option<TrackedFile>, AppError> {
        let query = format!(
            "SELECT {} FROM tracked_files WHERE user_id = $1 AND form_id = $2",
            FILE_COLUMNS
        );
        let row: Option<FileRow> = sqlx::query_as(&query)
            .bind(user_id)
            .bind(form_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn create_file(&self, file: &NewTrackedFile) -> Result<TrackedFile, AppError> {
        let query = format!(
            r#"
            INSERT INTO tracked_files (user_id, form_id, filename, status, metadata, publish_target_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            FILE_COLUMNS
        );
        let result: Result<FileRow, sqlx::Error> = sqlx::query_as(&query)
            .bind(file.user_id)
            .bind(file.form_id)
            .bind(&file.filename)
            .bind(file.status.as_str())
            .bind(Json(JobMetadata::default()))
            .bind(file.publish_target_id)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => Ok(row.into()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(AppError::Conflict(
                format!("form {} is already tracked for user {}", file.form_id, file.user_id),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_status(&self, id: i64, status: FileStatus) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE tracked_files SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        require_row(result, id)
    }

    async fn save_sync_state(&self, file: &TrackedFile) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE tracked_files
            SET
                status = $2,
                metadata = $3,
                is_active = $4,
                last_updated = $5,
                last_synced = $6
            WHERE id = $1
            "#,
        )
        .bind(file.id)
        .bind(file.status.as_str())
        .bind(Json(&file.metadata))
        .bind(file.is_active)
        .bind(file.last_updated)
        .bind(file.last_synced)
        .execute(&self.pool)
        .await?;
        require_row(result, file.id)
    }

    async fn set_metadata(&self, id: i64, metadata: &JobMetadata) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE tracked_files SET metadata = $2 WHERE id = $1")
            .bind(id)
            .bind(Json(metadata))
            .execute(&self.pool)
            .await?;
        require_row(result, id)
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE tracked_files SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        require_row(result, id)
    }

    async fn set_publish_target(&self, id: i64, target_id: Option<i64>) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE tracked_files SET publish_target_id = $2 WHERE id = $1")
            .bind(id)
            .bind(target_id)
            .execute(&self.pool)
            .await?;
        require_row(result, id)
    }

    async fn delete_file(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM tracked_files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
