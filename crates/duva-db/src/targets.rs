//! Publish target ("configuration") repository.

use duva_core::EncryptedSecret;
use duva_core::error::AppError;
use duva_core::models::{ExportOptions, NewPublishTarget, PublishTarget};
use duva_core::traits::PublishTargetStore;
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};

const TARGET_COLUMNS: &str = "id, user_id, server_address, site_name, token_name, token_value_enc, project_name, export_settings";

/// Repository for [`PublishTarget`] rows. Token values are stored as the
/// ciphertext produced by `SecretCipher`.
#[derive(Clone)]
pub struct PublishTargetRepository {
    pool: Pool<Postgres>,
}

impl PublishTargetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TargetRow {
    id: i64,
    user_id: i64,
    server_address: String,
    site_name: String,
    token_name: String,
    token_value_enc: String,
    project_name: String,
    export_settings: Json<ExportOptions>,
}

impl From<TargetRow> for PublishTarget {
    fn from(row: TargetRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            server_address: row.server_address,
            site_name: row.site_name,
            token_name: row.token_name,
            token_value: EncryptedSecret::from_stored(row.token_value_enc),
            project_name: row.project_name,
            export_settings: row.export_settings.0,
        }
    }
}

impl PublishTargetStore for PublishTargetRepository {
    async fn get_target(&self, id: i64) -> Result<Option<PublishTarget>, AppError> {
        let query = format!("SELECT {} FROM publish_targets WHERE id = $1", TARGET_COLUMNS);
        let row: Option<TargetRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn list_targets(&self, user_id: i64) -> Result<Vec<PublishTarget>, AppError> {
        let query = format!(
            "SELECT {} FROM publish_targets WHERE user_id = $1 ORDER BY id",
            TARGET_COLUMNS
        );
        let rows: Vec<TargetRow> = sqlx::query_as(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_target(&self, target: &NewPublishTarget) -> Result<PublishTarget, AppError> {
        let query = format!(
            r#"
            INSERT INTO publish_targets (
                user_id, server_address, site_name, token_name,
                token_value_enc, project_name, export_settings
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            TARGET_COLUMNS
        );
        let row: TargetRow = sqlx::query_as(&query)
            .bind(target.user_id)
            .bind(&target.server_address)
            .bind(&target.site_name)
            .bind(&target.token_name)
            .bind(target.token_value.as_str())
            .bind(&target.project_name)
            .bind(Json(&target.export_settings))
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn update_target(&self, target: &PublishTarget) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE publish_targets
            SET
                server_address = $2,
                site_name = $3,
                token_name = $4,
                token_value_enc = $5,
                project_name = $6,
                export_settings = $7
            WHERE id = $1
            "#,
        )
        .bind(target.id)
        .bind(&target.server_address)
        .bind(&target.site_name)
        .bind(&target.token_name)
        .bind(target.token_value.as_str())
        .bind(&target.project_name)
        .bind(Json(&target.export_settings))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("configuration {}", target.id)));
        }
        Ok(())
    }

    async fn delete_target(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM publish_targets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
