//! Upstream servers, users and their token pairs.

use duva_core::EncryptedSecret;
use duva_core::error::AppError;
use duva_core::models::{ServerRecord, UpstreamCredential, UserAccount};
use duva_core::traits::AccountStore;
use sqlx::{PgPool, Pool, Postgres};

/// Repository for the `servers` and `users` tables.
#[derive(Clone)]
pub struct AccountRepository {
    pool: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct ServerRow {
    id: i64,
    url: String,
    client_id: String,
    client_secret_enc: String,
}

impl From<ServerRow> for ServerRecord {
    fn from(row: ServerRow) -> Self {
        Self {
            id: row.id,
            url: row.url,
            client_id: row.client_id,
            client_secret: EncryptedSecret::from_stored(row.client_secret_enc),
        }
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: i64,
    server_id: i64,
    server_url: String,
    username: String,
}

impl From<AccountRow> for UserAccount {
    fn from(row: AccountRow) -> Self {
        Self {
            id: row.id,
            server_id: row.server_id,
            server_url: row.server_url,
            username: row.username,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    user_id: i64,
    server_url: String,
    client_id: String,
    client_secret_enc: String,
    refresh_token_enc: String,
    access_token_enc: Option<String>,
}

impl From<CredentialRow> for UpstreamCredential {
    fn from(row: CredentialRow) -> Self {
        Self {
            user_id: row.user_id,
            server_url: row.server_url,
            client_id: row.client_id,
            client_secret: EncryptedSecret::from_stored(row.client_secret_enc),
            refresh_token: EncryptedSecret::from_stored(row.refresh_token_enc),
            access_token: row.access_token_enc.map(EncryptedSecret::from_stored),
        }
    }
}

const ACCOUNT_QUERY: &str = r#"
    SELECT u.id, u.server_id, s.url AS server_url, u.username
    FROM users u
    JOIN servers s ON s.id = u.server_id
"#;

impl AccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register an upstream server. A server URL can only be registered once.
    pub async fn create_server(
        &self,
        url: &str,
        client_id: &str,
        client_secret: &EncryptedSecret,
    ) -> Result<ServerRecord, AppError> {
        let result: Result<ServerRow, sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO servers (url, client_id, client_secret_enc)
            VALUES ($1, $2, $3)
            RETURNING id, url, client_id, client_secret_enc
            "#,
        )
        .bind(url.trim_end_matches('/'))
        .bind(client_id)
        .bind(client_secret.as_str())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.into()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                AppError::Conflict(format!("server {} is already registered", url)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_server(&self, id: i64) -> Result<Option<ServerRecord>, AppError> {
        let row: Option<ServerRow> = sqlx::query_as(
            "SELECT id, url, client_id, client_secret_enc FROM servers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Create a user on `server_id`, or replace the stored tokens of the
    /// existing user with the same username.
    pub async fn upsert_user(
        &self,
        server_id: i64,
        username: &str,
        refresh_token: &EncryptedSecret,
        access_token: Option<&EncryptedSecret>,
    ) -> Result<UserAccount, AppError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO users (server_id, username, refresh_token_enc, access_token_enc)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (server_id, username)
            DO UPDATE SET
                refresh_token_enc = EXCLUDED.refresh_token_enc,
                access_token_enc = EXCLUDED.access_token_enc
            RETURNING id
            "#,
        )
        .bind(server_id)
        .bind(username)
        .bind(refresh_token.as_str())
        .bind(access_token.map(EncryptedSecret::as_str))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                AppError::NotFound(format!("server {}", server_id))
            }
            other => other.into(),
        })?;

        self.get_account(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", id)))
    }
}

impl AccountStore for AccountRepository {
    async fn get_account(&self, user_id: i64) -> Result<Option<UserAccount>, AppError> {
        let query = format!("{} WHERE u.id = $1", ACCOUNT_QUERY);
        let row: Option<AccountRow> = sqlx::query_as(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn get_credential(&self, user_id: i64) -> Result<Option<UpstreamCredential>, AppError> {
        let row: Option<CredentialRow> = sqlx::query_as(
            r#"
            SELECT
                u.id AS user_id,
                s.url AS server_url,
                s.client_id,
                s.client_secret_enc,
                u.refresh_token_enc,
                u.access_token_enc
            FROM users u
            JOIN servers s ON s.id = u.server_id
            WHERE u.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn rotate_tokens(
        &self,
        user_id: i64,
        previous_refresh: &EncryptedSecret,
        access_token: &EncryptedSecret,
        refresh_token: &EncryptedSecret,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET
                access_token_enc = $3,
                refresh_token_enc = $4
            WHERE id = $1 AND refresh_token_enc = $2
            "#,
        )
        .bind(user_id)
        .bind(previous_refresh.as_str())
        .bind(access_token.as_str())
        .bind(refresh_token.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
