//! Test utilities for integration tests.
//!
//! Provides helper functions to set up isolated PostgreSQL containers
//! with the duva schema applied.

#![allow(dead_code)]

use duva_core::EncryptedSecret;
use duva_core::models::{ExportOptions, FileStatus, NewPublishTarget, NewTrackedFile, UserAccount};
use duva_db::{AccountRepository, run_migrations};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

/// Sets up a PostgreSQL container and returns a migrated connection pool.
///
/// Each call creates a fresh, isolated database container. The container is
/// automatically cleaned up when the returned `ContainerAsync` is dropped.
pub async fn setup_test_db() -> (PgPool, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("postgres", "16-alpine")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "postgres")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let connection_string = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

    // The server restarts once during initdb; retry until it accepts us.
    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!(
                        "Failed to connect to database after {} retries: {}",
                        MAX_RETRIES, e
                    );
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    (pool, container)
}

/// Ciphertexts are opaque to the repositories, so tests store plain markers.
pub fn secret(value: &str) -> EncryptedSecret {
    EncryptedSecret::from_stored(value)
}

/// Creates a server and one user on it.
pub async fn seed_account(pool: &PgPool, username: &str) -> UserAccount {
    let repo = AccountRepository::new(pool.clone());
    let url = format!("https://{}.ona.example.com", username);
    let server = repo
        .create_server(&url, "client-1", &secret("client-secret"))
        .await
        .expect("create server");
    repo.upsert_user(server.id, username, &secret("refresh-0"), None)
        .await
        .expect("create user")
}

pub fn new_file(user_id: i64, form_id: i64) -> NewTrackedFile {
    NewTrackedFile {
        user_id,
        form_id,
        filename: format!("Form {}.parquet", form_id),
        status: FileStatus::Queued,
        publish_target_id: None,
    }
}

pub fn new_target(user_id: i64) -> NewPublishTarget {
    NewPublishTarget {
        user_id,
        server_address: "https://tableau.example.com".to_string(),
        site_name: "ona".to_string(),
        token_name: "duva".to_string(),
        token_value: secret("pat-secret"),
        project_name: "Surveys".to_string(),
        export_settings: ExportOptions::default(),
    }
}
