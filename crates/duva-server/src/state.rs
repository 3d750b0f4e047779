use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use duva_core::{SecretCipher, SyncService};
use duva_db::AccountRepository;

use crate::stack::PgStack;

/// Shared application state for all handlers.
///
/// Cloned per request by axum; every field is a handle over shared pools.
#[derive(Clone)]
pub struct AppState {
    /// Sync pipeline and the file, target and publish collaborators it owns
    pub sync_service: SyncService<PgStack>,

    /// Upstream servers and user credentials
    pub accounts: AccountRepository,

    /// Encrypts secrets before they are stored
    pub cipher: SecretCipher,

    /// Bearer token for protected routes; `None` disables them
    pub admin_token: Option<String>,

    /// Pool used for health checks
    pub pool: PgPool,

    /// Cancellation token for graceful shutdown
    pub shutdown_token: CancellationToken,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        sync_service: SyncService<PgStack>,
        cipher: SecretCipher,
        admin_token: Option<String>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            sync_service,
            accounts: AccountRepository::new(pool.clone()),
            cipher,
            admin_token: admin_token.filter(|t| !t.is_empty()),
            pool,
            shutdown_token,
        }
    }
}
