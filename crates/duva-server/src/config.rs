use clap::Parser;

/// Server configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug, Clone)]
#[command(name = "duva-server")]
#[command(author, version, about = "REST API server and sync worker for duva")]
pub struct ServerConfig {
    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Maximum number of pooled database connections
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value = "10")]
    pub db_max_connections: u32,

    /// Base64 encoded 32 byte key used to encrypt stored secrets
    #[arg(long, env = "DUVA_SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// Bearer token guarding every endpoint except health. Unset disables them.
    #[arg(long, env = "DUVA_ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,

    /// Server port to listen on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Server host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Sustained requests per second allowed per client IP
    #[arg(long, env = "RATE_LIMIT_RPS", default_value = "10")]
    pub rate_limit_rps: u32,

    /// Burst size on top of the sustained rate
    #[arg(long, env = "RATE_LIMIT_BURST", default_value = "30")]
    pub rate_limit_burst: u32,

    /// Comma separated allowed CORS origins, or "*"
    #[arg(long, env = "CORS_ALLOWED_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    /// Run the scheduler worker inside the server process
    #[arg(long, env = "DUVA_EMBEDDED_WORKER", default_value_t = true, action = clap::ArgAction::Set)]
    pub embedded_worker: bool,
}
