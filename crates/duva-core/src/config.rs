//! Configuration types for duva components.
//!
//! Every struct has a [`Default`] carrying the production defaults and a
//! `from_env()` constructor that overrides individual values from
//! `DUVA_*` environment variables. Unparseable values fall back to the
//! default rather than failing start-up.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { max_connections: 10 }
    }
}

impl DbConfig {
    pub fn from_env() -> Self {
        Self {
            max_connections: env_parse("DB_MAX_CONNECTIONS").unwrap_or(10),
        }
    }
}

/// HTTP client configuration for external API calls.
///
/// `timeout` bounds each short JSON call end to end. Export downloads and
/// extract uploads carry no total deadline; they fail only when the
/// connection cannot be set up within `connect_timeout` or goes silent for
/// `read_timeout`.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub read_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(120),
            user_agent: format!("duva/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            connect_timeout: env_parse("DUVA_HTTP_CONNECT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            timeout: env_parse("DUVA_HTTP_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            read_timeout: env_parse("DUVA_HTTP_READ_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.read_timeout),
            ..defaults
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

// =============================================================================
// Export polling
// =============================================================================

/// Bounded retry policy for the export poller.
///
/// One canonical policy is used everywhere: `max_attempts` polls in total
/// (including the first), sleeping `base_delay * attempt` between polls,
/// and `download_retries` extra attempts for the raw file download.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub download_retries: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(30),
            download_retries: 3,
        }
    }
}

impl PollerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_parse::<u32>("DUVA_EXPORT_POLL_ATTEMPTS")
                .unwrap_or(defaults.max_attempts)
                .max(1),
            base_delay: env_parse("DUVA_EXPORT_POLL_DELAY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.base_delay),
            download_retries: env_parse("DUVA_DOWNLOAD_RETRIES")
                .unwrap_or(defaults.download_retries),
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Delay before poll number `attempt + 1`.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

// =============================================================================
// Job lifecycle
// =============================================================================

/// Recurring-job and auto-deactivation policy.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Interval between scheduled runs of the same file.
    pub sync_interval: Duration,
    /// Consecutive failures after which an active file is deactivated.
    pub failure_threshold: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(15 * 60),
            failure_threshold: 3,
        }
    }
}

impl LifecycleConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sync_interval: env_parse("DUVA_SYNC_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sync_interval),
            failure_threshold: env_parse::<u32>("DUVA_JOB_FAILURE_THRESHOLD")
                .unwrap_or(defaults.failure_threshold)
                .max(1),
        }
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }
}

// =============================================================================
// Sync orchestration
// =============================================================================

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Scratch directory for downloaded CSVs and built extracts.
    pub media_root: PathBuf,
    /// Lifetime of presigned download links.
    pub presign_expiry: Duration,
    /// How long to wait for the per-file lock before skipping the run.
    pub lock_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            media_root: std::env::temp_dir().join("duva"),
            presign_expiry: Duration::from_secs(3600),
            lock_timeout: Duration::from_secs(1),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            media_root: std::env::var("DUVA_MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_root),
            presign_expiry: env_parse("DUVA_DOWNLOAD_URL_EXPIRY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.presign_expiry),
            lock_timeout: env_parse("DUVA_SYNC_LOCK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
        }
    }

    pub fn with_media_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.media_root = root.into();
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

// =============================================================================
// Object storage
// =============================================================================

/// Where extracts are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// S3 or an S3-compatible endpoint. Credentials come from the standard
    /// `AWS_*` environment variables.
    S3 {
        bucket: String,
        region: Option<String>,
        endpoint: Option<String>,
    },
    /// Local directory, for development.
    Local { root: PathBuf },
}

impl StorageConfig {
    /// Reads `DUVA_S3_BUCKET` (plus optional `DUVA_S3_REGION` and
    /// `DUVA_S3_ENDPOINT`), falling back to `DUVA_STORAGE_DIR`.
    pub fn from_env() -> Result<Self, AppError> {
        if let Ok(bucket) = std::env::var("DUVA_S3_BUCKET") {
            return Ok(Self::S3 {
                bucket,
                region: std::env::var("DUVA_S3_REGION").ok(),
                endpoint: std::env::var("DUVA_S3_ENDPOINT").ok(),
            });
        }
        match std::env::var("DUVA_STORAGE_DIR") {
            Ok(root) => Ok(Self::Local {
                root: PathBuf::from(root),
            }),
            Err(_) => Err(AppError::ConfigError(
                "set DUVA_S3_BUCKET or DUVA_STORAGE_DIR".to_string(),
            )),
        }
    }
}
