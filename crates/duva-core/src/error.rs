//! Error types for the duva sync pipeline.
//!
//! All crates in the workspace speak [`AppError`]. Library-level errors are
//! converted automatically where a `#[from]` impl exists:
//!
//! - `sqlx::Error` → `AppError::DatabaseError`
//! - `serde_json::Error` → `AppError::SerializationError`
//! - `std::io::Error` → `AppError::IoError`
//!
//! The variants in the "pipeline" section map one-to-one onto the outcomes
//! the sync orchestrator distinguishes. They are caught at the orchestrator
//! boundary and turned into a file status plus a failure reason; they never
//! crash a worker.
//!
//! # Example
//!
//! ```no_run
//! use duva_core::error::AppError;
//!
//! fn example() -> Result<(), AppError> {
//!     Err(AppError::CsvExportFailure("form has no submissions".to_string()))
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// Wraps all errors from SQLx, including connection failures, query
    /// errors and constraint violations.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Local filesystem operation failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// HTTP client request failed in a way not covered by a more specific variant.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// Network or connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Requested entity does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Request conflicts with existing state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upstream rejected our credentials even after a token refresh.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // -------------------------------------------------------------------------
    // Pipeline errors
    // -------------------------------------------------------------------------
    /// The upstream form is encrypted and cannot be exported.
    ///
    /// Registration is rejected and the tracked file is never created.
    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    /// Upstream explicitly reported that the CSV export failed.
    ///
    /// Carries the reason the server supplied.
    #[error("CSV export failed: {0}")]
    CsvExportFailure(String),

    /// Transient network, timeout, or unexpected-status condition while
    /// talking to the upstream export API.
    #[error("Connection request error: {0}")]
    ConnectionRequest(String),

    /// The downloaded CSV could not be read or rewritten.
    #[error("CSV normalization failed: {0}")]
    NormalizeError(String),

    /// The bulk-load engine rejected the normalized CSV.
    #[error("Extract build failed: {0}")]
    ExtractBuild(String),

    /// The BI publish target's credentials or configuration are invalid.
    #[error("Publish validation failed: {0}")]
    PublishValidation(String),

    /// Object storage operation failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// A secret could not be encrypted or decrypted.
    #[error("Crypto error: {0}")]
    CryptoError(String),

    /// Generic application error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::DatabaseError(e) => {
                if e.to_string().contains("connection") {
                    "Cannot connect to database. Is PostgreSQL running?\n   Try: docker-compose up -d".to_string()
                } else {
                    format!("Database error: {}", e)
                }
            }
            AppError::UnsupportedSource(_) => {
                "Encrypted forms cannot be exported.\n   Choose a form without a public key."
                    .to_string()
            }
            AppError::Unauthorized(_) => {
                "The data server rejected the stored credentials.\n   Log in again to refresh them."
                    .to_string()
            }
            AppError::NetworkError(msg) | AppError::ConnectionRequest(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!(
                    "Request timed out after {} seconds.\n   The server may be overloaded. Try again later.",
                    secs
                )
            }
            AppError::PublishValidation(msg) => {
                format!(
                    "Publish configuration is invalid: {}\n   Check the server address, site and access token.",
                    msg
                )
            }
            AppError::ConfigError(msg) => {
                format!("Configuration error: {}\n   Check your environment.", msg)
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is transient and the run should simply be
    /// retried on the next schedule.
    ///
    /// # Examples
    ///
    /// ```
    /// use duva_core::error::AppError;
    ///
    /// let err = AppError::ConnectionRequest("502 Bad Gateway".to_string());
    /// assert!(err.is_retryable());
    ///
    /// let err = AppError::UnsupportedSource("encrypted".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NetworkError(_)
                | AppError::Timeout(_)
                | AppError::ClientError(_)
                | AppError::ConnectionRequest(_)
                | AppError::CsvExportFailure(_)
                | AppError::StorageError(_)
        )
    }

    /// Short reason string recorded in the tracked file's metadata after a
    /// failed run.
    pub fn failure_reason(&self) -> String {
        match self {
            AppError::CsvExportFailure(reason)
            | AppError::ConnectionRequest(reason)
            | AppError::ExtractBuild(reason)
            | AppError::NormalizeError(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}
