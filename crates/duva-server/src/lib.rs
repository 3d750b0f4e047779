//! duva Server - REST API and embedded sync worker
//!
//! This crate exposes the management API for duva:
//!
//! - **Accounts**: upstream servers and user credentials
//! - **Configurations**: BI publish targets, validated on save
//! - **Files**: tracked forms, download links and manual syncs
//!
//! It also owns [`PgStack`], the production wiring of the sync pipeline
//! shared with the CLI.
//!
//! # API Documentation
//!
//! When running the server, interactive API documentation is available
//! at `/swagger-ui`.

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod router;
pub mod stack;
pub mod state;

pub use config::ServerConfig;
pub use error::ApiError;
pub use router::create_router;
pub use stack::{PgStack, StackSettings, build_sync_service};
pub use state::AppState;
