//! Duva Client - HTTP and storage collaborators for the sync pipeline
//!
//! This crate provides the concrete implementations of the I/O traits
//! defined in `duva_core`:
//!
//! - [`ona`] - OnaData survey API ([`UpstreamApi`](duva_core::UpstreamApi))
//! - [`broker`] - OAuth2 token refresh ([`CredentialBroker`](duva_core::CredentialBroker))
//! - [`tableau`] - Tableau REST publishing ([`PublishClient`](duva_core::PublishClient))
//! - [`storage`] - S3 / local extract storage ([`ObjectStorage`](duva_core::ObjectStorage))
//!
//! # Overview
//!
//! The clients handle authentication, request building, response parsing,
//! and error classification. Retries and backoff belong to the pipeline.

pub mod broker;
mod http;
pub mod ona;
pub mod storage;
pub mod tableau;

// Re-export main client types
pub use broker::OnaTokenBroker;
pub use ona::OnaDataClient;
pub use storage::ObjectStoreStorage;
pub use tableau::TableauClient;
