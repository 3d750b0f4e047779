//! HTTP request handlers for API endpoints.

pub mod accounts;
pub mod configurations;
pub mod files;
pub mod health;
