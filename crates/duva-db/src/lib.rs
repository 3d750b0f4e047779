//! Duva DB - PostgreSQL persistence layer
//!
//! This crate implements the persistence traits of `duva_core` with sqlx.
//!
//! # Overview
//!
//! The main components are:
//! - [`TrackedFileRepository`] - tracked files and their job metadata
//! - [`PublishTargetRepository`] - BI publish configurations
//! - [`AccountRepository`] - upstream servers, users and token rotation
//! - [`PgJobScheduler`] - recurring and one-shot sync registrations
//! - [`PgSyncLock`] - advisory-lock based mutual exclusion for sync runs
//! - [`run_migrations`] - embedded schema

mod accounts;
mod files;
mod lock;
mod migrations;
mod scheduler;
mod targets;

pub use accounts::AccountRepository;
pub use files::TrackedFileRepository;
pub use lock::{PgLockGuard, PgSyncLock};
pub use migrations::{MIGRATIONS, run_migrations};
pub use scheduler::PgJobScheduler;
pub use targets::PublishTargetRepository;
