//! dbhub - database connection hub for the data services
//!
//! This crate keeps a registry of PostgreSQL and SQLite connections with pooled
//! access and background health checking, plus a table-metadata registry, a
//! finance-data store with technical indicators, and a read-only explorer for
//! SQLite files under the data root.

pub mod analytics;
pub mod config;
pub mod connections;
pub mod error;
pub mod explorer;
pub mod finance;
pub mod metadata;
pub mod types;

// Re-export main types for convenience
pub use config::Settings;
pub use connections::{ConnectionPoolManager, HealthCheckHandle, HealthChecker, SqlxProbe};
pub use error::{DbHubError, Result};
pub use types::{ConnectionStatus, DatabaseKind};
