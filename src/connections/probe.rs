//! One-shot connectivity probes.
//!
//! A probe opens its own unpooled connection, runs a trivial statement and
//! closes it again, so a broken pool cannot mask a healthy server (or the
//! other way round). The trait is the seam the manager is tested through.

use async_trait::async_trait;
use sqlx::{Connection, PgConnection, SqliteConnection};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::connections::pool::{postgres_options, sqlite_options};
use crate::connections::types::ConnectionConfig;
use crate::error::{DbHubError, Result};
use crate::types::DatabaseKind;

/// What a probe verifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// `SELECT 1`
    Ping,
    /// `PRAGMA integrity_check` on SQLite, `SELECT 1` elsewhere
    Integrity,
}

#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    /// Succeeds when the database behind `config` answers within `timeout`.
    async fn probe(&self, config: &ConnectionConfig, mode: ProbeMode, timeout: Duration) -> Result<()>;
}

/// Probe backed by real sqlx connections.
#[derive(Debug, Default, Clone)]
pub struct SqlxProbe;

#[async_trait]
impl ConnectionProbe for SqlxProbe {
    async fn probe(&self, config: &ConnectionConfig, mode: ProbeMode, timeout: Duration) -> Result<()> {
        let work = async {
            match &config.kind {
                DatabaseKind::Postgresql => probe_postgres(config).await,
                DatabaseKind::Sqlite => probe_sqlite(config, mode).await,
                DatabaseKind::Other(kind) => Err(DbHubError::UnsupportedKind(kind.clone())),
            }
        };

        match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(DbHubError::Timeout {
                operation: "connection probe",
                timeout,
            }),
        }
    }
}

async fn probe_postgres(config: &ConnectionConfig) -> Result<()> {
    let options = postgres_options(config).ok_or_else(|| DbHubError::IncompleteConfig {
        id: config.id.clone(),
        missing: "host or database",
    })?;

    let mut conn = PgConnection::connect_with(&options).await?;
    sqlx::query("SELECT 1").execute(&mut conn).await?;
    conn.close().await?;

    debug!("PostgreSQL probe for {} succeeded", config.id);
    Ok(())
}

async fn probe_sqlite(config: &ConnectionConfig, mode: ProbeMode) -> Result<()> {
    let path = config.path.as_deref().ok_or_else(|| DbHubError::IncompleteConfig {
        id: config.id.clone(),
        missing: "path",
    })?;
    if !Path::new(path).exists() {
        return Err(DbHubError::DatabaseNotFound(PathBuf::from(path)));
    }

    // a locked file waits out the busy handler; the caller's deadline reports it
    let mut conn = SqliteConnection::connect_with(&sqlite_options(path)).await?;

    match mode {
        ProbeMode::Ping => {
            sqlx::query("SELECT 1").execute(&mut conn).await?;
        }
        ProbeMode::Integrity => {
            let verdict: String = sqlx::query_scalar("PRAGMA integrity_check")
                .fetch_one(&mut conn)
                .await?;
            if verdict != "ok" {
                conn.close().await?;
                return Err(DbHubError::IntegrityCheck(verdict));
            }
        }
    }
    conn.close().await?;

    debug!("SQLite probe ({:?}) for {} succeeded", mode, config.id);
    Ok(())
}
