//! Pooled handles for registered databases.

use sqlx::postgres::{PgConnectOptions, PgPool};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::Path;
use tracing::info;

use crate::connections::types::{ConnectionConfig, PoolConfig, PoolCounts};
use crate::error::{DbHubError, Result};
use crate::types::DatabaseKind;

/// A live pool for one registered connection.
#[derive(Debug, Clone)]
pub enum DbPool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    /// Build a pool for `config` without opening any connection yet.
    ///
    /// Returns `Ok(None)` when the config is not complete enough to point at a
    /// database (no host/database for PostgreSQL, no existing file for SQLite).
    pub fn build(config: &ConnectionConfig) -> Result<Option<Self>> {
        match &config.kind {
            DatabaseKind::Postgresql => {
                let Some(options) = postgres_options(config) else {
                    return Ok(None);
                };
                let pool = pool_options::<sqlx::Postgres>(&config.pool).connect_lazy_with(options);
                info!("Created PostgreSQL pool for {}", config.id);
                Ok(Some(DbPool::Postgres(pool)))
            }
            DatabaseKind::Sqlite => {
                let Some(path) = config.path.as_deref() else {
                    return Ok(None);
                };
                if !Path::new(path).exists() {
                    return Ok(None);
                }
                let options = sqlite_options(path);
                let pool = pool_options::<sqlx::Sqlite>(&config.pool).connect_lazy_with(options);
                info!("Created SQLite pool for {}", config.id);
                Ok(Some(DbPool::Sqlite(pool)))
            }
            DatabaseKind::Other(kind) => Err(DbHubError::UnsupportedKind(kind.clone())),
        }
    }

    pub fn kind(&self) -> DatabaseKind {
        match self {
            DbPool::Postgres(_) => DatabaseKind::Postgresql,
            DbPool::Sqlite(_) => DatabaseKind::Sqlite,
        }
    }

    pub fn counts(&self) -> PoolCounts {
        let (size, idle) = match self {
            DbPool::Postgres(pool) => (pool.size(), pool.num_idle()),
            DbPool::Sqlite(pool) => (pool.size(), pool.num_idle()),
        };
        PoolCounts {
            size,
            idle: u32::try_from(idle).unwrap_or(u32::MAX).min(size),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            DbPool::Postgres(pool) => pool.is_closed(),
            DbPool::Sqlite(pool) => pool.is_closed(),
        }
    }

    /// Wait for lent connections to come back, then close everything.
    pub async fn close(&self) {
        match self {
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::Sqlite(pool) => pool.close().await,
        }
    }
}

fn pool_options<DB: sqlx::Database>(pool: &PoolConfig) -> sqlx::pool::PoolOptions<DB> {
    sqlx::pool::PoolOptions::<DB>::new()
        .min_connections(pool.min_connections())
        .max_connections(pool.max_connections())
        .acquire_timeout(pool.acquire_timeout())
        .max_lifetime(pool.max_lifetime())
        .test_before_acquire(true)
}

pub(crate) fn postgres_options(config: &ConnectionConfig) -> Option<PgConnectOptions> {
    let host = config.host.as_deref()?;
    let database = config.database.as_deref()?;
    Some(
        PgConnectOptions::new()
            .host(host)
            .port(config.port_or_default())
            .database(database)
            .username(config.username_or_default())
            .password(config.password_or_default()),
    )
}

pub(crate) fn sqlite_options(path: &str) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_incomplete_configs_yield_no_pool() {
        let mut pg = ConnectionConfig::postgres("pg", "localhost", 5432, "app");
        pg.database = None;
        assert!(DbPool::build(&pg).unwrap().is_none());

        let sqlite = ConnectionConfig::sqlite("lite", "/definitely/not/here.db");
        assert!(DbPool::build(&sqlite).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_kind_is_an_error() {
        let mut config = ConnectionConfig::sqlite("x", "/tmp/x.db");
        config.kind = DatabaseKind::Other("mysql".into());
        assert!(matches!(
            DbPool::build(&config),
            Err(DbHubError::UnsupportedKind(_))
        ));
    }

    #[tokio::test]
    async fn test_sqlite_pool_is_lazy_and_closable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lazy.db");
        std::fs::File::create(&path).unwrap();

        let mut config = ConnectionConfig::sqlite("lazy", &path);
        config.pool.min_size = 0;
        let pool = DbPool::build(&config).unwrap().unwrap();
        assert_eq!(pool.kind(), DatabaseKind::Sqlite);

        if let DbPool::Sqlite(inner) = &pool {
            let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(inner).await.unwrap();
            assert_eq!(one, 1);
        }
        assert!(pool.counts().size >= 1);

        pool.close().await;
        assert!(pool.is_closed());
    }
}
