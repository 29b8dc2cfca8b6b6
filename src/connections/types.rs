//! Connection configuration and the read models handed out by the manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::config::DatabaseEntry;
use crate::types::{ConnectionStatus, DatabaseKind};

pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Pool sizing for one connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections kept open while idle
    pub min_size: u32,
    /// Steady-state pool size
    pub max_size: u32,
    /// Extra connections allowed on top of `max_size` under load
    pub max_overflow: u32,
    /// Seconds to wait for a free connection
    pub pool_timeout: u64,
    /// Seconds after which a connection is retired
    pub pool_recycle: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 2,
            max_size: 10,
            max_overflow: 20,
            pool_timeout: 30,
            pool_recycle: 3600,
        }
    }
}

impl PoolConfig {
    pub fn max_connections(&self) -> u32 {
        self.max_size.max(self.min_size).saturating_add(self.max_overflow).max(1)
    }

    pub fn min_connections(&self) -> u32 {
        self.min_size.min(self.max_connections())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_timeout)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.pool_recycle)
    }
}

/// Background health-check policy for one connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    /// Seconds between checks
    pub interval: u64,
    /// Seconds allowed per attempt
    pub timeout: u64,
    /// Attempts before the connection is marked as failed
    pub retries: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 30,
            timeout: 5,
            retries: 3,
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }
}

/// Everything needed to open a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DatabaseKind,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub path: Option<String>,
    pub table_type: Option<String>,
    pub enabled: bool,
    pub pool: PoolConfig,
    pub health_check: HealthCheckConfig,
}

impl ConnectionConfig {
    pub fn sqlite(id: impl Into<String>, path: impl AsRef<Path>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: DatabaseKind::Sqlite,
            host: None,
            port: None,
            database: None,
            username: None,
            password: None,
            path: Some(path.as_ref().to_string_lossy().into_owned()),
            table_type: None,
            enabled: true,
            pool: PoolConfig::default(),
            health_check: HealthCheckConfig::default(),
        }
    }

    pub fn postgres(
        id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: DatabaseKind::Postgresql,
            host: Some(host.into()),
            port: Some(port),
            database: Some(database.into()),
            username: None,
            password: None,
            path: None,
            table_type: None,
            enabled: true,
            pool: PoolConfig::default(),
            health_check: HealthCheckConfig::default(),
        }
    }

    pub fn from_entry(id: &str, entry: &DatabaseEntry) -> Self {
        Self {
            id: id.to_string(),
            name: entry.name.clone().unwrap_or_else(|| id.to_string()),
            kind: entry
                .kind
                .as_deref()
                .map(DatabaseKind::from)
                .unwrap_or_default(),
            host: non_empty(entry.host.as_deref()),
            port: entry.port.filter(|p| *p != 0),
            database: non_empty(entry.database.as_deref()),
            username: non_empty(entry.username.as_deref()),
            password: entry.password.clone(),
            path: non_empty(entry.path.as_deref()),
            table_type: non_empty(entry.table_type.as_deref()),
            enabled: entry.is_enabled(),
            pool: entry.connection_pool.clone().unwrap_or_default(),
            health_check: entry.health_check.clone().unwrap_or_default(),
        }
    }

    /// Write this config back into a registry entry, keeping unknown keys.
    pub fn write_entry(&self, entry: &mut DatabaseEntry) {
        entry.name = Some(self.name.clone());
        entry.kind = Some(self.kind.to_string());
        entry.host = self.host.clone();
        entry.port = self.port;
        entry.database = self.database.clone();
        entry.username = self.username.clone();
        if self.password.is_some() {
            entry.password = self.password.clone();
        }
        entry.path = self.path.clone();
        entry.table_type = self.table_type.clone();
        entry.enabled = Some(self.enabled);
        entry.connection_pool = Some(self.pool.clone());
        entry.health_check = Some(self.health_check.clone());
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_POSTGRES_PORT)
    }

    pub fn username_or_default(&self) -> &str {
        self.username.as_deref().unwrap_or("postgres")
    }

    pub fn password_or_default(&self) -> &str {
        self.password.as_deref().unwrap_or("postgres")
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Mutable state the manager tracks per connection.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            last_check: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn fail(&mut self, error: impl ToString) {
        self.status = ConnectionStatus::Error;
        self.error = Some(error.to_string());
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection as reported to callers. Never carries credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DatabaseKind,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub path: Option<String>,
    pub table_type: Option<String>,
    pub enabled: bool,
    pub status: ConnectionStatus,
    pub pool_size: u32,
    pub checked_out: u32,
    pub last_check: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConnectionInfo {
    pub fn new(config: &ConnectionConfig, state: &ConnectionState, stats: &PoolStats) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            kind: config.kind.clone(),
            host: config.host.clone(),
            port: config.port,
            database: config.database.clone(),
            path: config.path.clone(),
            table_type: config.table_type.clone(),
            enabled: config.enabled,
            status: state.status,
            pool_size: stats.pool_size,
            checked_out: stats.checked_out,
            last_check: state.last_check,
            error: state.error.clone(),
            created_at: state.created_at,
        }
    }
}

/// Pool occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCounts {
    pub size: u32,
    pub idle: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub connection_id: String,
    /// Open connections
    pub pool_size: u32,
    /// Connections currently lent out
    pub checked_out: u32,
    /// Open connections ready to lend
    pub available: u32,
}

impl PoolStats {
    pub fn new(connection_id: &str, counts: Option<PoolCounts>) -> Self {
        let counts = counts.unwrap_or(PoolCounts { size: 0, idle: 0 });
        let checked_out = counts.size.saturating_sub(counts.idle);
        Self {
            connection_id: connection_id.to_string(),
            pool_size: counts.size,
            checked_out,
            available: counts.size - checked_out,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConnectionResponse {
    pub connection_id: String,
    pub status: ConnectionStatus,
    pub latency_ms: Option<f64>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Partial update applied by `ConnectionPoolManager::update_connection`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionUpdate {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub path: Option<String>,
    pub enabled: Option<bool>,
    pub pool_min_size: Option<u32>,
    pub pool_max_size: Option<u32>,
    pub health_check_enabled: Option<bool>,
}

impl ConnectionUpdate {
    pub fn is_empty(&self) -> bool {
        self == &ConnectionUpdate::default()
    }

    pub fn apply(&self, config: &mut ConnectionConfig) {
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(host) = &self.host {
            config.host = non_empty(Some(host));
        }
        if let Some(port) = self.port {
            config.port = Some(port);
        }
        if let Some(database) = &self.database {
            config.database = non_empty(Some(database));
        }
        if let Some(path) = &self.path {
            config.path = non_empty(Some(path));
        }
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(min_size) = self.pool_min_size {
            config.pool.min_size = min_size;
        }
        if let Some(max_size) = self.pool_max_size {
            config.pool.max_size = max_size;
        }
        if let Some(enabled) = self.health_check_enabled {
            config.health_check.enabled = enabled;
        }
    }
}
