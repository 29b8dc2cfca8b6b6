//! ConnectionPoolManager - registry of database connections and their pools.
//!
//! The manager is an ordinary value: build it with [`ConnectionPoolManager::load`],
//! share it behind an `Arc`, and hand that `Arc` to whoever needs a pool or to
//! the [`HealthChecker`](crate::connections::HealthChecker).
//!
//! Lock order is registry before pools. Neither lock is held across a probe.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{RegistryFile, RegistryStore, Settings};
use crate::connections::discovery::DiscoveredDatabase;
use crate::connections::pool::DbPool;
use crate::connections::probe::{ConnectionProbe, ProbeMode, SqlxProbe};
use crate::connections::types::{
    ConnectionConfig, ConnectionInfo, ConnectionState, ConnectionUpdate, PoolStats,
    TestConnectionResponse,
};
use crate::error::{DbHubError, Result};
use crate::types::{ConnectionStatus, DatabaseKind};

struct ConnectionEntry {
    config: ConnectionConfig,
    state: ConnectionState,
}

/// Owns every registered connection, its pool and its health state.
pub struct ConnectionPoolManager {
    settings: Settings,
    store: RegistryStore,
    registry: RwLock<BTreeMap<String, ConnectionEntry>>,
    pools: RwLock<HashMap<String, DbPool>>,
    probe: Arc<dyn ConnectionProbe>,
    /// Serialises read-modify-write cycles on the registry file
    persist_lock: Mutex<()>,
}

impl ConnectionPoolManager {
    /// Load the registry file and build a pool for every enabled entry.
    pub async fn load(settings: Settings, probe: Arc<dyn ConnectionProbe>) -> Result<Arc<Self>> {
        let store = RegistryStore::new(settings.registry_path());
        let file = store.load().await?;

        let mut registry = BTreeMap::new();
        for (id, entry) in &file.databases {
            if !entry.is_enabled() {
                debug!("Skipping disabled database {}", id);
                continue;
            }
            registry.insert(
                id.clone(),
                ConnectionEntry {
                    config: ConnectionConfig::from_entry(id, entry),
                    state: ConnectionState::new(),
                },
            );
        }
        let ids: Vec<String> = registry.keys().cloned().collect();

        let manager = Self {
            settings,
            store,
            registry: RwLock::new(registry),
            pools: RwLock::new(HashMap::new()),
            probe,
            persist_lock: Mutex::new(()),
        };

        for id in &ids {
            manager.create_pool(id).await;
        }

        info!("Loaded {} database connection configs", ids.len());
        Ok(Arc::new(manager))
    }

    /// Load with the production probe.
    pub async fn load_default(settings: Settings) -> Result<Arc<Self>> {
        Self::load(settings, Arc::new(SqlxProbe)).await
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn connection_ids(&self) -> Vec<String> {
        self.registry.read().await.keys().cloned().collect()
    }

    pub async fn connection_config(&self, id: &str) -> Option<ConnectionConfig> {
        self.registry.read().await.get(id).map(|e| e.config.clone())
    }

    pub async fn get_connection(&self, id: &str) -> Option<ConnectionInfo> {
        let registry = self.registry.read().await;
        let entry = registry.get(id)?;
        let pools = self.pools.read().await;
        let stats = PoolStats::new(id, pools.get(id).map(DbPool::counts));
        Some(ConnectionInfo::new(&entry.config, &entry.state, &stats))
    }

    /// All connections ordered by id.
    pub async fn list_connections(&self) -> Vec<ConnectionInfo> {
        let registry = self.registry.read().await;
        let pools = self.pools.read().await;
        registry
            .iter()
            .map(|(id, entry)| {
                let stats = PoolStats::new(id, pools.get(id).map(DbPool::counts));
                ConnectionInfo::new(&entry.config, &entry.state, &stats)
            })
            .collect()
    }

    /// Pool handle for `id`, if one exists. Callers acquire connections from it.
    pub async fn pool(&self, id: &str) -> Option<DbPool> {
        self.pools.read().await.get(id).cloned()
    }

    pub async fn pool_stats(&self, id: &str) -> Result<PoolStats> {
        if !self.registry.read().await.contains_key(id) {
            return Err(DbHubError::ConnectionNotFound(id.to_string()));
        }
        let pools = self.pools.read().await;
        Ok(PoolStats::new(id, pools.get(id).map(DbPool::counts)))
    }

    /// Probe the connection once and record the outcome.
    ///
    /// A failing database is reported in the response; only an unknown id
    /// is an `Err`.
    #[instrument(skip(self))]
    pub async fn test_connection(&self, id: &str) -> Result<TestConnectionResponse> {
        let config = {
            let mut registry = self.registry.write().await;
            let entry = registry
                .get_mut(id)
                .ok_or_else(|| DbHubError::ConnectionNotFound(id.to_string()))?;
            entry.state.status = ConnectionStatus::Checking;
            entry.config.clone()
        };

        let started = Instant::now();
        let outcome = self
            .probe
            .probe(&config, ProbeMode::Ping, config.health_check.timeout())
            .await;
        let elapsed = started.elapsed();
        let now = Utc::now();

        let (status, error) = match outcome {
            Ok(()) => (ConnectionStatus::Connected, None),
            Err(e) => {
                error!("Connection test for {} failed: {}", id, e);
                (ConnectionStatus::Error, Some(e.to_string()))
            }
        };

        self.update_state(id, |state| {
            state.status = status;
            state.last_check = Some(now);
            state.error = error.clone();
        })
        .await;

        let latency_ms = (status == ConnectionStatus::Connected).then(|| round_ms(elapsed));
        Ok(TestConnectionResponse {
            connection_id: id.to_string(),
            status,
            latency_ms,
            error,
            timestamp: now,
        })
    }

    /// Apply `update`, persist it, and rebuild the pool.
    #[instrument(skip(self, update))]
    pub async fn update_connection(&self, id: &str, update: &ConnectionUpdate) -> Result<ConnectionInfo> {
        let mut config = self
            .connection_config(id)
            .await
            .ok_or_else(|| DbHubError::ConnectionNotFound(id.to_string()))?;
        update.apply(&mut config);

        self.persist(|file| {
            let entry = file.databases.entry(id.to_string()).or_default();
            config.write_entry(entry);
        })
        .await?;

        {
            let mut registry = self.registry.write().await;
            match registry.get_mut(id) {
                Some(entry) => entry.config = config,
                None => return Err(DbHubError::ConnectionNotFound(id.to_string())),
            }
        }

        self.create_pool(id).await;
        info!("Updated connection {}", id);

        self.get_connection(id)
            .await
            .ok_or_else(|| DbHubError::ConnectionNotFound(id.to_string()))
    }

    /// Add a new connection, persist it and build its pool.
    #[instrument(skip(self, config), fields(id = %config.id))]
    pub async fn register_connection(&self, config: ConnectionConfig) -> Result<ConnectionInfo> {
        let id = config.id.clone();
        if self.registry.read().await.contains_key(&id) {
            return Err(DbHubError::ConnectionExists(id));
        }

        self.persist(|file| {
            let entry = file.databases.entry(id.clone()).or_default();
            config.write_entry(entry);
        })
        .await?;

        {
            let mut registry = self.registry.write().await;
            if registry.contains_key(&id) {
                return Err(DbHubError::ConnectionExists(id));
            }
            registry.insert(
                id.clone(),
                ConnectionEntry {
                    config,
                    state: ConnectionState::new(),
                },
            );
        }

        self.create_pool(&id).await;
        info!("Registered connection {}", id);

        self.get_connection(&id)
            .await
            .ok_or(DbHubError::ConnectionNotFound(id))
    }

    /// Close the pool and forget the connection, in memory and on disk.
    #[instrument(skip(self))]
    pub async fn remove_connection(&self, id: &str) -> Result<()> {
        if !self.registry.read().await.contains_key(id) {
            return Err(DbHubError::ConnectionNotFound(id.to_string()));
        }

        self.persist(|file| {
            file.databases.remove(id);
        })
        .await?;

        self.registry.write().await.remove(id);
        self.close_pool(id).await;

        info!("Removed connection {}", id);
        Ok(())
    }

    /// Tear the pool down, build it again and test the result.
    #[instrument(skip(self))]
    pub async fn reconnect(&self, id: &str) -> Result<ConnectionInfo> {
        self.set_status(id, ConnectionStatus::Reconnecting).await?;
        info!("Reconnecting {}", id);

        self.close_pool(id).await;
        self.create_pool(id).await;
        self.test_connection(id).await?;

        self.get_connection(id)
            .await
            .ok_or_else(|| DbHubError::ConnectionNotFound(id.to_string()))
    }

    /// Run the configured health check with retries.
    ///
    /// After the last failed attempt the connection is marked `error` and a
    /// reconnect is attempted. Returns the status the connection ends in.
    #[instrument(skip(self))]
    pub async fn health_check_connection(&self, id: &str) -> Result<ConnectionStatus> {
        let config = self
            .connection_config(id)
            .await
            .ok_or_else(|| DbHubError::ConnectionNotFound(id.to_string()))?;

        let attempts = config.health_check.retries.max(1) as usize;
        let timeout = config.health_check.timeout();
        let strategy = FixedInterval::new(self.settings.retry_delay()).take(attempts - 1);

        let result = Retry::spawn(strategy, || self.probe_once(&config, timeout)).await;
        let now = Utc::now();

        match result {
            Ok(()) => {
                self.update_state(id, |state| {
                    state.status = ConnectionStatus::Connected;
                    state.error = None;
                    state.last_check = Some(now);
                })
                .await;
                debug!("Health check for {} passed", id);
                Ok(ConnectionStatus::Connected)
            }
            Err(e) => {
                self.update_state(id, |state| {
                    state.fail(&e);
                    state.last_check = Some(now);
                })
                .await;
                warn!("Health check for {} failed after {} attempts: {}", id, attempts, e);

                let info = self.reconnect(id).await?;
                Ok(info.status)
            }
        }
    }

    /// Connections whose health check is due at `now`.
    pub async fn due_for_check(&self, now: DateTime<Utc>) -> Vec<String> {
        let registry = self.registry.read().await;
        registry
            .iter()
            .filter(|(_, entry)| entry.config.enabled && entry.config.health_check.enabled)
            .filter(|(_, entry)| match entry.state.last_check {
                None => true,
                Some(last) => {
                    let interval = chrono::Duration::seconds(entry.config.health_check.interval as i64);
                    now.signed_duration_since(last) >= interval
                }
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Register every discovered SQLite database that is not registered yet.
    pub async fn adopt_discovered(&self, found: &[DiscoveredDatabase]) -> Result<Vec<String>> {
        let mut adopted = Vec::new();

        for db in found.iter().filter(|db| db.kind == DatabaseKind::Sqlite) {
            if self.is_path_registered(&db.path).await {
                continue;
            }

            let id = self.unique_id(&db.id).await;
            let mut config = ConnectionConfig::sqlite(id.clone(), &db.path);
            config.name = db.name.clone();

            match self.register_connection(config).await {
                Ok(_) => adopted.push(id),
                Err(DbHubError::ConnectionExists(existing)) => {
                    debug!("{} registered concurrently, skipping", existing);
                }
                Err(e) => return Err(e),
            }
        }

        if !adopted.is_empty() {
            info!("Adopted {} discovered databases", adopted.len());
        }
        Ok(adopted)
    }

    /// Close every pool. Safe to call more than once.
    pub async fn shutdown(&self) {
        let pools: Vec<(String, DbPool)> = self.pools.write().await.drain().collect();
        for (id, pool) in pools {
            pool.close().await;
            debug!("Closed pool for {}", id);
        }
        info!("All connection pools closed");
    }

    async fn probe_once(&self, config: &ConnectionConfig, timeout: Duration) -> Result<()> {
        let result = self.probe.probe(config, ProbeMode::Integrity, timeout).await;
        if let Err(e) = &result {
            debug!("Health probe attempt for {} failed: {}", config.id, e);
        }
        result
    }

    async fn create_pool(&self, id: &str) {
        self.close_pool(id).await;

        let Some(config) = self.connection_config(id).await else {
            return;
        };
        if !config.enabled {
            debug!("Connection {} is disabled, no pool", id);
            return;
        }

        match DbPool::build(&config) {
            Ok(Some(pool)) => {
                self.pools.write().await.insert(id.to_string(), pool);
            }
            Ok(None) => {
                debug!("Connection {} is not complete enough for a pool", id);
            }
            Err(e) => {
                error!("Failed to create pool for {}: {}", id, e);
                self.update_state(id, |state| state.fail(&e)).await;
            }
        }
    }

    async fn close_pool(&self, id: &str) {
        let removed = self.pools.write().await.remove(id);
        if let Some(pool) = removed {
            pool.close().await;
            info!("Closed pool for {}", id);
        }
    }

    async fn set_status(&self, id: &str, status: ConnectionStatus) -> Result<()> {
        let mut registry = self.registry.write().await;
        let entry = registry
            .get_mut(id)
            .ok_or_else(|| DbHubError::ConnectionNotFound(id.to_string()))?;
        entry.state.status = status;
        Ok(())
    }

    async fn update_state<F>(&self, id: &str, apply: F)
    where
        F: FnOnce(&mut ConnectionState),
    {
        if let Some(entry) = self.registry.write().await.get_mut(id) {
            apply(&mut entry.state);
        }
    }

    async fn persist<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut RegistryFile),
    {
        let _guard = self.persist_lock.lock().await;
        let mut file = self.store.load().await?;
        edit(&mut file);
        self.store.save(&file).await
    }

    async fn is_path_registered(&self, path: &Path) -> bool {
        let registry = self.registry.read().await;
        registry
            .values()
            .filter_map(|e| e.config.path.as_deref())
            .any(|p| Path::new(p) == path)
    }

    async fn unique_id(&self, base: &str) -> String {
        let registry = self.registry.read().await;
        if !registry.contains_key(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !registry.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }
}

fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}
