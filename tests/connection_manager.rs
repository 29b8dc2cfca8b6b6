//! Tests for ConnectionPoolManager and the health checker

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use dbhub::config::{RegistryStore, REGISTRY_FILE};
use dbhub::connections::{
    discover_databases, ConnectionConfig, ConnectionPoolManager, ConnectionProbe, ConnectionUpdate,
    HealthChecker, ProbeMode, SqlxProbe,
};
use dbhub::{ConnectionStatus, DbHubError, Settings};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Fails the first `failures` probes, then succeeds.
struct ScriptedProbe {
    failures: AtomicU32,
    calls: AtomicU32,
}

impl ScriptedProbe {
    fn failing(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionProbe for ScriptedProbe {
    async fn probe(
        &self,
        _config: &ConnectionConfig,
        _mode: ProbeMode,
        _timeout: Duration,
    ) -> dbhub::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DbHubError::IntegrityCheck("scripted failure".to_string()));
        }
        Ok(())
    }
}

/// Temp layout with a registry holding `local` (existing file), `missing`
/// (no file) and `off` (disabled).
fn fixture() -> (TempDir, Settings) {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = dir.path().join("data");
    std::fs::create_dir_all(data.join("market")).unwrap();
    std::fs::write(data.join("market/market.db"), b"").unwrap();
    let local = dir.path().join("local.db");
    std::fs::write(&local, b"").unwrap();

    let yaml = format!(
        r#"
maintainer: ops
databases:
  local:
    name: Local
    type: sqlite
    path: {local}
    table_type: finance
  missing:
    type: sqlite
    path: {missing}
  off:
    type: sqlite
    path: {local}
    enabled: false
"#,
        local = local.display(),
        missing = dir.path().join("nope.db").display(),
    );
    let config_dir = dir.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join(REGISTRY_FILE), yaml).unwrap();

    let settings = Settings::default()
        .with_config_dir(&config_dir)
        .with_metadata_dir(dir.path().join("metadata"))
        .with_data_dir(&data)
        .with_retry_delay(0)
        .with_health_tick(1);
    (dir, settings)
}

async fn registry_yaml(settings: &Settings) -> String {
    tokio::fs::read_to_string(settings.registry_path()).await.unwrap()
}

#[tokio::test]
async fn test_load_skips_disabled_entries() -> anyhow::Result<()> {
    let (_dir, settings) = fixture();
    let manager = ConnectionPoolManager::load(settings, Arc::new(SqlxProbe)).await?;

    let ids: Vec<String> = manager.list_connections().await.into_iter().map(|c| c.id).collect();
    assert_eq!(ids, vec!["local", "missing"]);

    let local = manager.get_connection("local").await.expect("local is registered");
    assert_eq!(local.name, "Local");
    assert_eq!(local.status, ConnectionStatus::Disconnected);
    assert!(manager.pool("local").await.is_some());
    assert!(manager.pool("missing").await.is_none());

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_connection_outcomes() -> anyhow::Result<()> {
    let (_dir, settings) = fixture();
    let manager = ConnectionPoolManager::load(settings, Arc::new(SqlxProbe)).await?;

    let ok = manager.test_connection("local").await?;
    assert_eq!(ok.status, ConnectionStatus::Connected);
    assert!(ok.latency_ms.is_some());
    assert!(ok.error.is_none());

    let failed = manager.test_connection("missing").await?;
    assert_eq!(failed.status, ConnectionStatus::Error);
    assert!(failed.latency_ms.is_none());
    assert!(failed.error.is_some());

    let info = manager.get_connection("missing").await.unwrap();
    assert_eq!(info.status, ConnectionStatus::Error);
    assert!(info.last_check.is_some());

    let unknown = manager.test_connection("ghost").await.unwrap_err();
    assert!(matches!(unknown, DbHubError::ConnectionNotFound(_)));
    assert!(unknown.is_not_found());

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_update_persists_across_reload() -> anyhow::Result<()> {
    let (_dir, settings) = fixture();
    let manager = ConnectionPoolManager::load(settings.clone(), Arc::new(SqlxProbe)).await?;

    let update = ConnectionUpdate {
        name: Some("Renamed".to_string()),
        pool_max_size: Some(4),
        ..Default::default()
    };
    let info = manager.update_connection("local", &update).await?;
    assert_eq!(info.name, "Renamed");
    manager.shutdown().await;

    let reloaded = ConnectionPoolManager::load(settings.clone(), Arc::new(SqlxProbe)).await?;
    let config = reloaded.connection_config("local").await.unwrap();
    assert_eq!(config.name, "Renamed");
    assert_eq!(config.pool.max_size, 4);

    let yaml = registry_yaml(&settings).await;
    assert!(yaml.contains("maintainer"));
    assert!(yaml.contains("off:"));

    let err = reloaded
        .update_connection("ghost", &ConnectionUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DbHubError::ConnectionNotFound(_)));

    reloaded.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_disabling_closes_the_pool() -> anyhow::Result<()> {
    let (_dir, settings) = fixture();
    let manager = ConnectionPoolManager::load(settings, Arc::new(SqlxProbe)).await?;
    assert!(manager.pool("local").await.is_some());

    let update = ConnectionUpdate {
        enabled: Some(false),
        ..Default::default()
    };
    let info = manager.update_connection("local", &update).await?;
    assert!(!info.enabled);
    assert!(manager.pool("local").await.is_none());
    assert_eq!(manager.pool_stats("local").await?.pool_size, 0);

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_register_and_remove() -> anyhow::Result<()> {
    let (dir, settings) = fixture();
    let manager = ConnectionPoolManager::load(settings.clone(), Arc::new(SqlxProbe)).await?;

    let extra = dir.path().join("extra.db");
    std::fs::write(&extra, b"").unwrap();
    manager
        .register_connection(ConnectionConfig::sqlite("extra", &extra))
        .await?;
    assert!(manager.pool("extra").await.is_some());

    let duplicate = manager
        .register_connection(ConnectionConfig::sqlite("extra", &extra))
        .await
        .unwrap_err();
    assert!(matches!(duplicate, DbHubError::ConnectionExists(_)));

    manager.remove_connection("missing").await?;
    assert!(manager.get_connection("missing").await.is_none());
    assert!(matches!(
        manager.remove_connection("missing").await,
        Err(DbHubError::ConnectionNotFound(_))
    ));

    let file = RegistryStore::new(settings.registry_path()).load().await?;
    assert!(file.databases.contains_key("extra"));
    assert!(!file.databases.contains_key("missing"));

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_remove_keeps_connection_when_persist_fails() -> anyhow::Result<()> {
    let (_dir, settings) = fixture();
    let manager = ConnectionPoolManager::load(settings.clone(), Arc::new(SqlxProbe)).await?;

    // an unparsable registry file makes the read-modify-write fail
    tokio::fs::write(settings.registry_path(), "databases: [unclosed").await?;

    assert!(manager.remove_connection("local").await.is_err());
    assert!(manager.get_connection("local").await.is_some());
    assert!(manager.pool("local").await.is_some());

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_pool_stats() -> anyhow::Result<()> {
    let (_dir, settings) = fixture();
    let manager = ConnectionPoolManager::load(settings, Arc::new(SqlxProbe)).await?;

    let stats = manager.pool_stats("missing").await?;
    assert_eq!(stats.pool_size, 0);
    assert_eq!(stats.checked_out, 0);

    let stats = manager.pool_stats("local").await?;
    assert_eq!(stats.pool_size, stats.checked_out + stats.available);

    assert!(matches!(
        manager.pool_stats("ghost").await,
        Err(DbHubError::ConnectionNotFound(_))
    ));

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_health_check_recovers_within_retries() -> anyhow::Result<()> {
    let (_dir, settings) = fixture();
    let probe = ScriptedProbe::failing(1);
    let manager = ConnectionPoolManager::load(settings, probe.clone()).await?;

    let status = manager.health_check_connection("local").await?;
    assert_eq!(status, ConnectionStatus::Connected);
    assert_eq!(probe.calls(), 2);

    let info = manager.get_connection("local").await.unwrap();
    assert_eq!(info.status, ConnectionStatus::Connected);
    assert!(info.error.is_none());
    assert!(info.last_check.is_some());

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_health_check_exhausts_retries_and_reconnects() -> anyhow::Result<()> {
    let (_dir, settings) = fixture();
    let probe = ScriptedProbe::failing(u32::MAX);
    let manager = ConnectionPoolManager::load(settings, probe.clone()).await?;

    let status = manager.health_check_connection("local").await?;
    assert_eq!(status, ConnectionStatus::Error);
    // three health attempts plus the test run by the reconnect
    assert_eq!(probe.calls(), 4);

    let info = manager.get_connection("local").await.unwrap();
    assert_eq!(info.status, ConnectionStatus::Error);
    assert!(info.error.unwrap().contains("scripted failure"));
    assert!(manager.pool("local").await.is_some());

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_due_for_check() -> anyhow::Result<()> {
    let (_dir, settings) = fixture();
    let manager = ConnectionPoolManager::load(settings, ScriptedProbe::failing(0)).await?;

    let now = Utc::now();
    assert_eq!(manager.due_for_check(now).await, vec!["local", "missing"]);

    manager.test_connection("local").await?;
    let now = Utc::now();
    assert_eq!(manager.due_for_check(now).await, vec!["missing"]);
    assert_eq!(
        manager.due_for_check(now + ChronoDuration::seconds(31)).await,
        vec!["local", "missing"]
    );

    let update = ConnectionUpdate {
        health_check_enabled: Some(false),
        ..Default::default()
    };
    manager.update_connection("missing", &update).await?;
    assert!(manager.due_for_check(now).await.is_empty());

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_health_checker_runs_and_stops() -> anyhow::Result<()> {
    let (_dir, settings) = fixture();
    let probe = ScriptedProbe::failing(0);
    let manager = ConnectionPoolManager::load(settings, probe.clone()).await?;

    let checker = HealthChecker::new(manager.clone(), Duration::from_millis(20));
    assert_eq!(checker.run_once().await, 2);
    assert_eq!(checker.run_once().await, 0);

    let handle = HealthChecker::new(manager.clone(), Duration::from_millis(20)).spawn();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(handle.is_running());

    tokio::time::timeout(Duration::from_secs(5), handle.stop())
        .await
        .expect("health checker should stop promptly");

    let status = manager.get_connection("local").await.unwrap().status;
    assert_eq!(status, ConnectionStatus::Connected);

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_adopt_discovered_databases() -> anyhow::Result<()> {
    let (_dir, settings) = fixture();
    let manager = ConnectionPoolManager::load(settings.clone(), Arc::new(SqlxProbe)).await?;

    let found = discover_databases(&settings.data_dir)?;
    assert_eq!(found.len(), 1);

    let adopted = manager.adopt_discovered(&found).await?;
    assert_eq!(adopted, vec!["db_market"]);
    let config = manager.connection_config("db_market").await.unwrap();
    assert_eq!(config.name, "market (market)");
    assert_eq!(
        Path::new(config.path.as_deref().unwrap()),
        settings.data_dir.join("market/market.db")
    );

    assert!(manager.adopt_discovered(&found).await?.is_empty());

    manager.shutdown().await;
    Ok(())
}
