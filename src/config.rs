//! Runtime settings and the on-disk database registry file.
//!
//! `Settings` decides where things live (config, metadata and data roots) and
//! how the background health loop is paced. `RegistryStore` reads and writes
//! `database_manager.yaml`, the file that lists every registered database.

use anyhow::{Context, Result as AnyResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::connections::types::{HealthCheckConfig, PoolConfig};
use crate::error::Result;

pub const REGISTRY_FILE: &str = "database_manager.yaml";
pub const METADATA_FILE: &str = "metadata_registry.json";

/// Process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding `database_manager.yaml`
    pub config_dir: PathBuf,
    /// Directory holding `metadata_registry.json`
    pub metadata_dir: PathBuf,
    /// Root under which databases are discovered and browsed
    pub data_dir: PathBuf,
    /// Explicit finance database path; defaults to `<data_dir>/finance/finance.db`
    pub finance_db: Option<PathBuf>,
    /// How often the health loop wakes up
    pub health_tick_secs: u64,
    /// Pause between failed health-check attempts
    pub retry_delay_ms: u64,
    /// Default log filter when RUST_LOG is unset
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self::for_environment(false)
    }
}

impl Settings {
    fn for_environment(in_docker: bool) -> Self {
        let (config_dir, metadata_dir, data_dir) = if in_docker {
            ("/app/config", "/app/metadata", "/app/data")
        } else {
            (
                "./data/database_manager/config",
                "./data/database_manager/metadata",
                "./data/databases",
            )
        };

        Self {
            config_dir: PathBuf::from(config_dir),
            metadata_dir: PathBuf::from(metadata_dir),
            data_dir: PathBuf::from(data_dir),
            finance_db: None,
            health_tick_secs: 5,
            retry_delay_ms: 1000,
            log_level: "info".to_string(),
        }
    }

    /// Build settings from the process environment.
    ///
    /// `IN_DOCKER=true` switches the default roots to `/app/...`; every
    /// `DBHUB_*` variable overrides the corresponding field.
    pub fn from_env() -> AnyResult<Self> {
        let in_docker = std::env::var("IN_DOCKER")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let mut settings = Self::for_environment(in_docker);

        if let Ok(dir) = std::env::var("DBHUB_CONFIG_DIR") {
            settings.config_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("DBHUB_METADATA_DIR") {
            settings.metadata_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("DBHUB_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("DBHUB_FINANCE_DB") {
            settings.finance_db = Some(PathBuf::from(path));
        }
        if let Ok(secs) = std::env::var("DBHUB_HEALTH_TICK_SECS") {
            settings.health_tick_secs = secs
                .parse()
                .with_context(|| format!("DBHUB_HEALTH_TICK_SECS is not a number: {secs}"))?;
        }
        if let Ok(level) = std::env::var("DBHUB_LOG_LEVEL") {
            settings.log_level = level;
        }

        Ok(settings)
    }

    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    pub fn with_metadata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.metadata_dir = dir.into();
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_finance_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.finance_db = Some(path.into());
        self
    }

    pub fn with_health_tick(mut self, secs: u64) -> Self {
        self.health_tick_secs = secs;
        self
    }

    pub fn with_retry_delay(mut self, millis: u64) -> Self {
        self.retry_delay_ms = millis;
        self
    }

    pub fn registry_path(&self) -> PathBuf {
        self.config_dir.join(REGISTRY_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.metadata_dir.join(METADATA_FILE)
    }

    pub fn finance_db_path(&self) -> PathBuf {
        self.finance_db
            .clone()
            .unwrap_or_else(|| self.data_dir.join("finance").join("finance.db"))
    }

    pub fn health_tick(&self) -> Duration {
        Duration::from_secs(self.health_tick_secs.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Whole contents of `database_manager.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseEntry>,
    /// Top-level keys we do not interpret
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// One database as written in the registry file. Absent keys fall back to
/// defaults when the entry is turned into a `ConnectionConfig`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_pool: Option<PoolConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckConfig>,
    /// Per-entry keys we do not interpret
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl DatabaseEntry {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// Reads and atomically rewrites the registry file.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or empty file is an empty registry.
    pub async fn load(&self) -> Result<RegistryFile> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Registry file {} not found, starting empty", self.path.display());
                return Ok(RegistryFile::default());
            }
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(RegistryFile::default());
        }

        let parsed: Option<RegistryFile> = serde_yaml::from_str(&contents)?;
        Ok(parsed.unwrap_or_default())
    }

    pub async fn save(&self, file: &RegistryFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let yaml = serde_yaml::to_string(file)?;
        let tmp = self.path.with_extension("yaml.tmp");
        tokio::fs::write(&tmp, yaml).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Registry file {} saved", self.path.display());
        Ok(())
    }
}
