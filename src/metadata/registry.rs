//! JSON-backed registry of table schemas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::Result;

pub const SCHEMA_VERSION: &str = "1.0";
pub const DEFAULT_TABLE_TYPE: &str = "custom";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub fn primary_keys(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub table_id: String,
    pub database_name: String,
    pub table_name: String,
    pub table_type: String,
    pub schema_version: String,
    pub registered_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub schema: TableSchema,
    #[serde(default)]
    pub custom_tags: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryDocument {
    version: String,
    #[serde(default)]
    tables: BTreeMap<String, TableMetadata>,
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            tables: BTreeMap::new(),
        }
    }
}

fn table_key(db_id: &str, table: &str) -> String {
    format!("{}.{}", db_id, table)
}

/// Table metadata keyed by `"<db_id>.<table>"`, persisted as pretty JSON.
pub struct MetadataRegistry {
    path: PathBuf,
    document: RwLock<RegistryDocument>,
}

impl MetadataRegistry {
    /// Open the registry at `path`. A missing, unreadable or corrupt file
    /// yields an empty registry.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let document = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(document) => document,
                Err(e) => {
                    error!("Metadata registry {} is corrupt, starting empty: {}", path.display(), e);
                    RegistryDocument::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryDocument::default(),
            Err(e) => {
                error!("Failed to read metadata registry {}: {}", path.display(), e);
                RegistryDocument::default()
            }
        };

        debug!("Metadata registry holds {} tables", document.tables.len());
        Self {
            path,
            document: RwLock::new(document),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or refresh a table entry and persist the registry.
    pub async fn register_table(
        &self,
        db_id: &str,
        table: &str,
        table_type: &str,
        schema: TableSchema,
        custom_tags: BTreeMap<String, serde_json::Value>,
    ) -> Result<TableMetadata> {
        let now = Utc::now();
        let key = table_key(db_id, table);

        let mut document = self.document.write().await;
        let (table_id, registered_at) = match document.tables.get(&key) {
            Some(existing) => (existing.table_id.clone(), existing.registered_at),
            None => (Uuid::new_v4().to_string(), now),
        };

        let metadata = TableMetadata {
            table_id,
            database_name: db_id.to_string(),
            table_name: table.to_string(),
            table_type: table_type.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            registered_at,
            last_updated: now,
            schema,
            custom_tags,
        };
        let mut staged = document.clone();
        staged.tables.insert(key, metadata.clone());
        self.save(&staged).await?;
        *document = staged;

        info!("Registered table {}.{} ({})", db_id, table, table_type);
        Ok(metadata)
    }

    pub async fn get_table(&self, db_id: &str, table: &str) -> Option<TableMetadata> {
        self.document
            .read()
            .await
            .tables
            .get(&table_key(db_id, table))
            .cloned()
    }

    pub async fn list_tables(&self, table_type: Option<&str>) -> Vec<TableMetadata> {
        self.document
            .read()
            .await
            .tables
            .values()
            .filter(|t| table_type.map_or(true, |kind| t.table_type == kind))
            .cloned()
            .collect()
    }

    pub async fn tables_for_database(&self, db_id: &str) -> Vec<TableMetadata> {
        self.document
            .read()
            .await
            .tables
            .values()
            .filter(|t| t.database_name == db_id)
            .cloned()
            .collect()
    }

    async fn save(&self, document: &RegistryDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
