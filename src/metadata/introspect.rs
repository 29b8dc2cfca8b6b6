//! Read table and column definitions out of a live connection.

use serde::{Deserialize, Serialize};
use sqlx::{PgPool, SqlitePool};
use std::collections::BTreeMap;
use tracing::{info, instrument};

use crate::connections::{ConnectionPoolManager, DbPool};
use crate::error::{DbHubError, Result};
use crate::metadata::registry::{ColumnInfo, MetadataRegistry, TableSchema, DEFAULT_TABLE_TYPE};

const PG_COLUMNS: &str = r#"
SELECT c.table_name::text,
       c.column_name::text,
       c.data_type::text,
       (c.is_nullable = 'YES') AS nullable,
       EXISTS (
           SELECT 1
           FROM information_schema.table_constraints tc
           JOIN information_schema.key_column_usage kcu
             ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
            AND tc.table_name = kcu.table_name
           WHERE tc.constraint_type = 'PRIMARY KEY'
             AND tc.table_schema = c.table_schema
             AND tc.table_name = c.table_name
             AND kcu.column_name = c.column_name
       ) AS primary_key
FROM information_schema.columns c
JOIN information_schema.tables t
  ON t.table_schema = c.table_schema
 AND t.table_name = c.table_name
 AND t.table_type = 'BASE TABLE'
WHERE c.table_schema = 'public'
ORDER BY c.table_name, c.ordinal_position
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredTable {
    pub name: String,
    #[serde(rename = "type")]
    pub table_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub connection_id: String,
    pub tables_discovered: usize,
    pub tables: Vec<DiscoveredTable>,
}

/// Introspect connection `id` and register every table it holds.
#[instrument(skip(manager, registry))]
pub async fn discover_tables(
    manager: &ConnectionPoolManager,
    registry: &MetadataRegistry,
    id: &str,
) -> Result<DiscoveryReport> {
    let config = manager
        .connection_config(id)
        .await
        .ok_or_else(|| DbHubError::ConnectionNotFound(id.to_string()))?;
    let pool = manager.pool(id).await.ok_or_else(|| DbHubError::IncompleteConfig {
        id: id.to_string(),
        missing: "a usable pool",
    })?;

    let schemas = match &pool {
        DbPool::Sqlite(pool) => sqlite_schemas(pool).await?,
        DbPool::Postgres(pool) => postgres_schemas(pool).await?,
    };

    let table_type = config.table_type.as_deref().unwrap_or(DEFAULT_TABLE_TYPE);
    let mut tables = Vec::with_capacity(schemas.len());
    for (name, schema) in schemas {
        let metadata = registry
            .register_table(id, &name, table_type, schema, BTreeMap::new())
            .await?;
        tables.push(DiscoveredTable {
            name: metadata.table_name,
            table_type: metadata.table_type,
        });
    }

    info!("Discovered {} tables in {}", tables.len(), id);
    Ok(DiscoveryReport {
        connection_id: id.to_string(),
        tables_discovered: tables.len(),
        tables,
    })
}

pub async fn sqlite_schemas(pool: &SqlitePool) -> Result<BTreeMap<String, TableSchema>> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    let mut schemas = BTreeMap::new();
    for name in names {
        let columns = sqlite_columns(pool, &name).await?;
        schemas.insert(name, TableSchema { columns });
    }
    Ok(schemas)
}

/// Columns of one SQLite table in declaration order.
pub async fn sqlite_columns(pool: &SqlitePool, table: &str) -> Result<Vec<ColumnInfo>> {
    let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(
        r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?) ORDER BY cid"#,
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(name, data_type, not_null, pk)| ColumnInfo {
            name,
            data_type,
            nullable: not_null == 0,
            primary_key: pk > 0,
        })
        .collect())
}

pub async fn postgres_schemas(pool: &PgPool) -> Result<BTreeMap<String, TableSchema>> {
    let rows: Vec<(String, String, String, bool, bool)> =
        sqlx::query_as(PG_COLUMNS).fetch_all(pool).await?;

    let mut schemas: BTreeMap<String, TableSchema> = BTreeMap::new();
    for (table, column, data_type, nullable, primary_key) in rows {
        schemas.entry(table).or_default().columns.push(ColumnInfo {
            name: column,
            data_type,
            nullable,
            primary_key,
        });
    }
    Ok(schemas)
}
