//! Read-only browsing of a single SQLite database file.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{DbHubError, Result};
use crate::explorer::query::{Pagination, ReadOnlyQuery};
use crate::metadata::introspect::sqlite_columns;
use crate::metadata::ColumnInfo;

pub const MAX_PREVIEW_ROWS: u32 = 100;
pub const MAX_QUERY_ROWS: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub name: String,
    pub row_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePreview {
    pub table_name: String,
    pub row_count: i64,
    pub columns: Vec<ColumnInfo>,
    pub sample_data: Vec<Map<String, Value>>,
    pub date_range: Option<DateRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePage {
    pub data: Vec<Map<String, Value>>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub row_count: usize,
}

/// Read-only handle on one SQLite file.
pub struct DatabaseBrowser {
    path: PathBuf,
    pool: SqlitePool,
}

impl DatabaseBrowser {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DbHubError::DatabaseNotFound(path.to_path_buf()));
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        debug!("Opened {} for browsing", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            pool,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn tables(&self) -> Result<Vec<TableSummary>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let row_count = self.count(&name).await?;
            tables.push(TableSummary { name, row_count });
        }
        Ok(tables)
    }

    pub async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        self.ensure_table(table).await?;
        sqlite_columns(&self.pool, table).await
    }

    /// Columns, up to `limit` sample rows, the row count and, when the table
    /// has a `date` column, its range.
    pub async fn preview(&self, table: &str, limit: u32) -> Result<TablePreview> {
        if !(1..=MAX_PREVIEW_ROWS).contains(&limit) {
            return Err(DbHubError::InvalidPagination(format!(
                "preview limit must be within 1..={}, got {}",
                MAX_PREVIEW_ROWS, limit
            )));
        }
        self.ensure_table(table).await?;

        let columns = sqlite_columns(&self.pool, table).await?;
        let rows = sqlx::query(&format!("SELECT * FROM {} LIMIT ?", quote_ident(table)))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let date_range = if columns.iter().any(|c| c.name == "date") {
            self.date_range(table).await?
        } else {
            None
        };

        Ok(TablePreview {
            table_name: table.to_string(),
            row_count: self.count(table).await?,
            columns,
            sample_data: rows.iter().map(row_to_json).collect(),
            date_range,
        })
    }

    pub async fn page(&self, table: &str, pagination: Pagination) -> Result<TablePage> {
        self.ensure_table(table).await?;

        let total = self.count(table).await?;
        let rows = sqlx::query(&format!("SELECT * FROM {} LIMIT ? OFFSET ?", quote_ident(table)))
            .bind(pagination.page_size() as i64)
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(TablePage {
            data: rows.iter().map(row_to_json).collect(),
            page: pagination.page(),
            page_size: pagination.page_size(),
            total,
            total_pages: pagination.total_pages(total),
        })
    }

    /// Run a vetted SELECT, returning at most `limit` rows (capped at 1000).
    pub async fn query(&self, query: &ReadOnlyQuery, limit: u32) -> Result<QueryOutput> {
        let limit = limit.clamp(1, MAX_QUERY_ROWS);
        // own lines, so a trailing line comment cannot swallow the closing paren
        let sql = format!("SELECT * FROM (\n{}\n) LIMIT ?", query.as_str());
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows: Vec<Map<String, Value>> = rows.iter().map(row_to_json).collect();

        Ok(QueryOutput {
            columns,
            row_count: rows.len(),
            rows,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn ensure_table(&self, table: &str) -> Result<()> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;

        if exists == 0 {
            return Err(DbHubError::TableNotFound(table.to_string()));
        }
        Ok(())
    }

    async fn count(&self, table: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn date_range(&self, table: &str) -> Result<Option<DateRange>> {
        let (start, end): (Option<String>, Option<String>) = sqlx::query_as(&format!(
            "SELECT CAST(MIN(date) AS TEXT), CAST(MAX(date) AS TEXT) FROM {}",
            quote_ident(table)
        ))
        .fetch_one(&self.pool)
        .await?;

        Ok(start.zip(end).map(|(start, end)| DateRange { start, end }))
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a row as a JSON object, decoding each value by its storage class.
pub fn row_to_json(row: &SqliteRow) -> Map<String, Value> {
    let mut object = Map::new();
    for column in row.columns() {
        let index = column.ordinal();
        object.insert(column.name().to_string(), value_at(row, index));
    }
    object
}

fn value_at(row: &SqliteRow, index: usize) -> Value {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    match storage.as_str() {
        "INTEGER" | "BOOLEAN" => row
            .try_get_unchecked::<i64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "REAL" | "NUMERIC" => row
            .try_get_unchecked::<f64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(|bytes| Value::String(format!("<{} bytes>", bytes.len())))
            .unwrap_or(Value::Null),
        _ => row
            .try_get_unchecked::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("fund_history"), "\"fund_history\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
