//! Storage contract for finance data and its SQLite implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::analytics::PricePoint;
use crate::finance::types::{
    AssetKind, ColumnUpdate, FieldValue, FinanceStats, FundDetail, FundDetailUpdate, FundHistory,
    FundHistoryUpdate, NewFundDetail, NewFundHistory, NewStockHistory, StockHistory,
    StockHistoryUpdate,
};

pub const MAX_LIST_LIMIT: i64 = 1000;

const FUND_HISTORY: &str = "fund_history";
const STOCK_HISTORY: &str = "stock_history";
const FUND_DETAILS: &str = "fund_details";

/// Persistence contract for fund and stock data.
#[async_trait]
pub trait FinanceStorage: Send + Sync {
    /// Newest first, optionally for one fund. `limit` is clamped to 1..=1000.
    async fn list_fund_history(&self, code: Option<&str>, limit: i64) -> Result<Vec<FundHistory>>;

    /// Returns the new record id.
    async fn add_fund_history(&self, record: &NewFundHistory) -> Result<String>;

    async fn update_fund_history(&self, id: &str, update: &FundHistoryUpdate) -> Result<bool>;

    async fn delete_fund_history(&self, id: &str) -> Result<bool>;

    /// Newest first, optionally for one stock. `limit` is clamped to 1..=1000.
    async fn list_stock_history(&self, code: Option<&str>, limit: i64) -> Result<Vec<StockHistory>>;

    async fn add_stock_history(&self, record: &NewStockHistory) -> Result<String>;

    async fn update_stock_history(&self, id: &str, update: &StockHistoryUpdate) -> Result<bool>;

    async fn delete_stock_history(&self, id: &str) -> Result<bool>;

    async fn list_fund_details(&self, code: Option<&str>) -> Result<Vec<FundDetail>>;

    async fn add_fund_detail(&self, record: &NewFundDetail) -> Result<String>;

    /// Also stamps `updated_at`.
    async fn update_fund_detail(&self, id: &str, update: &FundDetailUpdate) -> Result<bool>;

    async fn delete_fund_detail(&self, id: &str) -> Result<bool>;

    /// Row count per table; a missing table counts as 0.
    async fn stats(&self) -> Result<FinanceStats>;

    async fn health_check(&self) -> Result<bool>;

    /// Closing prices (NAV for funds) oldest first, ready for indicators.
    async fn price_series(&self, kind: AssetKind, code: &str, limit: i64) -> Result<Vec<PricePoint>> {
        let mut points: Vec<PricePoint> = match kind {
            AssetKind::Fund => self
                .list_fund_history(Some(code), limit)
                .await?
                .into_iter()
                .filter_map(|r| r.nav.map(|nav| PricePoint::new(r.record_date, nav)))
                .collect(),
            AssetKind::Stock => self
                .list_stock_history(Some(code), limit)
                .await?
                .into_iter()
                .filter_map(|r| r.close_price.map(|close| PricePoint::new(r.record_date, close)))
                .collect(),
        };
        points.reverse();
        Ok(points)
    }
}

/// SQLite-backed finance store.
pub struct SqliteFinanceStore {
    pool: SqlitePool,
}

impl SqliteFinanceStore {
    /// Open (creating if needed) the finance database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open finance database {}", path.display()))?;

        Self::create_schema(&pool).await?;
        info!("Finance store ready at {}", path.display());

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fund_history (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL,
                date TEXT NOT NULL,
                nav REAL,
                nav_change REAL,
                nav_change_percent REAL,
                created_at TEXT
            );
            "#,
        )
        .execute(pool)
        .await
        .context("Failed to create fund_history table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stock_history (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL,
                date TEXT NOT NULL,
                open REAL,
                high REAL,
                low REAL,
                close REAL,
                volume INTEGER,
                amount REAL,
                created_at TEXT
            );
            "#,
        )
        .execute(pool)
        .await
        .context("Failed to create stock_history table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fund_details (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL,
                name TEXT,
                full_name TEXT,
                fund_type TEXT,
                establishment_date TEXT,
                asset_scale TEXT,
                tracking_target TEXT,
                nav REAL,
                nav_date TEXT,
                acc_nav REAL,
                acc_nav_date TEXT,
                estimated_nav REAL,
                estimated_nav_change_percent REAL,
                subscription_fee REAL,
                redemption_fee REAL,
                management_fee REAL,
                custodian_fee REAL,
                service_fee REAL,
                company TEXT,
                manager TEXT,
                custodian TEXT,
                purchase_status TEXT,
                redemption_status TEXT,
                risk_level TEXT,
                created_at TEXT,
                updated_at TEXT
            );
            "#,
        )
        .execute(pool)
        .await
        .context("Failed to create fund_details table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_fund_history_code_date ON fund_history(code, date)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_stock_history_code_date ON stock_history(code, date)")
            .execute(pool)
            .await?;

        Ok(())
    }

    async fn update_row(
        &self,
        table: &'static str,
        id: &str,
        fields: Vec<(&'static str, FieldValue)>,
        touch_updated_at: bool,
    ) -> Result<bool> {
        if fields.is_empty() {
            return Ok(false);
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!("UPDATE {} SET ", table));
        let mut assignments = builder.separated(", ");
        for (column, value) in fields {
            assignments.push(format!("{} = ", column));
            match value {
                FieldValue::Real(v) => assignments.push_bind_unseparated(v),
                FieldValue::Integer(v) => assignments.push_bind_unseparated(v),
                FieldValue::Text(v) => assignments.push_bind_unseparated(v),
            };
        }
        if touch_updated_at {
            assignments.push("updated_at = ");
            assignments.push_bind_unseparated(Utc::now().to_rfc3339());
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id.to_string());

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to update {} row {}", table, id))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_row(&self, table: &'static str, id: &str) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", table))
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete {} row {}", table, id))?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_rows(&self, table: &'static str) -> i64 {
        match sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                debug!("Counting {} failed, reporting 0: {}", table, e);
                0
            }
        }
    }
}

fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_LIST_LIMIT)
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339()
}

#[async_trait]
impl FinanceStorage for SqliteFinanceStore {
    async fn list_fund_history(&self, code: Option<&str>, limit: i64) -> Result<Vec<FundHistory>> {
        let rows = match code {
            Some(code) => {
                sqlx::query_as::<_, FundHistory>(
                    "SELECT * FROM fund_history WHERE code = ? ORDER BY date DESC LIMIT ?",
                )
                .bind(code)
                .bind(clamp_limit(limit))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, FundHistory>("SELECT * FROM fund_history ORDER BY date DESC LIMIT ?")
                    .bind(clamp_limit(limit))
                    .fetch_all(&self.pool)
                    .await
            }
        };
        rows.context("Failed to list fund history")
    }

    async fn add_fund_history(&self, record: &NewFundHistory) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO fund_history (id, code, date, nav, nav_change, nav_change_percent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&record.fund_code)
        .bind(&record.record_date)
        .bind(record.nav)
        .bind(record.nav_change)
        .bind(record.nav_change_percent)
        .bind(now_stamp())
        .execute(&self.pool)
        .await
        .context("Failed to insert fund history")?;

        debug!("Added fund history {} for {}", id, record.fund_code);
        Ok(id)
    }

    async fn update_fund_history(&self, id: &str, update: &FundHistoryUpdate) -> Result<bool> {
        self.update_row(FUND_HISTORY, id, update.assignments(), false).await
    }

    async fn delete_fund_history(&self, id: &str) -> Result<bool> {
        self.delete_row(FUND_HISTORY, id).await
    }

    async fn list_stock_history(&self, code: Option<&str>, limit: i64) -> Result<Vec<StockHistory>> {
        let rows = match code {
            Some(code) => {
                sqlx::query_as::<_, StockHistory>(
                    "SELECT * FROM stock_history WHERE code = ? ORDER BY date DESC LIMIT ?",
                )
                .bind(code)
                .bind(clamp_limit(limit))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, StockHistory>("SELECT * FROM stock_history ORDER BY date DESC LIMIT ?")
                    .bind(clamp_limit(limit))
                    .fetch_all(&self.pool)
                    .await
            }
        };
        rows.context("Failed to list stock history")
    }

    async fn add_stock_history(&self, record: &NewStockHistory) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO stock_history (id, code, date, open, high, low, close, volume, amount, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&record.stock_code)
        .bind(&record.record_date)
        .bind(record.open_price)
        .bind(record.high_price)
        .bind(record.low_price)
        .bind(record.close_price)
        .bind(record.volume)
        .bind(record.amount)
        .bind(now_stamp())
        .execute(&self.pool)
        .await
        .context("Failed to insert stock history")?;

        debug!("Added stock history {} for {}", id, record.stock_code);
        Ok(id)
    }

    async fn update_stock_history(&self, id: &str, update: &StockHistoryUpdate) -> Result<bool> {
        self.update_row(STOCK_HISTORY, id, update.assignments(), false).await
    }

    async fn delete_stock_history(&self, id: &str) -> Result<bool> {
        self.delete_row(STOCK_HISTORY, id).await
    }

    async fn list_fund_details(&self, code: Option<&str>) -> Result<Vec<FundDetail>> {
        let rows = match code {
            Some(code) => {
                sqlx::query_as::<_, FundDetail>("SELECT * FROM fund_details WHERE code = ? ORDER BY code")
                    .bind(code)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query_as::<_, FundDetail>("SELECT * FROM fund_details ORDER BY code")
                    .fetch_all(&self.pool)
                    .await
            }
        };
        rows.context("Failed to list fund details")
    }

    async fn add_fund_detail(&self, record: &NewFundDetail) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO fund_details (id, code, name, fund_type, manager, establishment_date, nav, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&record.fund_code)
        .bind(&record.fund_name)
        .bind(&record.fund_type)
        .bind(&record.manager)
        .bind(&record.establish_date)
        .bind(record.nav)
        .bind(now_stamp())
        .execute(&self.pool)
        .await
        .context("Failed to insert fund detail")?;

        debug!("Added fund detail {} for {}", id, record.fund_code);
        Ok(id)
    }

    async fn update_fund_detail(&self, id: &str, update: &FundDetailUpdate) -> Result<bool> {
        self.update_row(FUND_DETAILS, id, update.assignments(), true).await
    }

    async fn delete_fund_detail(&self, id: &str) -> Result<bool> {
        self.delete_row(FUND_DETAILS, id).await
    }

    async fn stats(&self) -> Result<FinanceStats> {
        Ok(FinanceStats {
            fund_history: self.count_rows(FUND_HISTORY).await,
            stock_history: self.count_rows(STOCK_HISTORY).await,
            fund_details: self.count_rows(FUND_DETAILS).await,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        let one: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Finance store health check failed")?;
        Ok(one == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(-5), 1);
        assert_eq!(clamp_limit(50), 50);
        assert_eq!(clamp_limit(5000), MAX_LIST_LIMIT);
    }
}
