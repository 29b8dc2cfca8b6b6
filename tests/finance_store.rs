//! Tests for the SQLite finance store

use dbhub::analytics::{IndicatorKind, IndicatorReport};
use dbhub::finance::{
    AssetKind, FinanceStorage, FundDetailUpdate, FundHistoryUpdate, NewFundDetail, NewFundHistory,
    NewStockHistory, SqliteFinanceStore, StockHistoryUpdate,
};

async fn open_store() -> anyhow::Result<(tempfile::TempDir, SqliteFinanceStore)> {
    let dir = tempfile::tempdir()?;
    let store = SqliteFinanceStore::open(dir.path().join("nested/finance.db")).await?;
    Ok((dir, store))
}

fn fund(code: &str, date: &str, nav: f64) -> NewFundHistory {
    NewFundHistory {
        fund_code: code.to_string(),
        record_date: date.to_string(),
        nav,
        nav_change: None,
        nav_change_percent: None,
    }
}

#[tokio::test]
async fn test_fund_history_crud() -> anyhow::Result<()> {
    let (_dir, store) = open_store().await?;
    assert!(store.health_check().await?);

    let id = store.add_fund_history(&fund("000001", "2024-01-02", 1.02)).await?;
    store.add_fund_history(&fund("000001", "2024-01-03", 1.05)).await?;
    store.add_fund_history(&fund("110022", "2024-01-03", 2.50)).await?;

    let rows = store.list_fund_history(Some("000001"), 100).await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].record_date, "2024-01-03");
    assert!(rows[0].created_at.is_some());
    assert_eq!(store.list_fund_history(None, 100).await?.len(), 3);

    let update = FundHistoryUpdate {
        nav: Some(1.03),
        nav_change_percent: Some(0.98),
        ..Default::default()
    };
    assert!(store.update_fund_history(&id, &update).await?);
    assert!(!store.update_fund_history(&id, &FundHistoryUpdate::default()).await?);
    assert!(!store.update_fund_history("no-such-id", &update).await?);

    let updated = store.list_fund_history(Some("000001"), 100).await?;
    let row = updated.iter().find(|r| r.id == id).unwrap();
    assert_eq!(row.nav, Some(1.03));
    assert_eq!(row.nav_change_percent, Some(0.98));

    assert!(store.delete_fund_history(&id).await?);
    assert!(!store.delete_fund_history(&id).await?);
    Ok(())
}

#[tokio::test]
async fn test_list_limit_is_clamped() -> anyhow::Result<()> {
    let (_dir, store) = open_store().await?;
    for day in 1..=5 {
        store
            .add_fund_history(&fund("000001", &format!("2024-02-{:02}", day), 1.0 + day as f64))
            .await?;
    }

    assert_eq!(store.list_fund_history(None, 0).await?.len(), 1);
    assert_eq!(store.list_fund_history(None, -3).await?.len(), 1);
    assert_eq!(store.list_fund_history(None, 10_000).await?.len(), 5);
    assert_eq!(store.list_stock_history(None, 0).await?.len(), 0);
    Ok(())
}

#[tokio::test]
async fn test_stock_history_and_price_series() -> anyhow::Result<()> {
    let (_dir, store) = open_store().await?;
    let mut ids = Vec::new();
    for (day, close) in [(1, 10.0), (2, 10.5), (3, 10.2)] {
        let id = store
            .add_stock_history(&NewStockHistory {
                stock_code: "600519".to_string(),
                record_date: format!("2024-03-{:02}", day),
                close_price: close,
                open_price: Some(close - 0.1),
                high_price: None,
                low_price: None,
                volume: Some(1000 * day),
                amount: None,
            })
            .await?;
        ids.push(id);
    }

    let update = StockHistoryUpdate {
        close: Some(10.8),
        volume: Some(42),
        ..Default::default()
    };
    assert!(store.update_stock_history(&ids[2], &update).await?);

    let latest = &store.list_stock_history(Some("600519"), 1).await?[0];
    assert_eq!(latest.close_price, Some(10.8));
    assert_eq!(latest.volume, Some(42));

    let series = store.price_series(AssetKind::Stock, "600519", 100).await?;
    let closes: Vec<f64> = series.iter().map(|p| p.close).collect();
    assert_eq!(closes, vec![10.0, 10.5, 10.8]);
    assert_eq!(series[0].date, "2024-03-01");

    let report = IndicatorReport::compute(&series, &[IndicatorKind::Ma5, IndicatorKind::Rsi]);
    assert_eq!(report.prices, closes);
    assert_eq!(report.indicators.len(), 2);

    assert!(store.delete_stock_history(&ids[0]).await?);
    assert!(store.price_series(AssetKind::Fund, "600519", 100).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_fund_details() -> anyhow::Result<()> {
    let (_dir, store) = open_store().await?;
    let id = store
        .add_fund_detail(&NewFundDetail {
            fund_code: "000001".to_string(),
            fund_name: Some("Growth".to_string()),
            nav: Some(1.2),
            ..Default::default()
        })
        .await?;

    let details = store.list_fund_details(Some("000001")).await?;
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].fund_name.as_deref(), Some("Growth"));
    assert!(details[0].updated_at.is_none());

    let update = FundDetailUpdate {
        name: Some("Growth Plus".to_string()),
        manager: Some("Li Wei".to_string()),
        ..Default::default()
    };
    assert!(store.update_fund_detail(&id, &update).await?);
    assert!(!store.update_fund_detail(&id, &FundDetailUpdate::default()).await?);

    let detail = &store.list_fund_details(None).await?[0];
    assert_eq!(detail.fund_name.as_deref(), Some("Growth Plus"));
    assert_eq!(detail.manager.as_deref(), Some("Li Wei"));
    assert!(detail.updated_at.is_some());

    assert!(store.delete_fund_detail(&id).await?);
    Ok(())
}

#[tokio::test]
async fn test_stats_with_missing_table() -> anyhow::Result<()> {
    let (_dir, store) = open_store().await?;
    store.add_fund_history(&fund("000001", "2024-01-02", 1.0)).await?;
    store.add_fund_history(&fund("000001", "2024-01-03", 1.1)).await?;

    sqlx::query("DROP TABLE stock_history").execute(store.pool()).await?;

    let stats = store.stats().await?;
    assert_eq!(stats.fund_history, 2);
    assert_eq!(stats.stock_history, 0);
    assert_eq!(stats.fund_details, 0);
    Ok(())
}
