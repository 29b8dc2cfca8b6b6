//! Browsing SQLite files under a data root

use dbhub::explorer::{find_database, DatabaseBrowser, Pagination, ReadOnlyQuery};
use dbhub::DbHubError;
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

async fn seed(root: &std::path::Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(root.join("market"))?;
    let options = SqliteConnectOptions::new()
        .filename(root.join("market/market.db"))
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;

    sqlx::query("CREATE TABLE quotes (code TEXT NOT NULL, date TEXT NOT NULL, close REAL, volume INTEGER, raw BLOB)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE TABLE notes (body TEXT)").execute(&pool).await?;
    for day in 1..=12 {
        sqlx::query("INSERT INTO quotes (code, date, close, volume, raw) VALUES (?, ?, ?, ?, ?)")
            .bind("600519")
            .bind(format!("2024-05-{:02}", day))
            .bind(100.0 + day as f64)
            .bind(day as i64 * 10)
            .bind(if day == 1 { Some(vec![1u8, 2, 3]) } else { None })
            .execute(&pool)
            .await?;
    }
    pool.close().await;
    Ok(())
}

#[tokio::test]
async fn test_tables_and_preview() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    seed(root.path()).await?;

    let browser = DatabaseBrowser::open(find_database(root.path(), "market")?).await?;

    let tables = browser.tables().await?;
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0].name, "notes");
    assert_eq!(tables[1].row_count, 12);

    let columns = browser.columns("quotes").await?;
    assert_eq!(columns.len(), 5);

    let preview = browser.preview("quotes", 3).await?;
    assert_eq!(preview.row_count, 12);
    assert_eq!(preview.sample_data.len(), 3);
    assert_eq!(preview.sample_data[0]["close"], json!(101.0));
    assert_eq!(preview.sample_data[0]["volume"], json!(10));
    assert_eq!(preview.sample_data[0]["raw"], json!("<3 bytes>"));
    assert_eq!(preview.sample_data[1]["raw"], json!(null));
    let range = preview.date_range.unwrap();
    assert_eq!(range.start, "2024-05-01");
    assert_eq!(range.end, "2024-05-12");

    assert!(browser.preview("notes", 5).await?.date_range.is_none());
    assert!(matches!(
        browser.preview("quotes", 0).await,
        Err(DbHubError::InvalidPagination(_))
    ));
    assert!(matches!(
        browser.preview("quotes", 101).await,
        Err(DbHubError::InvalidPagination(_))
    ));
    assert!(matches!(
        browser.preview("nope", 5).await,
        Err(DbHubError::TableNotFound(_))
    ));

    browser.close().await;
    Ok(())
}

#[tokio::test]
async fn test_paging() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    seed(root.path()).await?;
    let browser = DatabaseBrowser::open(find_database(root.path(), "market")?).await?;

    let page = browser.page("quotes", Pagination::new(3, 5)?).await?;
    assert_eq!(page.total, 12);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.data[0]["date"], json!("2024-05-11"));

    let beyond = browser.page("quotes", Pagination::new(9, 5)?).await?;
    assert!(beyond.data.is_empty());

    browser.close().await;
    Ok(())
}

#[tokio::test]
async fn test_read_only_queries() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    seed(root.path()).await?;
    let browser = DatabaseBrowser::open(find_database(root.path(), "market")?).await?;

    let query = ReadOnlyQuery::parse("SELECT code, COUNT(*) AS n FROM quotes GROUP BY code")?;
    let output = browser.query(&query, 10).await?;
    assert_eq!(output.columns, vec!["code", "n"]);
    assert_eq!(output.row_count, 1);
    assert_eq!(output.rows[0]["n"], json!(12));

    let query = ReadOnlyQuery::parse(
        "WITH recent AS (SELECT * FROM quotes WHERE date > '2024-05-05') SELECT date FROM recent",
    )?;
    assert_eq!(browser.query(&query, 3).await?.row_count, 3);

    let query = ReadOnlyQuery::parse("SELECT date FROM quotes ORDER BY date DESC -- latest only")?;
    let output = browser.query(&query, 2).await?;
    assert_eq!(output.row_count, 2);
    assert_eq!(output.rows[0]["date"], json!("2024-05-12"));

    let query = ReadOnlyQuery::parse("SELECT date FROM quotes /* all */")?;
    assert_eq!(browser.query(&query, 0).await?.row_count, 1);
    assert_eq!(browser.query(&query, 5_000).await?.row_count, 12);

    let query = ReadOnlyQuery::parse(
        "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 1500) SELECT x FROM n",
    )?;
    assert_eq!(browser.query(&query, 5_000).await?.row_count, 1000);

    assert!(ReadOnlyQuery::parse("DELETE FROM quotes").is_err());
    assert!(ReadOnlyQuery::parse("SELECT 1; DROP TABLE quotes").is_err());

    browser.close().await;
    Ok(())
}

#[tokio::test]
async fn test_open_missing_database() {
    let root = tempfile::tempdir().unwrap();
    let err = DatabaseBrowser::open(root.path().join("absent.db"))
        .await
        .err()
        .expect("opening a missing file must fail");
    assert!(matches!(err, DbHubError::DatabaseNotFound(_)));
}
