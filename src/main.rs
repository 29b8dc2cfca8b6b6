//! dbhub command line entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dbhub::analytics::{AnalyticsSummary, IndicatorKind, IndicatorReport, DEFAULT_INDICATORS};
use dbhub::connections::{discover_databases, ConnectionPoolManager, HealthChecker};
use dbhub::explorer::{directory_tree, find_database, DatabaseBrowser, ReadOnlyQuery};
use dbhub::finance::{AssetKind, FinanceStorage, SqliteFinanceStore};
use dbhub::metadata::{discover_tables, MetadataRegistry};
use dbhub::Settings;

#[derive(Parser, Debug)]
#[command(author, version, about = "Database connection hub")]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keep pools open and run health checks until Ctrl-C
    Run,
    /// List registered connections
    List,
    /// Probe one connection
    Test { id: String },
    /// Rebuild one connection's pool
    Reconnect { id: String },
    /// Pool occupancy for one connection
    Stats { id: String },
    /// Register the tables of one connection in the metadata registry
    Discover { id: String },
    /// Look for databases under the data root
    Scan {
        /// Register discovered SQLite files
        #[arg(long)]
        adopt: bool,
    },
    /// Technical indicators for a fund or stock
    Indicators {
        code: String,
        #[arg(long)]
        stock: bool,
        #[arg(long, default_value_t = 90)]
        days: i64,
        #[arg(long = "set", default_value = DEFAULT_INDICATORS)]
        indicators: String,
    },
    /// Period summaries for a fund or stock
    Summary {
        code: String,
        #[arg(long)]
        stock: bool,
    },
    /// Directory tree of the data root
    Tree {
        #[arg(long)]
        path: Option<String>,
        #[arg(long, default_value_t = 3)]
        depth: usize,
    },
    /// Columns, sample rows and date range of a table
    Preview {
        database: String,
        table: String,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Run a read-only SELECT against a database under the data root
    Query {
        database: String,
        sql: String,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn asset_kind(stock: bool) -> AssetKind {
    if stock {
        AssetKind::Stock
    } else {
        AssetKind::Fund
    }
}

async fn load_manager(settings: &Settings) -> Result<Arc<ConnectionPoolManager>> {
    ConnectionPoolManager::load_default(settings.clone())
        .await
        .with_context(|| format!("Failed to load {}", settings.registry_path().display()))
}

async fn run(settings: Settings) -> Result<()> {
    let manager = load_manager(&settings).await?;
    let handle = HealthChecker::new(manager.clone(), settings.health_tick()).spawn();
    info!("dbhub running, press Ctrl-C to stop");

    let mut ticker = tokio::time::interval(settings.health_tick());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for conn in manager.list_connections().await {
                    info!(
                        id = %conn.id,
                        status = %conn.status,
                        pool_size = conn.pool_size,
                        checked_out = conn.checked_out,
                        "connection status"
                    );
                }
                if !handle.is_running() {
                    warn!("Health checker is no longer running");
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                info!("Shutdown requested");
                break;
            }
        }
    }

    handle.stop().await;
    manager.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    init_logging(cli.log_level.as_deref().unwrap_or(&settings.log_level))?;

    match cli.command {
        Command::Run => run(settings).await?,
        Command::List => {
            let manager = load_manager(&settings).await?;
            print_json(&manager.list_connections().await)?;
            manager.shutdown().await;
        }
        Command::Test { id } => {
            let manager = load_manager(&settings).await?;
            print_json(&manager.test_connection(&id).await?)?;
            manager.shutdown().await;
        }
        Command::Reconnect { id } => {
            let manager = load_manager(&settings).await?;
            print_json(&manager.reconnect(&id).await?)?;
            manager.shutdown().await;
        }
        Command::Stats { id } => {
            let manager = load_manager(&settings).await?;
            print_json(&manager.pool_stats(&id).await?)?;
            manager.shutdown().await;
        }
        Command::Discover { id } => {
            let manager = load_manager(&settings).await?;
            let registry = MetadataRegistry::open(settings.metadata_path()).await;
            print_json(&discover_tables(&manager, &registry, &id).await?)?;
            manager.shutdown().await;
        }
        Command::Scan { adopt } => {
            let found = discover_databases(&settings.data_dir)?;
            print_json(&found)?;
            if adopt {
                let manager = load_manager(&settings).await?;
                let adopted = manager.adopt_discovered(&found).await?;
                info!("Adopted {:?}", adopted);
                manager.shutdown().await;
            }
        }
        Command::Indicators {
            code,
            stock,
            days,
            indicators,
        } => {
            let store = SqliteFinanceStore::open(settings.finance_db_path()).await?;
            let points = store.price_series(asset_kind(stock), &code, days).await?;
            let kinds = IndicatorKind::parse_list(&indicators);
            print_json(&IndicatorReport::compute(&points, &kinds))?;
        }
        Command::Summary { code, stock } => {
            let store = SqliteFinanceStore::open(settings.finance_db_path()).await?;
            let points = store.price_series(asset_kind(stock), &code, 365).await?;
            print_json(&AnalyticsSummary::from_points(&code, &points))?;
        }
        Command::Tree { path, depth } => {
            print_json(&directory_tree(&settings.data_dir, path.as_deref(), depth)?)?;
        }
        Command::Preview {
            database,
            table,
            limit,
        } => {
            let browser = DatabaseBrowser::open(find_database(&settings.data_dir, &database)?).await?;
            print_json(&browser.preview(&table, limit).await?)?;
            browser.close().await;
        }
        Command::Query {
            database,
            sql,
            limit,
        } => {
            let query = ReadOnlyQuery::parse(&sql)?;
            let browser = DatabaseBrowser::open(find_database(&settings.data_dir, &database)?).await?;
            print_json(&browser.query(&query, limit).await?)?;
            browser.close().await;
        }
    }

    Ok(())
}
