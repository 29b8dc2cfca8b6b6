//! Fund and stock history storage.

pub mod storage;
pub mod types;

pub use storage::{FinanceStorage, SqliteFinanceStore, MAX_LIST_LIMIT};
pub use types::{
    AssetKind, FinanceStats, FundDetail, FundDetailUpdate, FundHistory, FundHistoryUpdate,
    NewFundDetail, NewFundHistory, NewStockHistory, StockHistory, StockHistoryUpdate,
};
