//! Browsing SQLite databases below the data root.

pub mod browser;
pub mod query;
pub mod tree;

pub use browser::{DatabaseBrowser, DateRange, QueryOutput, TablePage, TablePreview, TableSummary};
pub use query::{Pagination, ReadOnlyQuery};
pub use tree::{directory_tree, find_database, NodeKind, TreeNode};
