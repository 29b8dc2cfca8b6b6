//! Table metadata: the persistent registry and live schema discovery.

pub mod introspect;
pub mod registry;

pub use introspect::{discover_tables, DiscoveredTable, DiscoveryReport};
pub use registry::{ColumnInfo, MetadataRegistry, TableMetadata, TableSchema};
