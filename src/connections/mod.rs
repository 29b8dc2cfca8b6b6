//! Connection registry, pools and health monitoring.

pub mod discovery;
pub mod health;
pub mod manager;
pub mod pool;
pub mod probe;
pub mod types;

pub use discovery::{discover_databases, DiscoveredDatabase};
pub use health::{HealthCheckHandle, HealthChecker};
pub use manager::ConnectionPoolManager;
pub use pool::DbPool;
pub use probe::{ConnectionProbe, ProbeMode, SqlxProbe};
pub use types::{
    ConnectionConfig, ConnectionInfo, ConnectionState, ConnectionUpdate, HealthCheckConfig,
    PoolConfig, PoolCounts, PoolStats, TestConnectionResponse,
};
