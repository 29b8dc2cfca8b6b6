//! Core types shared by the connection registry, metadata and explorer modules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend of a registered database.
///
/// Unknown backend names are kept verbatim so a registry file with an entry
/// we cannot serve still loads; such connections never get a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DatabaseKind {
    #[default]
    Postgresql,
    Sqlite,
    Other(String),
}

impl DatabaseKind {
    pub fn as_str(&self) -> &str {
        match self {
            DatabaseKind::Postgresql => "postgresql",
            DatabaseKind::Sqlite => "sqlite",
            DatabaseKind::Other(name) => name,
        }
    }
}

impl From<String> for DatabaseKind {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => DatabaseKind::Postgresql,
            "sqlite" => DatabaseKind::Sqlite,
            _ => DatabaseKind::Other(value),
        }
    }
}

impl From<&str> for DatabaseKind {
    fn from(value: &str) -> Self {
        DatabaseKind::from(value.to_string())
    }
}

impl From<DatabaseKind> for String {
    fn from(kind: DatabaseKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a registered connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Last probe succeeded
    Connected,
    /// Not probed yet
    #[default]
    Disconnected,
    /// Last probe (or pool build) failed
    Error,
    /// A probe is in flight
    Checking,
    /// Pool is being torn down and rebuilt
    Reconnecting,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Checking => "checking",
            ConnectionStatus::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}
