//! Error type for the connection registry, metadata registry and explorer.

use std::path::PathBuf;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, DbHubError>;

#[derive(Debug, thiserror::Error)]
pub enum DbHubError {
    #[error("connection '{0}' does not exist")]
    ConnectionNotFound(String),

    #[error("connection '{0}' is already registered")]
    ConnectionExists(String),

    #[error("connection '{id}' is missing {missing}")]
    IncompleteConfig { id: String, missing: &'static str },

    #[error("unsupported database type: {0}")]
    UnsupportedKind(String),

    #[error("operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("integrity check failed: {0}")]
    IntegrityCheck(String),

    #[error("database file not found: {0}")]
    DatabaseNotFound(PathBuf),

    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    #[error("path escapes the data root: {0}")]
    PathOutsideRoot(PathBuf),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbHubError {
    /// The addressed resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DbHubError::ConnectionNotFound(_)
                | DbHubError::DatabaseNotFound(_)
                | DbHubError::TableNotFound(_)
        )
    }

    /// The caller sent something we refuse to act on.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            DbHubError::ConnectionExists(_)
                | DbHubError::InvalidQuery(_)
                | DbHubError::InvalidPagination(_)
                | DbHubError::PathOutsideRoot(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(DbHubError::ConnectionNotFound("x".into()).is_not_found());
        assert!(DbHubError::TableNotFound("t".into()).is_not_found());
        assert!(DbHubError::InvalidQuery("DROP".into()).is_invalid_input());
        assert!(!DbHubError::UnsupportedKind("mysql".into()).is_not_found());
    }

    #[test]
    fn test_messages() {
        let err = DbHubError::IncompleteConfig {
            id: "pg".into(),
            missing: "host or database",
        };
        assert_eq!(err.to_string(), "connection 'pg' is missing host or database");
    }
}
