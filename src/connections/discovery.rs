//! Scan the data root for database files and PostgreSQL data directories.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::DatabaseKind;

const PG_MARKERS: [&str; 2] = ["PG_VERSION", "postgresql.conf"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDatabase {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DatabaseKind,
    pub path: PathBuf,
}

/// Look one level below `data_dir` for databases.
pub fn discover_databases(data_dir: &Path) -> Result<Vec<DiscoveredDatabase>> {
    if !data_dir.is_dir() {
        warn!("Data directory {} does not exist", data_dir.display());
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in std::fs::read_dir(data_dir)? {
        let dir = entry?.path();
        if !dir.is_dir() {
            continue;
        }
        let Some(dir_name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };

        if PG_MARKERS.iter().any(|marker| dir.join(marker).exists()) {
            found.push(DiscoveredDatabase {
                id: format!("db_{}", dir_name),
                name: format!("{} database", dir_name),
                kind: DatabaseKind::Postgresql,
                path: dir.clone(),
            });
        }

        for file in std::fs::read_dir(&dir)? {
            let file = file?.path();
            if !file.is_file() || file.extension().and_then(|e| e.to_str()) != Some("db") {
                continue;
            }
            let stem = file
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            found.push(DiscoveredDatabase {
                id: format!("db_{}", dir_name),
                name: format!("{} ({})", dir_name, stem),
                kind: DatabaseKind::Sqlite,
                path: file,
            });
        }
    }

    found.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("Discovered {} databases under {}", found.len(), data_dir.display());
    Ok(found)
}
