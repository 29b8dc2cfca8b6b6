//! Directory listing and database lookup confined to the data root.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::warn;

use crate::error::{DbHubError, Result};

pub const MAX_TREE_DEPTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Directory,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
    pub has_database: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<TreeNode>,
}

/// Tree of directories and `.db` files below `root/sub_path`.
pub fn directory_tree(root: &Path, sub_path: Option<&str>, depth: usize) -> Result<Vec<TreeNode>> {
    if !(1..=MAX_TREE_DEPTH).contains(&depth) {
        return Err(DbHubError::InvalidPagination(format!(
            "depth must be within 1..={}, got {}",
            MAX_TREE_DEPTH, depth
        )));
    }
    let start = match sub_path {
        Some(sub) if !sub.trim().is_empty() => resolve_within(root, sub)?,
        _ => root.to_path_buf(),
    };
    Ok(walk(&start, depth))
}

/// First existing candidate among `<root>/<name>.db`, `<root>/<name>/<name>.db`
/// and `<root>/<name>`.
pub fn find_database(root: &Path, name: &str) -> Result<PathBuf> {
    let relative = confined_relative(name)?;
    let candidates = [
        root.join(format!("{}.db", name)),
        root.join(&relative).join(format!("{}.db", last_segment(&relative))),
        root.join(&relative),
    ];

    for candidate in candidates {
        if candidate.exists() {
            ensure_inside(root, &candidate)?;
            return Ok(candidate);
        }
    }
    Err(DbHubError::DatabaseNotFound(root.join(name)))
}

/// Join `sub` onto `root`, refusing anything that ends up outside it.
pub fn resolve_within(root: &Path, sub: &str) -> Result<PathBuf> {
    let relative = confined_relative(sub)?;
    let target = root.join(relative);
    if target.exists() {
        ensure_inside(root, &target)?;
    }
    Ok(target)
}

fn confined_relative(sub: &str) -> Result<PathBuf> {
    let path = Path::new(sub.trim_start_matches(['/', '\\']));
    let escapes = path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes || sub.is_empty() {
        return Err(DbHubError::PathOutsideRoot(PathBuf::from(sub)));
    }
    Ok(path.to_path_buf())
}

fn ensure_inside(root: &Path, target: &Path) -> Result<()> {
    let root = root.canonicalize()?;
    let target = target.canonicalize()?;
    if target.starts_with(&root) {
        Ok(())
    } else {
        Err(DbHubError::PathOutsideRoot(target))
    }
}

fn last_segment(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn walk(dir: &Path, depth: usize) -> Vec<TreeNode> {
    if depth == 0 {
        return Vec::new();
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot list {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    paths.sort_by_key(|p| last_segment(p).to_lowercase());

    let mut nodes = Vec::new();
    for path in paths {
        let name = last_segment(&path);
        if path.is_dir() {
            nodes.push(TreeNode {
                has_database: holds_database(&path),
                children: walk(&path, depth - 1),
                modified: modified(&path),
                name,
                path,
                kind: NodeKind::Directory,
                size: None,
            });
        } else if is_db_file(&path) {
            nodes.push(TreeNode {
                size: std::fs::metadata(&path).ok().map(|m| m.len()),
                modified: modified(&path),
                name,
                path,
                kind: NodeKind::File,
                has_database: true,
                children: Vec::new(),
            });
        }
    }
    nodes
}

fn is_db_file(path: &Path) -> bool {
    path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("db")
}

fn holds_database(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.filter_map(|e| e.ok().map(|e| e.path())).any(|p| {
        is_db_file(&p)
            || (p.is_dir() && (last_segment(&p) == "postgresql" || p.join("PG_VERSION").exists()))
    })
}

fn modified(path: &Path) -> Option<DateTime<Utc>> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}
