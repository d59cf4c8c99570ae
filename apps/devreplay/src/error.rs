//! Error types shared across the library.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to write rule catalog {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read rule catalog {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("rule catalog {} is not a JSON array ({reason}); leaving it untouched", path.display())]
    Unreadable { path: PathBuf, reason: String },
    #[error("failed to serialize rule catalog: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum LintError {
    #[error("failed to read lint target {}: {source}", path.display())]
    ReadTarget {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("lint task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown severity directive '{0}' (expected off|default|upgrade|downgrade|error|warn|info|hint)")]
pub struct DirectiveError(pub String);
