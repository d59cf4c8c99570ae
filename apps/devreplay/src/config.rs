//! Configuration discovery and effective settings resolution.
//!
//! devreplay reads `devreplay.toml|yaml|yml` from the repository root (or
//! closest ancestor) and merges it with CLI flags to produce an `Effective`
//! config. Defaults:
//! - `catalog`: `.devreplay.json`
//! - `output`: `human`
//! - `severity`: no overrides
//!
//! Overrides precedence: CLI > config file > defaults.

use crate::catalog::CATALOG_FILE;
use crate::models::Rule;
use crate::severity::Directive;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
/// Severity overrides under `[severity]`.
pub struct SeverityCfg {
    /// Directive applied to every rule without its own entry.
    pub all: Option<Directive>,
    /// Per rule id: `[severity.rules] R1 = "off"`.
    #[serde(default)]
    pub rules: HashMap<String, Directive>,
}

impl SeverityCfg {
    /// Directive for `rule`: its first id with an entry, else `all`.
    pub fn directive_for(&self, rule: &Rule) -> Option<Directive> {
        rule.ids()
            .into_iter()
            .find_map(|id| self.rules.get(id).copied())
            .or(self.all)
    }
}

#[derive(Debug, Default, Deserialize, Clone)]
/// Root configuration loaded from `devreplay.toml|yaml`.
pub struct DevreplayConfig {
    /// Catalog file name looked up next to linted files.
    pub catalog: Option<String>,
    pub output: Option<String>,
    #[serde(default)]
    pub severity: SeverityCfg,
}

#[derive(Debug, Clone)]
/// Fully-resolved configuration used by commands after applying precedence.
pub struct Effective {
    pub repo_root: PathBuf,
    /// Explicit catalog path from the CLI, used for every file.
    pub catalog_path: Option<PathBuf>,
    pub catalog_name: String,
    pub output: String,
    pub severity: SeverityCfg,
}

/// Walk upward from `start` to detect the repository root.
///
/// Stops when a `devreplay.toml|yaml|yml`, a catalog, or a `.git` directory
/// is found.
pub fn detect_repo_root(start: &Path) -> PathBuf {
    let mut cur = start;
    loop {
        if cur.join("devreplay.toml").exists()
            || cur.join("devreplay.yaml").exists()
            || cur.join("devreplay.yml").exists()
            || cur.join(CATALOG_FILE).exists()
        {
            return cur.to_path_buf();
        }
        if cur.join(".git").exists() {
            return cur.to_path_buf();
        }
        match cur.parent() {
            Some(p) => cur = p,
            None => return start.to_path_buf(),
        }
    }
}

/// Load `DevreplayConfig` from `devreplay.toml` or `devreplay.yaml|yml`.
///
/// An unreadable or invalid file is reported and treated as absent.
pub fn load_config(root: &Path) -> Option<DevreplayConfig> {
    let toml_path = root.join("devreplay.toml");
    if toml_path.exists() {
        let s = fs::read_to_string(&toml_path).ok()?;
        return match toml::from_str(&s) {
            Ok(cfg) => Some(cfg),
            Err(err) => {
                tracing::warn!(path = %toml_path.display(), %err, "ignoring invalid config");
                None
            }
        };
    }
    for yml in ["devreplay.yaml", "devreplay.yml"] {
        let p = root.join(yml);
        if p.exists() {
            let s = fs::read_to_string(&p).ok()?;
            return match serde_yaml::from_str(&s) {
                Ok(cfg) => Some(cfg),
                Err(err) => {
                    tracing::warn!(path = %p.display(), %err, "ignoring invalid config");
                    None
                }
            };
        }
    }
    None
}

/// Resolve `Effective` by merging CLI flags, discovered config, and defaults.
pub fn resolve_effective(
    cli_repo_root: Option<&str>,
    cli_catalog: Option<&str>,
    cli_output: Option<&str>,
) -> Effective {
    let start = PathBuf::from(cli_repo_root.unwrap_or("."));
    let repo_root = detect_repo_root(&start);
    let cfg = load_config(&repo_root).unwrap_or_default();

    let catalog_path = cli_catalog.map(|c| {
        let p = PathBuf::from(c);
        if p.is_absolute() {
            p
        } else {
            repo_root.join(p)
        }
    });
    let catalog_name = cfg.catalog.unwrap_or_else(|| CATALOG_FILE.to_string());
    let output = cli_output
        .map(|s| s.to_string())
        .or(cfg.output)
        .unwrap_or_else(|| "human".to_string());

    Effective {
        repo_root,
        catalog_path,
        catalog_name,
        output,
        severity: cfg.severity,
    }
}
