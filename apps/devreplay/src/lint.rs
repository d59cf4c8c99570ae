//! Lint invocation.
//!
//! `LintInvoker` is the single entry point to the matcher for both the
//! language server and the CLI. It never lints the rule catalog itself or
//! version-control metadata.

use crate::catalog;
use crate::config::SeverityCfg;
use crate::error::LintError;
use crate::matcher::{format_message, LintTarget, Matcher, PatternMatcher};
use crate::models::{Finding, Issue, LintResult, Summary};
use crate::severity::{adjust, Severity};
use glob::glob;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone)]
pub struct LintInvoker {
    matcher: Arc<dyn Matcher>,
}

impl Default for LintInvoker {
    fn default() -> Self {
        LintInvoker::new(Arc::new(PatternMatcher))
    }
}

impl LintInvoker {
    pub fn new(matcher: Arc<dyn Matcher>) -> Self {
        LintInvoker { matcher }
    }

    /// Ordered findings for one target, or nothing for excluded paths.
    pub fn run(&self, target: &LintTarget<'_>, catalog: &Path) -> Result<Vec<Finding>, LintError> {
        if is_excluded(target.path, catalog) {
            tracing::debug!(path = %target.path.display(), "excluded from lint");
            return Ok(Vec::new());
        }
        self.matcher.run(target, catalog)
    }
}

/// The catalog file and `.git` paths are never linted.
pub fn is_excluded(target: &Path, catalog: &Path) -> bool {
    let target = target.to_string_lossy();
    let catalog = catalog.to_string_lossy();
    (!catalog.is_empty() && target.ends_with(catalog.as_ref())) || target.ends_with(".git")
}

/// Expand CLI path/glob arguments into files, sorted and deduplicated.
pub fn expand_targets(root: &Path, patterns: &[String]) -> (Vec<PathBuf>, Vec<String>) {
    let mut files = Vec::new();
    let mut errors = Vec::new();
    for pat in patterns {
        let full = if Path::new(pat).is_absolute() {
            PathBuf::from(pat)
        } else {
            root.join(pat)
        };
        match glob(&full.to_string_lossy()) {
            Ok(entries) => {
                for p in entries.flatten() {
                    if p.is_file() {
                        files.push(p);
                    }
                }
            }
            Err(err) => errors.push(format!("Invalid pattern '{}': {}", pat, err)),
        }
    }
    files.sort();
    files.dedup();
    (files, errors)
}

/// Lint files from disk for the CLI.
///
/// Each file uses `catalog_override` when given, otherwise the nearest
/// catalog named `catalog_name` above it (falling back to `root`). Issues
/// whose effective severity is `off` are dropped. Matcher failures are
/// returned as messages next to the result.
pub fn run_lint(
    invoker: &LintInvoker,
    root: &Path,
    files: &[PathBuf],
    catalog_override: Option<&Path>,
    catalog_name: &str,
    severity: &SeverityCfg,
) -> (LintResult, Vec<String>) {
    let per_file: Vec<Result<Vec<Issue>, String>> = files
        .par_iter()
        .map(|path| {
            let catalog = match catalog_override {
                Some(c) => c.to_path_buf(),
                None => catalog::discover(path, catalog_name, Some(root)),
            };
            let target = LintTarget { path, text: None };
            let findings = invoker.run(&target, &catalog).map_err(|e| e.to_string())?;
            let file = display_path(root, path);
            Ok(findings
                .into_iter()
                .filter_map(|f| {
                    let level = adjust(f.rule.base_severity(), severity.directive_for(&f.rule))?;
                    Some(Issue {
                        file: file.clone(),
                        rule: f.rule.ids().join(","),
                        severity: level.code().to_string(),
                        line: f.position.start.line,
                        character: f.position.start.character,
                        message: format_message(&f.rule),
                    })
                })
                .collect())
        })
        .collect();

    let mut issues = Vec::new();
    let mut errors = Vec::new();
    for r in per_file {
        match r {
            Ok(mut v) => issues.append(&mut v),
            Err(e) => errors.push(e),
        }
    }
    // Deterministic ordering of issues by file then location
    issues.sort_by(|a, b| {
        a.file
            .cmp(&b.file)
            .then(a.line.cmp(&b.line))
            .then(a.character.cmp(&b.character))
    });

    let mut summary = Summary {
        errors: 0,
        warnings: 0,
        infos: 0,
        hints: 0,
        files: files.len(),
    };
    for is in &issues {
        match Severity::from_code(&is.severity) {
            Some(Severity::Error) => summary.errors += 1,
            Some(Severity::Warn) => summary.warnings += 1,
            Some(Severity::Info) => summary.infos += 1,
            _ => summary.hints += 1,
        }
    }
    (LintResult { issues, summary }, errors)
}

/// Path relative to `root` when possible, for display.
pub fn display_path(root: &Path, path: &Path) -> String {
    pathdiff::diff_paths(path, root)
        .filter(|p| !p.starts_with(".."))
        .unwrap_or_else(|| path.to_path_buf())
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rule;
    use crate::severity::Directive;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingMatcher(AtomicUsize);

    impl Matcher for CountingMatcher {
        fn run(&self, _: &LintTarget<'_>, _: &Path) -> Result<Vec<Finding>, LintError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_catalog_and_git_paths_are_excluded() {
        let matcher = Arc::new(CountingMatcher(AtomicUsize::new(0)));
        let invoker = LintInvoker::new(matcher.clone());
        let catalog = Path::new("/ws/.devreplay.json");
        for p in ["/ws/.devreplay.json", "/ws/repo/.git"] {
            let target = LintTarget {
                path: Path::new(p),
                text: Some("foo("),
            };
            assert!(invoker.run(&target, catalog).unwrap().is_empty());
        }
        assert_eq!(matcher.0.load(Ordering::SeqCst), 0);

        let target = LintTarget {
            path: Path::new("/ws/src/main.js"),
            text: Some("foo("),
        };
        invoker.run(&target, catalog).unwrap();
        assert_eq!(matcher.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_catalog_never_lints_itself_whatever_it_contains() {
        let dir = tempdir().unwrap();
        let catalog = dir.path().join(catalog::CATALOG_FILE);
        // Rule that matches its own JSON text.
        fs::write(
            &catalog,
            r#"[{"ruleId":"self","before":"ruleId","after":"id","severity":"E"}]"#,
        )
        .unwrap();
        let target = LintTarget {
            path: &catalog,
            text: None,
        };
        assert!(LintInvoker::default().run(&target, &catalog).unwrap().is_empty());
    }

    #[test]
    fn test_run_lint_applies_overrides_and_sorts() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        crate::catalog::CatalogStore::for_root(root)
            .append(&[
                Rule::new(Some("R1"), "foo(", "bar(", "W"),
                Rule::new(Some("R2"), "var ", "let ", "E"),
            ])
            .unwrap();
        fs::write(root.join("b.js"), "var x = foo(1)").unwrap();
        fs::write(root.join("a.js"), "foo(2)").unwrap();
        let (files, errs) = expand_targets(root, &["*.js".to_string()]);
        assert!(errs.is_empty());
        assert_eq!(files.len(), 2);

        let mut severity = SeverityCfg::default();
        severity.rules.insert("R2".into(), Directive::Off);
        let (res, errors) = run_lint(
            &LintInvoker::default(),
            root,
            &files,
            None,
            catalog::CATALOG_FILE,
            &severity,
        );
        assert!(errors.is_empty());
        let got: Vec<_> = res.issues.iter().map(|i| (i.file.as_str(), i.rule.as_str())).collect();
        assert_eq!(got, vec![("a.js", "R1"), ("b.js", "R1")]);
        assert_eq!(res.summary.warnings, 2);
        assert_eq!(res.summary.errors, 0);
        assert_eq!(res.summary.files, 2);
    }
}
