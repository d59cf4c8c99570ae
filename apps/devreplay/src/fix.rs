//! Quick fixes for published diagnostics.
//!
//! Every function here takes the findings of a fresh lint pass over the
//! document's current text. A diagnostic's `code` indexes into those
//! findings; its correlation token decides whether the indexed finding is
//! still the one the diagnostic was published for.

use crate::catalog::{self, CatalogStore};
use crate::config::SeverityCfg;
use crate::diagnostics::{is_current, is_ours, ordinal};
use crate::documents::{full_range, slice, Document};
use crate::lint::{display_path, is_excluded};
use crate::matcher::apply_fix;
use crate::models::{Finding, Rule};
use crate::severity::adjust;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tower_lsp::lsp_types::{
    CodeAction, CodeActionDisabled, CodeActionKind, Diagnostic, DocumentChanges, OneOf,
    OptionalVersionedTextDocumentIdentifier, TextDocumentEdit, TextEdit, Url, WorkspaceEdit,
};

/// Command applying every available fix to one document.
pub const FIX_COMMAND: &str = "devreplay.fix";
/// Command adjusting a rule's severity: `[ruleId, directive]`.
pub const ADJUST_SEVERITY_COMMAND: &str = "devreplay.adjustSeverity";

pub const STALE_REASON: &str = "diagnostic is out of date";

const DEFAULT_TITLE: &str = "Fix by DevReplay";

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Payload carried by an unresolved code action.
pub struct ActionData {
    pub uri: Url,
    pub diagnostic: Diagnostic,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Edit(TextEdit),
    NoFix,
    Stale,
}

pub fn title(rule: &Rule) -> String {
    let ids = rule.ids();
    if ids.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        format!("Fix to {}", ids.join(", "))
    }
}

/// Fix for one diagnostic against the current document text.
pub fn resolve(diag: &Diagnostic, findings: &[Finding], doc: &Document) -> Resolution {
    let Some(finding) = ordinal(diag).and_then(|i| findings.get(i)) else {
        return Resolution::Stale;
    };
    if !is_current(diag, finding, doc) {
        tracing::debug!(code = ?diag.code, "stale diagnostic in fix request");
        return Resolution::Stale;
    }
    let current = slice(&doc.text, diag.range);
    match apply_fix(current, std::slice::from_ref(&finding.rule)) {
        Some(new_text) => Resolution::Edit(TextEdit {
            range: diag.range,
            new_text,
        }),
        None => Resolution::NoFix,
    }
}

/// Workspace edit pinned to the document version it was computed for.
pub fn versioned_edit(uri: &Url, version: i32, edits: Vec<TextEdit>) -> WorkspaceEdit {
    WorkspaceEdit {
        document_changes: Some(DocumentChanges::Edits(vec![TextDocumentEdit {
            text_document: OptionalVersionedTextDocumentIdentifier {
                uri: uri.clone(),
                version: Some(version),
            },
            edits: edits.into_iter().map(OneOf::Left).collect(),
        }])),
        ..Default::default()
    }
}

/// One quick-fix action per devreplay diagnostic.
///
/// With `lazy`, edits are left for `resolve_action`. Diagnostics whose
/// ordinal no longer maps to a finding get a disabled action.
pub fn code_actions(
    uri: &Url,
    doc: &Document,
    findings: &[Finding],
    diagnostics: &[Diagnostic],
    lazy: bool,
) -> Vec<CodeAction> {
    diagnostics
        .iter()
        .filter(|d| is_ours(d))
        .map(|diag| {
            let finding = ordinal(diag).and_then(|i| findings.get(i));
            let data = ActionData {
                uri: uri.clone(),
                diagnostic: diag.clone(),
            };
            let action = CodeAction {
                title: finding
                    .map(|f| title(&f.rule))
                    .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
                kind: Some(CodeActionKind::QUICKFIX),
                diagnostics: Some(vec![diag.clone()]),
                data: serde_json::to_value(data).ok(),
                ..Default::default()
            };
            // A diagnostic with no finding behind it is disabled right away.
            if lazy && finding.is_some() {
                action
            } else {
                resolve_action(action, doc, findings)
            }
        })
        .collect()
}

/// Fill in the edit of an action built by `code_actions`.
///
/// A diagnostic without a fix gets an edit with no changes; a stale one is
/// also disabled with `STALE_REASON`.
pub fn resolve_action(mut action: CodeAction, doc: &Document, findings: &[Finding]) -> CodeAction {
    let Some(data) = action
        .data
        .clone()
        .and_then(|v| serde_json::from_value::<ActionData>(v).ok())
    else {
        return action;
    };
    let edits = match resolve(&data.diagnostic, findings, doc) {
        Resolution::Edit(edit) => vec![edit],
        Resolution::NoFix => Vec::new(),
        Resolution::Stale => {
            action.disabled = Some(CodeActionDisabled {
                reason: STALE_REASON.to_string(),
            });
            Vec::new()
        }
    };
    action.edit = Some(versioned_edit(&data.uri, doc.version, edits));
    action
}

/// Whole-document edit applying every rule that produced a finding.
pub fn fix_all(uri: &Url, doc: &Document, findings: &[Finding]) -> Option<WorkspaceEdit> {
    let mut rules: Vec<Rule> = Vec::new();
    for f in findings {
        if !rules.contains(&f.rule) {
            rules.push(f.rule.clone());
        }
    }
    let new_text = apply_fix(&doc.text, &rules)?;
    let edit = TextEdit {
        range: full_range(&doc.text),
        new_text,
    };
    Some(versioned_edit(uri, doc.version, vec![edit]))
}

/// Text edits of a versioned workspace edit, keyed by document.
pub fn edits_by_uri(edit: &WorkspaceEdit) -> HashMap<Url, Vec<TextEdit>> {
    let mut out: HashMap<Url, Vec<TextEdit>> = HashMap::new();
    if let Some(DocumentChanges::Edits(docs)) = &edit.document_changes {
        for d in docs {
            let entry = out.entry(d.text_document.uri.clone()).or_default();
            for e in &d.edits {
                if let OneOf::Left(te) = e {
                    entry.push(te.clone());
                }
            }
        }
    }
    out
}

/// Outcome of fixing one file from the CLI.
pub struct FixResult {
    pub file: String,
    pub changed: bool,
    pub preview: Option<String>,
    pub original: Option<String>,
}

/// Apply every enabled catalog rule to files on disk.
///
/// Rules switched `off` by `severity` are skipped. When `write` is false and
/// `capture_old` is true, changed results carry the fixed text as a preview
/// and the original text.
pub fn run_fix(
    root: &Path,
    files: &[PathBuf],
    catalog_override: Option<&Path>,
    catalog_name: &str,
    severity: &SeverityCfg,
    write: bool,
    capture_old: bool,
) -> (Vec<FixResult>, Vec<String>) {
    let per_file: Vec<Result<FixResult, String>> = files
        .par_iter()
        .map(|path| {
            let file = display_path(root, path);
            let unchanged = |original: Option<String>| FixResult {
                file: file.clone(),
                changed: false,
                preview: None,
                original,
            };
            let catalog = match catalog_override {
                Some(c) => c.to_path_buf(),
                None => catalog::discover(path, catalog_name, Some(root)),
            };
            if is_excluded(path, &catalog) {
                return Ok(unchanged(None));
            }
            let rules: Vec<Rule> = CatalogStore::new(&catalog)
                .load()
                .into_iter()
                .filter(|r| adjust(r.base_severity(), severity.directive_for(r)).is_some())
                .collect();
            let data = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
            let Some(fixed) = apply_fix(&data, &rules) else {
                return Ok(unchanged(capture_old.then_some(data)));
            };
            if write {
                fs::write(path, &fixed)
                    .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
                tracing::info!(file = %file, "fixed");
                return Ok(FixResult {
                    file,
                    changed: true,
                    preview: None,
                    original: capture_old.then_some(data),
                });
            }
            Ok(FixResult {
                file,
                changed: true,
                preview: Some(fixed),
                original: capture_old.then_some(data),
            })
        })
        .collect();

    let mut results = Vec::new();
    let mut errors = Vec::new();
    for r in per_file {
        match r {
            Ok(v) => results.push(v),
            Err(e) => errors.push(e),
        }
    }
    results.sort_by(|a, b| a.file.cmp(&b.file));
    (results, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::map_with;
    use crate::matcher::find_all;
    use tower_lsp::lsp_types::{Position, Range};

    fn uri() -> Url {
        Url::parse("file:///ws/main.js").unwrap()
    }

    fn setup(text: &str, rules: &[Rule], pass: u64) -> (Document, Vec<Finding>, Vec<Diagnostic>) {
        let doc = Document {
            text: text.to_string(),
            version: 7,
            pass,
        };
        let findings = find_all(text, rules);
        let diags = map_with(&findings, Some(pass), |_| None);
        (doc, findings, diags)
    }

    #[test]
    fn test_titles() {
        let mut rule = Rule::new(Some("R1"), "a", "b", "W");
        assert_eq!(title(&rule), "Fix to R1");
        rule.rule_id = Some(crate::models::RuleId::Many(vec!["R1".into(), "R2".into()]));
        assert_eq!(title(&rule), "Fix to R1, R2");
        rule.rule_id = None;
        assert_eq!(title(&rule), "Fix by DevReplay");
    }

    #[test]
    fn test_eager_action_replaces_range() {
        let rules = vec![Rule::new(Some("R1"), "foo(", "bar(", "W")];
        let (doc, findings, diags) = setup("foo(1)", &rules, 1);
        let actions = code_actions(&uri(), &doc, &findings, &diags, false);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].title, "Fix to R1");
        assert!(actions[0].disabled.is_none());
        let edits = edits_by_uri(actions[0].edit.as_ref().unwrap());
        let e = &edits[&uri()][0];
        assert_eq!(e.new_text, "bar(");
        assert_eq!(e.range, Range::new(Position::new(0, 0), Position::new(0, 4)));
        match &actions[0].edit.as_ref().unwrap().document_changes {
            Some(DocumentChanges::Edits(d)) => assert_eq!(d[0].text_document.version, Some(7)),
            other => panic!("unexpected changes: {:?}", other),
        }
    }

    #[test]
    fn test_lazy_action_has_no_edit_until_resolved() {
        let rules = vec![Rule::new(Some("R1"), "foo(", "bar(", "W")];
        let (doc, findings, diags) = setup("foo(1)", &rules, 1);
        let action = code_actions(&uri(), &doc, &findings, &diags, true).remove(0);
        assert!(action.edit.is_none());
        let resolved = resolve_action(action, &doc, &findings);
        assert_eq!(edits_by_uri(resolved.edit.as_ref().unwrap())[&uri()].len(), 1);
    }

    #[test]
    fn test_foreign_diagnostics_are_ignored() {
        let rules = vec![Rule::new(Some("R1"), "foo(", "bar(", "W")];
        let (doc, findings, mut diags) = setup("foo(1)", &rules, 1);
        diags[0].source = Some("eslint".into());
        assert!(code_actions(&uri(), &doc, &findings, &diags, false).is_empty());
    }

    #[test]
    fn test_stale_pass_is_rejected_explicitly() {
        let rules = vec![Rule::new(Some("R1"), "foo(", "bar(", "W")];
        let (mut doc, findings, diags) = setup("foo(1)", &rules, 1);
        doc.pass = 2;
        let action = code_actions(&uri(), &doc, &findings, &diags, false).remove(0);
        assert_eq!(action.disabled.as_ref().unwrap().reason, STALE_REASON);
        assert!(edits_by_uri(action.edit.as_ref().unwrap())[&uri()].is_empty());
    }

    #[test]
    fn test_range_text_without_match_yields_no_op_edit() {
        let rules = vec![Rule::new(Some("R1"), "foo(", "bar(", "W")];
        let (mut doc, findings, diags) = setup("foo(1)", &rules, 1);
        // Diagnostic without token, text under the range no longer matches.
        let mut diag = diags[0].clone();
        diag.data = None;
        doc.text = "baz(1)".into();
        assert_eq!(resolve(&diag, &findings, &doc), Resolution::NoFix);
    }

    #[test]
    fn test_out_of_range_ordinal_is_stale() {
        let rules = vec![Rule::new(Some("R1"), "foo(", "bar(", "W")];
        let (doc, _findings, diags) = setup("foo(1)", &rules, 1);
        assert_eq!(resolve(&diags[0], &[], &doc), Resolution::Stale);
    }

    #[test]
    fn test_out_of_range_ordinal_gets_disabled_action() {
        let rules = vec![Rule::new(Some("R1"), "foo(", "bar(", "W")];
        let (doc, _findings, diags) = setup("foo(1)", &rules, 1);
        for lazy in [false, true] {
            let actions = code_actions(&uri(), &doc, &[], &diags, lazy);
            assert_eq!(actions.len(), 1);
            assert_eq!(actions[0].title, "Fix by DevReplay");
            assert_eq!(actions[0].disabled.as_ref().unwrap().reason, STALE_REASON);
            assert!(edits_by_uri(actions[0].edit.as_ref().unwrap())[&uri()].is_empty());
        }
    }

    #[test]
    fn test_every_ordinal_resolves_to_its_own_finding() {
        let rules = vec![
            Rule::new(Some("R1"), "foo(", "bar(", "W"),
            Rule::new(None, "var ", "let ", "I"),
            Rule::new(Some("R2"), " == ", " === ", "E"),
        ];
        let text = "var a = foo(1) == foo(2);\nvar b = 1;";
        let (doc, findings, diags) = setup(text, &rules, 1);
        assert_eq!(findings.len(), 5);
        assert_eq!(diags.len(), findings.len());
        let actions = code_actions(&uri(), &doc, &findings, &diags, false);
        assert_eq!(actions.len(), findings.len());
        for (i, (diag, action)) in diags.iter().zip(&actions).enumerate() {
            let finding = &findings[i];
            assert_eq!(ordinal(diag), Some(i));
            assert_eq!(action.title, title(&finding.rule));
            assert!(action.disabled.is_none());
            let edit = &edits_by_uri(action.edit.as_ref().unwrap())[&uri()][0];
            assert_eq!(edit.range, crate::diagnostics::to_range(&finding.position));
            assert_eq!(slice(text, edit.range), finding.rule.before.text());
            assert_eq!(edit.new_text, finding.rule.after.text());
        }
        assert_eq!(actions[2].title, "Fix by DevReplay");
        assert_eq!(actions[4].title, "Fix to R2");
    }

    #[test]
    fn test_fix_all_rewrites_document() {
        let rules = vec![
            Rule::new(Some("R1"), "foo(", "bar(", "W"),
            Rule::new(Some("R2"), "var ", "let ", "E"),
        ];
        let (doc, findings, _) = setup("var a = foo(1);\nvar b = foo(2);", &rules, 1);
        let edit = fix_all(&uri(), &doc, &findings).unwrap();
        let edits = edits_by_uri(&edit);
        assert_eq!(edits[&uri()][0].new_text, "let a = bar(1);\nlet b = bar(2);");
        let clean = Document {
            text: "ok".into(),
            version: 1,
            pass: 1,
        };
        assert!(fix_all(&uri(), &clean, &[]).is_none());
    }

    #[test]
    fn test_run_fix_previews_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        CatalogStore::for_root(root)
            .append(&[
                Rule::new(Some("R1"), "foo(", "bar(", "W"),
                Rule::new(Some("R2"), "var ", "let ", "E"),
            ])
            .unwrap();
        let file = root.join("main.js");
        fs::write(&file, "var a = foo(1);").unwrap();
        let mut severity = SeverityCfg::default();
        severity
            .rules
            .insert("R2".into(), crate::severity::Directive::Off);

        let files = vec![file.clone()];
        let (res, errs) = run_fix(root, &files, None, catalog::CATALOG_FILE, &severity, false, true);
        assert!(errs.is_empty());
        assert!(res[0].changed);
        assert_eq!(res[0].preview.as_deref(), Some("var a = bar(1);"));
        assert_eq!(fs::read_to_string(&file).unwrap(), "var a = foo(1);");

        let (res, _) = run_fix(root, &files, None, catalog::CATALOG_FILE, &severity, true, false);
        assert!(res[0].changed);
        assert_eq!(fs::read_to_string(&file).unwrap(), "var a = bar(1);");
    }
}
