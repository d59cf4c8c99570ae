//! Findings to protocol diagnostics.
//!
//! A diagnostic's `code` is the index of its finding in the lint pass that
//! produced it. `data` carries a `CorrelationToken` so a later fix request
//! can tell whether a fresh lint pass still has the same finding there.

use crate::documents::Document;
use crate::matcher::format_message;
use crate::models::{Finding, Rule, Span};
use crate::severity::{adjust, Directive, Severity};
use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString, Position, Range};

/// `source` of every diagnostic this server publishes.
pub const SOURCE: &str = "devreplay";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationToken {
    /// Validation pass of the document that produced the diagnostic.
    pub pass: u64,
    /// Hash of the originating rule and the diagnostic range.
    pub fingerprint: String,
}

pub fn to_lsp_severity(sev: Severity) -> DiagnosticSeverity {
    match sev {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warn => DiagnosticSeverity::WARNING,
        Severity::Info => DiagnosticSeverity::INFORMATION,
        Severity::Hint => DiagnosticSeverity::HINT,
    }
}

/// 1-based matcher span to a 0-based protocol range.
pub fn to_range(span: &Span) -> Range {
    Range {
        start: Position::new(
            span.start.line.saturating_sub(1),
            span.start.character.saturating_sub(1),
        ),
        end: Position::new(
            span.end.line.saturating_sub(1),
            span.end.character.saturating_sub(1),
        ),
    }
}

pub fn fingerprint(rule: &Rule, range: &Range) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&serde_json::to_vec(rule).unwrap_or_default());
    for n in [
        range.start.line,
        range.start.character,
        range.end.line,
        range.end.character,
    ] {
        hasher.update(&n.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Diagnostics for `findings` at their stored severities, without tokens.
pub fn map(findings: &[Finding]) -> Vec<Diagnostic> {
    map_with(findings, None, |_| None)
}

/// Diagnostics for `findings` with severity overrides applied.
///
/// Findings switched `off` produce no diagnostic; the others keep their
/// original index as `code`. With `pass` set, each diagnostic carries a
/// correlation token.
pub fn map_with<F>(findings: &[Finding], pass: Option<u64>, directive_for: F) -> Vec<Diagnostic>
where
    F: Fn(&Rule) -> Option<Directive>,
{
    findings
        .iter()
        .enumerate()
        .filter_map(|(i, finding)| {
            let level = adjust(finding.rule.base_severity(), directive_for(&finding.rule))?;
            let range = to_range(&finding.position);
            let data = pass.and_then(|pass| {
                serde_json::to_value(CorrelationToken {
                    pass,
                    fingerprint: fingerprint(&finding.rule, &range),
                })
                .ok()
            });
            Some(Diagnostic {
                range,
                severity: Some(to_lsp_severity(level)),
                code: Some(NumberOrString::Number(i as i32)),
                source: Some(SOURCE.to_string()),
                message: format_message(&finding.rule),
                data,
                ..Default::default()
            })
        })
        .collect()
}

pub fn is_ours(diag: &Diagnostic) -> bool {
    diag.source.as_deref() == Some(SOURCE)
}

/// Finding index a diagnostic refers to.
pub fn ordinal(diag: &Diagnostic) -> Option<usize> {
    match diag.code.as_ref()? {
        NumberOrString::Number(n) => usize::try_from(*n).ok(),
        NumberOrString::String(s) => s.parse().ok(),
    }
}

pub fn token(diag: &Diagnostic) -> Option<CorrelationToken> {
    serde_json::from_value(diag.data.clone()?).ok()
}

/// Whether `diag` still describes `finding` in `doc`'s latest pass.
///
/// Diagnostics without a token are trusted as-is.
pub fn is_current(diag: &Diagnostic, finding: &Finding, doc: &Document) -> bool {
    let Some(tok) = token(diag) else {
        return true;
    };
    tok.pass == doc.pass
        && to_range(&finding.position) == diag.range
        && tok.fingerprint == fingerprint(&finding.rule, &diag.range)
}
