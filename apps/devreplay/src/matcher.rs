//! Pattern matching engine behind the `Matcher` seam.
//!
//! A rule's `before` pattern is literal text with snippet-style placeholders
//! (`$1`, `${1:name}`). Each placeholder captures an identifier-like run, and
//! repeated placeholders must capture the same text. `after` is instantiated
//! with the captured bindings.

use crate::catalog::CatalogStore;
use crate::documents::position_at;
use crate::error::LintError;
use crate::models::{Finding, Point, Rule, Span};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// One file to lint. `text` overrides the on-disk contents when present.
#[derive(Debug, Clone, Copy)]
pub struct LintTarget<'a> {
    pub path: &'a Path,
    pub text: Option<&'a str>,
}

/// Produces ordered findings for one target against a rule catalog.
///
/// Implementations must be deterministic: identical inputs yield findings in
/// the same order, since diagnostics refer back to findings by position.
pub trait Matcher: Send + Sync {
    fn run(&self, target: &LintTarget<'_>, catalog: &Path) -> Result<Vec<Finding>, LintError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PatternMatcher;

impl Matcher for PatternMatcher {
    fn run(&self, target: &LintTarget<'_>, catalog: &Path) -> Result<Vec<Finding>, LintError> {
        let rules = CatalogStore::new(catalog).load();
        if rules.is_empty() {
            return Ok(Vec::new());
        }
        let owned;
        let text = match target.text {
            Some(t) => t,
            None => {
                owned = fs::read_to_string(target.path).map_err(|source| LintError::ReadTarget {
                    path: target.path.to_path_buf(),
                    source,
                })?;
                owned.as_str()
            }
        };
        Ok(find_all(text, &rules))
    }
}

/// Findings for every rule in catalog order, each rule's matches in text order.
pub fn find_all(text: &str, rules: &[Rule]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for rule in rules {
        let Some(compiled) = CompiledRule::new(rule) else {
            continue;
        };
        for hit in compiled.matches(text) {
            findings.push(Finding {
                rule: rule.clone(),
                position: Span {
                    start: one_based(text, hit.start),
                    end: one_based(text, hit.end),
                },
            });
        }
    }
    findings
}

/// Rewrite every match of the given rules in `text`. `None` when nothing changed.
pub fn apply_fix(text: &str, rules: &[Rule]) -> Option<String> {
    let mut current = text.to_string();
    for rule in rules {
        let Some(compiled) = CompiledRule::new(rule) else {
            continue;
        };
        let hits = compiled.matches(&current);
        if hits.is_empty() {
            continue;
        }
        let mut out = String::with_capacity(current.len());
        let mut last = 0;
        for hit in &hits {
            out.push_str(&current[last..hit.start]);
            out.push_str(&compiled.instantiate(&hit.bindings));
            last = hit.end;
        }
        out.push_str(&current[last..]);
        current = out;
    }
    (current != text).then_some(current)
}

/// Human-readable diagnostic message for a rule.
pub fn format_message(rule: &Rule) -> String {
    let body = match rule.description.as_deref() {
        Some(desc) if !desc.trim().is_empty() => desc.to_string(),
        _ => format!(
            "`{}` should be `{}`",
            rule.before.text(),
            rule.after.text()
        ),
    };
    let ids = rule.ids();
    if ids.is_empty() {
        body
    } else {
        format!("{}: {}", ids.join(", "), body)
    }
}

fn one_based(text: &str, offset: usize) -> Point {
    let pos = position_at(text, offset);
    Point {
        line: pos.line + 1,
        character: pos.character + 1,
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{(\d+)(?::[^}]*)?\}|\$(\d+)").expect("placeholder regex is valid")
    })
}

struct Hit<'t> {
    start: usize,
    end: usize,
    bindings: HashMap<u32, &'t str>,
}

struct CompiledRule {
    regex: Regex,
    /// Placeholder number for each capture group, in group order.
    groups: Vec<u32>,
    after: String,
}

impl CompiledRule {
    fn new(rule: &Rule) -> Option<Self> {
        let before = rule.before.text();
        if before.is_empty() {
            return None;
        }
        let mut pattern = String::new();
        let mut groups = Vec::new();
        let mut last = 0;
        for caps in placeholder_re().captures_iter(&before) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            pattern.push_str(&regex::escape(&before[last..whole.start()]));
            pattern.push_str(r"([\w.]+)");
            groups.push(placeholder_number(&caps));
            last = whole.end();
        }
        pattern.push_str(&regex::escape(&before[last..]));
        match Regex::new(&pattern) {
            Ok(regex) => Some(CompiledRule {
                regex,
                groups,
                after: rule.after.text(),
            }),
            Err(err) => {
                tracing::warn!(ids = ?rule.ids(), %err, "rule pattern does not compile; skipped");
                None
            }
        }
    }

    fn matches<'t>(&self, text: &'t str) -> Vec<Hit<'t>> {
        let mut hits = Vec::new();
        'outer: for caps in self.regex.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let mut bindings: HashMap<u32, &'t str> = HashMap::new();
            for (i, number) in self.groups.iter().enumerate() {
                let Some(m) = caps.get(i + 1) else {
                    continue 'outer;
                };
                match bindings.get(number) {
                    Some(prev) if *prev != m.as_str() => continue 'outer,
                    _ => {
                        bindings.insert(*number, m.as_str());
                    }
                }
            }
            hits.push(Hit {
                start: whole.start(),
                end: whole.end(),
                bindings,
            });
        }
        hits
    }

    fn instantiate(&self, bindings: &HashMap<u32, &str>) -> String {
        placeholder_re()
            .replace_all(&self.after, |caps: &regex::Captures<'_>| {
                let number = placeholder_number(caps);
                match bindings.get(&number) {
                    Some(value) => value.to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

fn placeholder_number(caps: &regex::Captures<'_>) -> u32 {
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}
