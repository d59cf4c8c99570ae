//! Rule catalog entries as stored in `.devreplay.json`.
//!
//! Rules are kept close to their on-disk shape: the stored severity spelling
//! and any field this crate does not know about survive a rewrite untouched.

use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
/// `ruleId` is either a single identifier or a list of them.
pub enum RuleId {
    One(String),
    Many(Vec<String>),
}

impl RuleId {
    pub fn ids(&self) -> Vec<&str> {
        match self {
            RuleId::One(id) => vec![id.as_str()],
            RuleId::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }

    /// True when `id` is one of this rule's identifiers.
    pub fn contains(&self, id: &str) -> bool {
        self.ids().contains(&id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
/// A before/after pattern: one string, or one string per line.
pub enum Pattern {
    Text(String),
    Lines(Vec<String>),
}

impl Pattern {
    pub fn text(&self) -> String {
        match self {
            Pattern::Text(s) => s.clone(),
            Pattern::Lines(lines) => lines.join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
/// Severity exactly as spelled in the catalog (`W`, `warn`, ...).
pub struct SeverityCode(pub String);

impl SeverityCode {
    /// Parsed level; `None` for spellings that are not a base level.
    pub fn level(&self) -> Option<Severity> {
        Severity::from_code(&self.0)
    }
}

impl From<Severity> for SeverityCode {
    fn from(sev: Severity) -> Self {
        SeverityCode(sev.code().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "ruleId", default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<RuleId>,
    pub before: Pattern,
    pub after: Pattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<SeverityCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Fields this crate does not interpret, kept for rewrites.
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

impl Rule {
    pub fn new(rule_id: Option<&str>, before: &str, after: &str, severity: &str) -> Self {
        Rule {
            rule_id: rule_id.map(|id| RuleId::One(id.to_string())),
            before: Pattern::Text(before.to_string()),
            after: Pattern::Text(after.to_string()),
            severity: Some(SeverityCode(severity.to_string())),
            description: None,
            extra: Map::new(),
        }
    }

    pub fn ids(&self) -> Vec<&str> {
        self.rule_id.as_ref().map(RuleId::ids).unwrap_or_default()
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.rule_id.as_ref().is_some_and(|r| r.contains(id))
    }

    /// Stored base level. Unknown or missing codes read as `Warn`.
    pub fn base_severity(&self) -> Severity {
        self.severity
            .as_ref()
            .and_then(SeverityCode::level)
            .unwrap_or(Severity::Warn)
    }
}
