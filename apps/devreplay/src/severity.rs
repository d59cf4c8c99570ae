//! Severity levels and override directives.
//!
//! A rule stores a base `Severity`. A `Directive` is a transient adjustment
//! (from config or an editor command) and is never written back as a stored
//! severity. `adjust` combines the two; `None` means the rule is switched off.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::DirectiveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
/// Base severity, ordered from least to most severe.
pub enum Severity {
    Hint,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Hint,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
    ];

    /// Parse a stored code. Accepts long names and the single-letter forms.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "e" | "error" => Some(Severity::Error),
            "w" | "warn" | "warning" => Some(Severity::Warn),
            "i" | "info" | "information" => Some(Severity::Info),
            "h" | "hint" => Some(Severity::Hint),
            _ => None,
        }
    }

    /// Canonical code written to the catalog.
    pub fn code(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warn => "warn",
            Severity::Info => "info",
            Severity::Hint => "hint",
        }
    }

    /// One step more severe, capped at `Error`.
    pub fn upgrade(self) -> Self {
        match self {
            Severity::Hint => Severity::Info,
            Severity::Info => Severity::Warn,
            Severity::Warn | Severity::Error => Severity::Error,
        }
    }

    /// One step less severe, floored at `Hint`.
    pub fn downgrade(self) -> Self {
        match self {
            Severity::Error => Severity::Warn,
            Severity::Warn => Severity::Info,
            Severity::Info | Severity::Hint => Severity::Hint,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(try_from = "String")]
/// Override applied on top of a rule's base severity.
pub enum Directive {
    Off,
    Default,
    Downgrade,
    Upgrade,
    Set(Severity),
}

impl FromStr for Directive {
    type Err = DirectiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Directive::Off),
            "default" => Ok(Directive::Default),
            "downgrade" => Ok(Directive::Downgrade),
            "upgrade" => Ok(Directive::Upgrade),
            other => Severity::from_code(other)
                .map(Directive::Set)
                .ok_or_else(|| DirectiveError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Directive {
    type Error = DirectiveError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Effective severity of `base` under `directive`.
///
/// Explicit levels and `Off` replace the base; `Upgrade`/`Downgrade` move one
/// step and saturate; `Default` or no directive keeps the base.
pub fn adjust(base: Severity, directive: Option<Directive>) -> Option<Severity> {
    match directive {
        None | Some(Directive::Default) => Some(base),
        Some(Directive::Off) => None,
        Some(Directive::Set(level)) => Some(level),
        Some(Directive::Downgrade) => Some(base.downgrade()),
        Some(Directive::Upgrade) => Some(base.upgrade()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_is_total() {
        let mut directives: Vec<Option<Directive>> = vec![
            None,
            Some(Directive::Off),
            Some(Directive::Default),
            Some(Directive::Downgrade),
            Some(Directive::Upgrade),
        ];
        directives.extend(Severity::ALL.iter().map(|s| Some(Directive::Set(*s))));
        for base in Severity::ALL {
            for d in &directives {
                let out = adjust(base, *d);
                if *d == Some(Directive::Off) {
                    assert_eq!(out, None);
                } else {
                    assert!(out.is_some());
                }
            }
        }
    }

    #[test]
    fn test_downgrade_floors_at_hint() {
        let d = Some(Directive::Downgrade);
        assert_eq!(adjust(Severity::Error, d), Some(Severity::Warn));
        assert_eq!(adjust(Severity::Warn, d), Some(Severity::Info));
        assert_eq!(adjust(Severity::Info, d), Some(Severity::Hint));
        assert_eq!(adjust(Severity::Hint, d), Some(Severity::Hint));
    }

    #[test]
    fn test_upgrade_caps_at_error() {
        let u = Some(Directive::Upgrade);
        assert_eq!(adjust(Severity::Hint, u), Some(Severity::Info));
        assert_eq!(adjust(Severity::Info, u), Some(Severity::Warn));
        assert_eq!(adjust(Severity::Warn, u), Some(Severity::Error));
        assert_eq!(adjust(Severity::Error, u), Some(Severity::Error));
    }

    #[test]
    fn test_explicit_level_replaces_base() {
        assert_eq!(
            adjust(Severity::Hint, Some(Directive::Set(Severity::Error))),
            Some(Severity::Error)
        );
        assert_eq!(adjust(Severity::Info, Some(Directive::Default)), Some(Severity::Info));
        assert_eq!(adjust(Severity::Info, None), Some(Severity::Info));
    }

    #[test]
    fn test_directive_parsing() {
        assert_eq!("off".parse::<Directive>().unwrap(), Directive::Off);
        assert_eq!("Upgrade".parse::<Directive>().unwrap(), Directive::Upgrade);
        assert_eq!(
            "W".parse::<Directive>().unwrap(),
            Directive::Set(Severity::Warn)
        );
        assert!("louder".parse::<Directive>().is_err());
    }
}
