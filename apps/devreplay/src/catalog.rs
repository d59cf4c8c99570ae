//! Rule catalog persistence (`.devreplay.json`).
//!
//! Reads never fail: a missing, unreadable, binary, or malformed catalog is an
//! empty rule set, and entries that are not valid rules are skipped. Mutations
//! are stricter. They work on the raw JSON entries, so entries this crate does
//! not understand are written back untouched, and they refuse to touch a
//! catalog that exists but cannot be read as a JSON array. They are serialized
//! through one in-process lock and land on disk via a temporary sibling file
//! plus rename, so a failed write leaves the old catalog intact.

use crate::error::CatalogError;
use crate::models::{Rule, RuleId};
use crate::severity::{adjust, Directive, Severity};
use serde::Serialize;
use serde_json::Value as Json;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Default catalog file name at a workspace root.
pub const CATALOG_FILE: &str = ".devreplay.json";

const TS_SYNC_BYTE: u8 = 0x47;
const TS_PACKET_LEN: usize = 188;

static WRITE_LOCK: Mutex<()> = Mutex::new(());

/// Outcome of `CatalogStore::adjust_severity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityUpdate {
    /// No rule carries the id. Nothing was written.
    NoSuchRule,
    /// The rule exists but the directive turns it off, which is not a
    /// storable severity. Nothing was written.
    Off,
    /// The rule's stored severity is now this level.
    Stored(Severity),
}

#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CatalogStore { path: path.into() }
    }

    /// Store for the default catalog file under `root`.
    pub fn for_root(root: &Path) -> Self {
        CatalogStore::new(root.join(CATALOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all rules in catalog order.
    pub fn load(&self) -> Vec<Rule> {
        let Some(text) = read_text(&self.path) else {
            return Vec::new();
        };
        let entries = match serde_json::from_str::<Vec<Json>>(&text) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!(path = %self.path.display(), %err, "rule catalog is not a JSON array");
                return Vec::new();
            }
        };
        entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value::<Rule>(entry) {
                Ok(rule) => Some(rule),
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), index, %err, "skipping malformed catalog entry");
                    None
                }
            })
            .collect()
    }

    /// Append `rules` after the existing entries; written with 2-space indentation.
    pub fn append(&self, rules: &[Rule]) -> Result<(), CatalogError> {
        let _guard = WRITE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.load_entries()?;
        for rule in rules {
            entries.push(serde_json::to_value(rule)?);
        }
        let out = serde_json::to_string_pretty(&entries)?;
        write_atomic(&self.path, out.as_bytes())
    }

    /// Set the stored severity of the first rule carrying `rule_id`.
    ///
    /// Written with tab indentation. The catalog is rewritten even when no
    /// rule matches; the return value says whether one did.
    pub fn set_severity(&self, rule_id: &str, severity: Severity) -> Result<bool, CatalogError> {
        let _guard = WRITE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.load_entries()?;
        let matched = match entries.iter_mut().find(|e| entry_has_id(e, rule_id)) {
            Some(entry) => {
                store_severity(entry, severity);
                true
            }
            None => {
                tracing::warn!(rule_id, path = %self.path.display(), "no catalog rule with this id");
                false
            }
        };
        self.write_tabbed(&entries)?;
        Ok(matched)
    }

    /// Apply `directive` to the stored severity of the first rule carrying
    /// `rule_id`. Reading the current level and writing the new one happen
    /// under the same lock.
    pub fn adjust_severity(
        &self,
        rule_id: &str,
        directive: Directive,
    ) -> Result<SeverityUpdate, CatalogError> {
        let _guard = WRITE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.load_entries()?;
        let Some(entry) = entries.iter_mut().find(|e| entry_has_id(e, rule_id)) else {
            return Ok(SeverityUpdate::NoSuchRule);
        };
        let base = entry
            .get("severity")
            .and_then(Json::as_str)
            .and_then(Severity::from_code)
            .unwrap_or(Severity::Warn);
        let Some(level) = adjust(base, Some(directive)) else {
            return Ok(SeverityUpdate::Off);
        };
        store_severity(entry, level);
        self.write_tabbed(&entries)?;
        Ok(SeverityUpdate::Stored(level))
    }

    /// Raw entries for a mutation. A missing or blank file is an empty
    /// catalog; anything else that is not a JSON array is an error.
    fn load_entries(&self) -> Result<Vec<Json>, CatalogError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(CatalogError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let unreadable = |reason: String| CatalogError::Unreadable {
            path: self.path.clone(),
            reason,
        };
        if is_transport_stream(&bytes) {
            return Err(unreadable("binary transport stream".to_string()));
        }
        let text = String::from_utf8(bytes).map_err(|err| unreadable(err.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text).map_err(|err| unreadable(err.to_string()))
    }

    fn write_tabbed(&self, entries: &[Json]) -> Result<(), CatalogError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        entries.serialize(&mut ser)?;
        write_atomic(&self.path, &buf)
    }
}

fn entry_has_id(entry: &Json, rule_id: &str) -> bool {
    entry
        .get("ruleId")
        .and_then(|id| serde_json::from_value::<RuleId>(id.clone()).ok())
        .is_some_and(|id| id.contains(rule_id))
}

fn store_severity(entry: &mut Json, severity: Severity) {
    if let Some(fields) = entry.as_object_mut() {
        fields.insert(
            "severity".to_string(),
            Json::String(severity.code().to_string()),
        );
    }
}

/// True for data that looks like an MPEG transport stream: sync bytes at
/// offset 0 and at the start of the second packet.
pub fn is_transport_stream(bytes: &[u8]) -> bool {
    bytes.len() > TS_PACKET_LEN && bytes[0] == TS_SYNC_BYTE && bytes[TS_PACKET_LEN] == TS_SYNC_BYTE
}

/// Read a catalog candidate as text, refusing binary transport streams.
pub fn read_text(path: &Path) -> Option<String> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "rule catalog not readable");
            return None;
        }
    };
    if is_transport_stream(&bytes) {
        tracing::debug!(path = %path.display(), "rule catalog looks like a transport stream; skipped");
        return None;
    }
    String::from_utf8(bytes).ok()
}

/// Locate the catalog governing `target`.
///
/// Walks up from the target's directory and returns the first `file_name`
/// that exists. Otherwise falls back to `fallback_root`, then to the target's
/// own directory.
pub fn discover(target: &Path, file_name: &str, fallback_root: Option<&Path>) -> PathBuf {
    let start = target.parent().unwrap_or(target);
    for dir in start.ancestors() {
        let candidate = dir.join(file_name);
        if candidate.is_file() {
            return candidate;
        }
    }
    match fallback_root {
        Some(root) => root.join(file_name),
        None => start.join(file_name),
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CatalogError> {
    let persist_err = |source| CatalogError::Persistence {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, contents).map_err(persist_err)?;
    fs::rename(&tmp, path).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        persist_err(source)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_catalog(dir: &Path, body: &str) -> CatalogStore {
        let store = CatalogStore::for_root(dir);
        fs::write(store.path(), body).unwrap();
        store
    }

    #[test]
    fn test_load_missing_or_malformed_is_empty() {
        let dir = tempdir().unwrap();
        let store = CatalogStore::for_root(dir.path());
        assert!(store.load().is_empty());
        fs::write(store.path(), "{ not json").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_transport_stream_is_never_parsed() {
        let dir = tempdir().unwrap();
        let store = CatalogStore::for_root(dir.path());
        // Bytes 0 and 188 are both 0x47 ('G'); the content is irrelevant.
        let mut body = String::from("G");
        body.push_str(&" ".repeat(187));
        body.push('G');
        fs::write(store.path(), body.as_bytes()).unwrap();
        assert!(read_text(store.path()).is_none());

        let mut json = String::from("[");
        json.push_str(&" ".repeat(187));
        json.push_str("G]");
        assert!(!is_transport_stream(json.as_bytes()));
    }

    #[test]
    fn test_append_keeps_order_and_uses_two_space_indent() {
        let dir = tempdir().unwrap();
        let store = write_catalog(
            dir.path(),
            r#"[{"ruleId":"R1","before":"a","after":"b","severity":"W"}]"#,
        );
        store
            .append(&[Rule::new(Some("R2"), "c", "d", "error")])
            .unwrap();
        let rules = store.load();
        assert_eq!(rules.len(), 2);
        assert!(rules[0].has_id("R1"));
        assert!(rules[1].has_id("R2"));
        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.starts_with("[\n  {"));
    }

    #[test]
    fn test_append_creates_missing_catalog() {
        let dir = tempdir().unwrap();
        let store = CatalogStore::for_root(dir.path());
        store.append(&[Rule::new(None, "x", "y", "info")]).unwrap();
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn test_set_severity_changes_first_match_only() {
        let dir = tempdir().unwrap();
        let store = write_catalog(
            dir.path(),
            r#"[
  {"ruleId":"R1","before":"a","after":"b","severity":"W"},
  {"ruleId":"R1","before":"c","after":"d","severity":"W"}
]"#,
        );
        assert!(store.set_severity("R1", Severity::Error).unwrap());
        let rules = store.load();
        assert_eq!(rules[0].base_severity(), Severity::Error);
        assert_eq!(rules[1].base_severity(), Severity::Warn);
        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.starts_with("[\n\t{"));
    }

    #[test]
    fn test_set_severity_unknown_id_rewrites_unchanged() {
        let dir = tempdir().unwrap();
        let store = write_catalog(
            dir.path(),
            r#"[{"ruleId":"R1","before":"a","after":"b","severity":"W","note":1}]"#,
        );
        let before = store.load();
        assert!(!store.set_severity("nope", Severity::Hint).unwrap());
        assert_eq!(store.load(), before);
        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains('\t'));
    }

    #[test]
    fn test_unknown_entries_survive_severity_edit() {
        let dir = tempdir().unwrap();
        let store = write_catalog(
            dir.path(),
            r#"[{"ruleId":"R1","before":"a","after":"b","severity":2},{"ruleId":"R2","before":"c","after":"d","severity":"W"}]"#,
        );
        // The first entry is not a valid rule; lint skips it.
        assert_eq!(store.load().len(), 1);
        assert!(store.set_severity("R2", Severity::Error).unwrap());
        let raw: Json = serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw[0]["severity"], 2);
        assert_eq!(raw[1]["severity"], "error");

        store.append(&[Rule::new(Some("R3"), "e", "f", "I")]).unwrap();
        let raw: Json = serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw.as_array().unwrap().len(), 3);
        assert_eq!(raw[0]["ruleId"], "R1");
    }

    #[test]
    fn test_unparseable_catalog_is_never_overwritten() {
        let dir = tempdir().unwrap();
        let store = write_catalog(dir.path(), "{ not json");
        let err = store.set_severity("R1", Severity::Error).unwrap_err();
        assert!(matches!(err, CatalogError::Unreadable { .. }));
        assert!(store.append(&[Rule::new(None, "x", "y", "W")]).is_err());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "{ not json");

        let mut ts = vec![TS_SYNC_BYTE];
        ts.extend(std::iter::repeat(b' ').take(TS_PACKET_LEN - 1));
        ts.push(TS_SYNC_BYTE);
        fs::write(store.path(), &ts).unwrap();
        assert!(store.append(&[Rule::new(None, "x", "y", "W")]).is_err());
        assert_eq!(fs::read(store.path()).unwrap(), ts);
    }

    #[test]
    fn test_adjust_severity_reads_and_writes_under_one_lock() {
        let dir = tempdir().unwrap();
        let store = write_catalog(
            dir.path(),
            r#"[{"ruleId":"R1","before":"a","after":"b","severity":"H"}]"#,
        );
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.adjust_severity("R1", Directive::Upgrade).unwrap())
            })
            .collect();
        for h in handles {
            assert!(matches!(h.join().unwrap(), SeverityUpdate::Stored(_)));
        }
        assert_eq!(store.load()[0].base_severity(), Severity::Warn);

        assert_eq!(
            store.adjust_severity("R1", Directive::Off).unwrap(),
            SeverityUpdate::Off
        );
        assert_eq!(
            store.adjust_severity("nope", Directive::Upgrade).unwrap(),
            SeverityUpdate::NoSuchRule
        );
        assert_eq!(store.load()[0].base_severity(), Severity::Warn);
    }

    #[test]
    fn test_write_failure_is_persistence_error() {
        let dir = tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("missing-dir").join(CATALOG_FILE));
        let err = store.append(&[Rule::new(None, "x", "y", "W")]).unwrap_err();
        assert!(matches!(err, CatalogError::Persistence { .. }));
    }

    #[test]
    fn test_discover_prefers_nearest_ancestor() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let nested = root.join("pkg").join("src");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.join("pkg").join(CATALOG_FILE), "[]").unwrap();
        let target = nested.join("main.py");
        assert_eq!(
            discover(&target, CATALOG_FILE, Some(root)),
            root.join("pkg").join(CATALOG_FILE)
        );

        let other = root.join("other").join("a.py");
        fs::create_dir_all(root.join("other")).unwrap();
        let found = discover(&other, CATALOG_FILE, Some(root));
        // No catalog on the way up inside the temp dir: falls back to the root
        // unless one happens to exist above it.
        assert!(found.ends_with(CATALOG_FILE));
    }
}
