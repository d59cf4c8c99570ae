//! Open text documents and LSP position math.
//!
//! Positions follow the protocol default: 0-based lines, characters counted
//! in UTF-16 code units.

use std::collections::HashMap;
use tower_lsp::lsp_types::{Position, Range, TextDocumentContentChangeEvent, Url};

#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    pub version: i32,
    /// Latest validation pass started for this document.
    pub pass: u64,
}

#[derive(Debug, Default)]
pub struct Documents {
    docs: HashMap<Url, Document>,
}

impl Documents {
    pub fn open(&mut self, uri: Url, text: String, version: i32) {
        self.docs.insert(
            uri,
            Document {
                text,
                version,
                pass: 0,
            },
        );
    }

    /// Apply incremental or full changes in order. Returns false for an
    /// unknown document.
    pub fn change(
        &mut self,
        uri: &Url,
        version: i32,
        changes: Vec<TextDocumentContentChangeEvent>,
    ) -> bool {
        let Some(doc) = self.docs.get_mut(uri) else {
            return false;
        };
        for change in changes {
            match change.range {
                Some(range) => {
                    let start = offset_at(&doc.text, range.start);
                    let end = offset_at(&doc.text, range.end).max(start);
                    doc.text.replace_range(start..end, &change.text);
                }
                None => doc.text = change.text,
            }
        }
        doc.version = version;
        true
    }

    pub fn close(&mut self, uri: &Url) -> Option<Document> {
        self.docs.remove(uri)
    }

    pub fn get(&self, uri: &Url) -> Option<&Document> {
        self.docs.get(uri)
    }

    /// Start a new validation pass and return its number.
    pub fn next_pass(&mut self, uri: &Url) -> Option<u64> {
        let doc = self.docs.get_mut(uri)?;
        doc.pass += 1;
        Some(doc.pass)
    }

    pub fn uris(&self) -> Vec<Url> {
        self.docs.keys().cloned().collect()
    }
}

/// Byte offset of `pos`, clamped to the end of its line (or of the text).
pub fn offset_at(text: &str, pos: Position) -> usize {
    let mut line_start = 0;
    for _ in 0..pos.line {
        match text[line_start..].find('\n') {
            Some(i) => line_start += i + 1,
            None => return text.len(),
        }
    }
    let line_end = text[line_start..]
        .find('\n')
        .map_or(text.len(), |i| line_start + i);
    let mut units = 0u32;
    for (i, ch) in text[line_start..line_end].char_indices() {
        if units >= pos.character {
            return line_start + i;
        }
        units += ch.len_utf16() as u32;
    }
    line_end
}

/// Position of a byte offset. `offset` must lie on a char boundary.
pub fn position_at(text: &str, offset: usize) -> Position {
    let before = &text[..offset.min(text.len())];
    let line = before.matches('\n').count() as u32;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let character = before[line_start..].encode_utf16().count() as u32;
    Position { line, character }
}

pub fn slice(text: &str, range: Range) -> &str {
    let start = offset_at(text, range.start);
    let end = offset_at(text, range.end).max(start);
    &text[start..end]
}

/// Range covering the whole text.
pub fn full_range(text: &str) -> Range {
    Range {
        start: Position::new(0, 0),
        end: position_at(text, text.len()),
    }
}
