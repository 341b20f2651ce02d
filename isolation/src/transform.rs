//! Pure text transforms for inserting and removing skip markers.
//!
//! `isolate` puts the marker on its own line directly above every test
//! declaration, indented like the declaration and terminated with the same
//! line ending. `unisolate` drops one marker line per declaration, and only
//! when it sits directly above that declaration. Applying `isolate` twice
//! therefore stacks two markers, and a single `unisolate` leaves one behind.

use crate::{IsolationError, IsolationResult};
use regex::Regex;

/// Skip decorator understood by pytest
pub const DEFAULT_MARKER: &str = "@pytest.mark.skip";
/// Matches top-level and class-level `def test_*` / `async def test_*`
pub const DEFAULT_DECLARATION_PATTERN: &str = r"^\s*(async\s+)?def test_";

#[derive(Debug, Clone)]
pub struct MarkerRules {
    marker: String,
    declaration: Regex,
}

impl MarkerRules {
    pub fn new(marker: impl Into<String>, declaration_pattern: &str) -> IsolationResult<Self> {
        let marker = marker.into();
        if marker.trim().is_empty() || marker.contains('\n') {
            return Err(IsolationError::InvalidMarker { marker });
        }

        let declaration =
            Regex::new(declaration_pattern).map_err(|e| IsolationError::InvalidPattern {
                pattern: declaration_pattern.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            marker: marker.trim().to_string(),
            declaration,
        })
    }

    /// The stock pytest skip marker and `def test_` declarations
    pub fn pytest() -> IsolationResult<Self> {
        Self::new(DEFAULT_MARKER, DEFAULT_DECLARATION_PATTERN)
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn is_declaration(&self, line: &str) -> bool {
        self.declaration.is_match(split_eol(line).0)
    }

    fn is_marker(&self, line: &str) -> bool {
        split_eol(line).0.trim() == self.marker
    }

    /// Insert a marker above every declaration; returns the new text and the
    /// number of markers inserted
    pub fn isolate(&self, source: &str) -> (String, usize) {
        let mut out = String::with_capacity(source.len());
        let mut inserted = 0;

        for line in source.split_inclusive('\n') {
            let (body, eol) = split_eol(line);
            if self.declaration.is_match(body) {
                let indent = &body[..body.len() - body.trim_start().len()];
                out.push_str(indent);
                out.push_str(&self.marker);
                out.push_str(if eol.is_empty() { "\n" } else { eol });
                inserted += 1;
            }
            out.push_str(line);
        }

        (out, inserted)
    }

    /// Remove the marker line directly above each declaration; returns the
    /// new text and the number of markers removed
    pub fn unisolate(&self, source: &str) -> (String, usize) {
        let lines: Vec<&str> = source.split_inclusive('\n').collect();
        let mut out = String::with_capacity(source.len());
        let mut removed = 0;

        for (idx, line) in lines.iter().enumerate() {
            let precedes_declaration = lines
                .get(idx + 1)
                .is_some_and(|next| self.is_declaration(next));
            if precedes_declaration && self.is_marker(line) {
                removed += 1;
                continue;
            }
            out.push_str(line);
        }

        (out, removed)
    }
}

fn split_eol(line: &str) -> (&str, &str) {
    let body = line
        .strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line);
    (body, &line[body.len()..])
}
