//! Source file loading and line indexing.
//!
//! A [`SourceFile`] is immutable once loaded. All spans produced by the
//! scanner are byte offsets into its text plus 1-based line numbers
//! resolved through the [`LineIndex`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, RevscopeError, RevscopeResult};

/// Byte and line extent of a token, function body or match.
///
/// `start..end` is a half-open byte range; `line..=end_line` are 1-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub end_line: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, end_line: usize) -> Self {
        Self {
            start,
            end,
            line,
            end_line,
        }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn join(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line.min(other.line),
            end_line: self.end_line.max(other.end_line),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether this span lies entirely inside `outer`.
    pub fn within(&self, outer: &Span) -> bool {
        self.start >= outer.start && self.end <= outer.end
    }
}

/// Offsets of line starts for O(log n) byte → line lookups.
#[derive(Debug, Clone, Default)]
pub struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = Vec::with_capacity(text.len() / 32 + 1);
        if !text.is_empty() {
            starts.push(0);
        }
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' && i + 1 < text.len() {
                starts.push(i + 1);
            }
        }
        Self {
            starts,
            len: text.len(),
        }
    }

    /// Number of lines. A trailing newline does not open a new line.
    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// 1-based line containing `offset`.
    pub fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&s| s <= offset).max(1)
    }

    /// Byte range of 1-based `line`, including its terminating newline.
    pub fn line_range(&self, line: usize) -> std::ops::Range<usize> {
        if line == 0 || line > self.starts.len() {
            return self.len..self.len;
        }
        let start = self.starts[line - 1];
        let end = self.starts.get(line).copied().unwrap_or(self.len);
        start..end
    }

    /// Byte range covering lines `first..=last`.
    pub fn lines_range(&self, first: usize, last: usize) -> std::ops::Range<usize> {
        self.line_range(first).start..self.line_range(last).end
    }
}

/// A loaded source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    path: Option<PathBuf>,
    text: String,
    hash: String,
    lines: LineIndex,
}

impl SourceFile {
    /// Wrap in-memory text under a display name.
    pub fn from_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let hash = hash_text(&text);
        let lines = LineIndex::new(&text);
        Self {
            name: name.into(),
            path: None,
            text,
            hash,
            lines,
        }
    }

    /// Read a file from disk. Invalid UTF-8 is replaced rather than rejected,
    /// decompiler output frequently carries stray bytes in string tables.
    pub fn load(path: &Path) -> RevscopeResult<Self> {
        let bytes = fs::read(path).with_path(path)?;
        let text = match String::from_utf8(bytes) {
            Ok(t) => t,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };
        let mut file = Self::from_text(path.display().to_string(), text);
        file.path = Some(path.to_path_buf());
        Ok(file)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// SHA-256 of the text, hex encoded.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn lines(&self) -> &LineIndex {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.line_count()
    }

    pub fn info(&self) -> SourceInfo {
        SourceInfo {
            name: self.name.clone(),
            hash: self.hash.clone(),
            total_lines: self.line_count(),
            total_bytes: self.text.len(),
        }
    }
}

/// Serializable summary of a [`SourceFile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub name: String,
    pub hash: String,
    pub total_lines: usize,
    pub total_bytes: usize,
}

/// Where an operation reads its source from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceInput {
    /// Path to a file on disk
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Raw text (takes precedence over `path` when both are given)
    #[serde(default)]
    pub text: Option<String>,
}

impl SourceInput {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            text: None,
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            path: None,
            text: Some(text.into()),
        }
    }

    /// Resolve into a loaded file.
    pub fn load(&self) -> RevscopeResult<SourceFile> {
        match (&self.text, &self.path) {
            (Some(text), path) => {
                let name = path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<memory>".to_string());
                Ok(SourceFile::from_text(name, text.clone()))
            }
            (None, Some(path)) => SourceFile::load(path),
            (None, None) => Err(RevscopeError::invalid_argument(
                "either `path` or `text` must be provided",
            )),
        }
    }
}

fn hash_text(text: &str) -> String {
    let mut sha = Sha256::new();
    sha.update(text.as_bytes());
    format!("{:x}", sha.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index_trailing_newline() {
        let idx = LineIndex::new("a\nb\n");
        assert_eq!(idx.line_count(), 2);
        assert_eq!(idx.line_range(1), 0..2);
        assert_eq!(idx.line_range(2), 2..4);
    }

    #[test]
    fn test_line_index_no_trailing_newline() {
        let idx = LineIndex::new("a\nbc");
        assert_eq!(idx.line_count(), 2);
        assert_eq!(idx.line_range(2), 2..4);
        assert_eq!(idx.line_of(3), 2);
        assert_eq!(idx.line_of(0), 1);
    }

    #[test]
    fn test_line_index_empty() {
        let idx = LineIndex::new("");
        assert_eq!(idx.line_count(), 0);
        assert_eq!(idx.line_range(1), 0..0);
    }

    #[test]
    fn test_lines_range() {
        let text = "one\ntwo\nthree\n";
        let idx = LineIndex::new(text);
        assert_eq!(&text[idx.lines_range(2, 3)], "two\nthree\n");
    }

    #[test]
    fn test_source_hash_is_stable() {
        let a = SourceFile::from_text("a.c", "int x;");
        let b = SourceFile::from_text("b.c", "int x;");
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
    }

    #[test]
    fn test_source_input_requires_something() {
        let err = SourceInput::default().load().unwrap_err();
        assert!(matches!(err, RevscopeError::InvalidArgument { .. }));
    }

    #[test]
    fn test_source_input_missing_file() {
        let err = SourceInput::from_path("/definitely/not/here.c").load().unwrap_err();
        assert!(matches!(err, RevscopeError::Io { .. }));
    }

    #[test]
    fn test_span_join_and_within() {
        let a = Span::new(0, 4, 1, 1);
        let b = Span::new(10, 12, 3, 3);
        let j = a.join(&b);
        assert_eq!(j, Span::new(0, 12, 1, 3));
        assert!(a.within(&j));
        assert!(!j.within(&a));
    }
}
